/// Events emitted by long-running engine phases.
#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    /// One detect/adjust round of tangle elimination has finished.
    TangleRound { iteration: usize, violations: usize },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Optional sink for [`Progress`] events; silent when no callback is set.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Reports a task of `total_steps` and returns a guard that finishes it
    /// when dropped.
    pub fn task(&self, total_steps: u64) -> TaskGuard<'_, 'a> {
        self.report(Progress::TaskStart { total_steps });
        TaskGuard { reporter: self }
    }
}

pub struct TaskGuard<'r, 'a> {
    reporter: &'r ProgressReporter<'a>,
}

impl TaskGuard<'_, '_> {
    #[inline]
    pub fn tick(&self) {
        self.reporter.report(Progress::TaskIncrement);
    }
}

impl Drop for TaskGuard<'_, '_> {
    fn drop(&mut self) {
        self.reporter.report(Progress::TaskFinish);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn silent_reporter_accepts_events() {
        let reporter = ProgressReporter::new();
        reporter.report(Progress::Message("ignored".into()));
        let task = reporter.task(3);
        task.tick();
    }

    #[test]
    fn task_guard_brackets_increments() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let reporter = ProgressReporter::with_callback(Box::new(move |e| {
            let label = match e {
                Progress::TaskStart { total_steps } => format!("start:{total_steps}"),
                Progress::TaskIncrement => "tick".to_string(),
                Progress::TaskFinish => "finish".to_string(),
                _ => "other".to_string(),
            };
            sink.lock().unwrap().push(label);
        }));
        {
            let task = reporter.task(2);
            task.tick();
            task.tick();
        }
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start:2", "tick", "tick", "finish"]
        );
    }
}
