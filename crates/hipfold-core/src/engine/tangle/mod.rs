//! Detection and elimination of chain bonds that thread through tetrahedra
//! erected on helix and sheet segments.

pub mod detect;
pub mod eliminate;

pub use detect::{TanglePair, Tetrahedron, find_tangles, tangle_detect, tetrahedra};

use crate::core::models::cluster::ClusterLayout;
use crate::core::models::points::PointSet;
use crate::engine::config::TangleConfig;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TanglePhase {
    Idle,
    Detecting,
    Adjusting,
    /// No violations remain.
    Clean,
    /// The iteration budget ran out with violations remaining.
    Exhausted,
}

impl TanglePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TanglePhase::Clean | TanglePhase::Exhausted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TangleOutcome {
    pub violations: usize,
    pub iterations: usize,
    pub phase: TanglePhase,
    /// Pairs still entangled when the engine stopped.
    pub remaining: Vec<TanglePair>,
}

/// Detect/adjust loop over one layout.
pub struct TangleEngine<'a> {
    layout: &'a ClusterLayout,
    config: TangleConfig,
    phase: TanglePhase,
    iterations: usize,
    pairs: Vec<TanglePair>,
}

impl<'a> TangleEngine<'a> {
    pub fn new(layout: &'a ClusterLayout, config: &TangleConfig) -> Self {
        Self {
            layout,
            config: *config,
            phase: TanglePhase::Idle,
            iterations: 0,
            pairs: Vec::new(),
        }
    }

    pub fn phase(&self) -> TanglePhase {
        self.phase
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Performs one state transition and returns the new phase. Terminal
    /// phases are left unchanged.
    pub fn advance(&mut self, coords: &mut PointSet) -> TanglePhase {
        self.phase = match self.phase {
            TanglePhase::Idle => TanglePhase::Detecting,
            TanglePhase::Detecting => {
                self.pairs = find_tangles(self.layout, coords);
                if self.pairs.is_empty() {
                    TanglePhase::Clean
                } else if self.iterations >= self.config.max_iterations {
                    TanglePhase::Exhausted
                } else {
                    TanglePhase::Adjusting
                }
            }
            TanglePhase::Adjusting => {
                let moved = eliminate::separate(self.layout, coords, &self.pairs, self.config.step);
                self.iterations += 1;
                debug!(
                    iteration = self.iterations,
                    pairs = self.pairs.len(),
                    moved,
                    "Separated entangled clusters."
                );
                TanglePhase::Detecting
            }
            terminal => terminal,
        };
        self.phase
    }

    /// Runs until a terminal phase is reached.
    pub fn run(mut self, coords: &mut PointSet, reporter: &ProgressReporter) -> TangleOutcome {
        while !self.phase.is_terminal() {
            let previous = self.phase;
            self.advance(coords);
            if previous == TanglePhase::Adjusting {
                reporter.report(Progress::TangleRound {
                    iteration: self.iterations,
                    violations: self.pairs.len(),
                });
            }
        }
        TangleOutcome {
            violations: self.pairs.len(),
            iterations: self.iterations,
            phase: self.phase,
            remaining: self.pairs,
        }
    }
}

/// Separates entangled clusters until none remain or `max_iterations`
/// adjustment rounds have run.
#[instrument(skip_all, name = "tangle_elim")]
pub fn tangle_elim(
    layout: &ClusterLayout,
    coords: &mut PointSet,
    config: &TangleConfig,
    reporter: &ProgressReporter,
) -> TangleOutcome {
    reporter.report(Progress::PhaseStart {
        name: "Tangle Elimination",
    });
    let outcome = TangleEngine::new(layout, config).run(coords, reporter);
    reporter.report(Progress::PhaseFinish);

    match outcome.phase {
        TanglePhase::Clean => info!(
            iterations = outcome.iterations,
            "Structure is free of tangles."
        ),
        _ => warn!(
            iterations = outcome.iterations,
            violations = outcome.violations,
            "Tangle elimination exhausted its iteration budget."
        ),
    }
    outcome
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::models::cluster::ClusterLayout;
    use crate::core::models::points::PointSet;
    use crate::core::models::segment::{Segment, Span};
    use nalgebra::DVector;

    /// Helix on positions 1-4 with a coil on 5-9; the bond 6-7 threads the
    /// helix tetrahedron when `threaded` is set.
    pub fn threaded_chain(threaded: bool) -> (ClusterLayout, PointSet) {
        let len = 10;
        let layout = ClusterLayout::from_segments(
            len,
            vec![Segment::Helix(Span::new(1, 4)), Segment::Coil(Span::new(5, 9))],
        );
        let mut xyz = vec![
            [-4.0, -4.0, -4.0],
            [0.0, 0.0, 0.0],
            [4.0, 0.0, 0.0],
            [0.0, 4.0, 0.0],
            [0.0, 0.0, 4.0],
            [6.0, 6.0, -6.0],
            [5.0, 5.0, -3.0],
            [5.0, 5.0, 5.0],
            [6.0, 6.0, 8.0],
            [8.0, 8.0, 8.0],
        ];
        if threaded {
            xyz[6] = [0.5, 0.5, -3.0];
            xyz[7] = [0.5, 0.5, 5.0];
        }
        let points = xyz.iter().map(|c| DVector::from_column_slice(c)).collect();
        let coords = PointSet::from_points(points).unwrap_or_else(|| PointSet::new(len, 3));
        (layout, coords)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::threaded_chain;
    use super::*;
    use crate::core::models::segment::{Segment, Span};
    use nalgebra::DVector;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn config(step: f64, max_iterations: usize) -> TangleConfig {
        TangleConfig {
            step,
            max_iterations,
        }
    }

    #[test]
    fn clean_structure_needs_no_iterations() {
        let (layout, mut coords) = threaded_chain(false);
        let outcome = tangle_elim(&layout, &mut coords, &config(1.0, 10), &ProgressReporter::new());
        assert_eq!(outcome.phase, TanglePhase::Clean);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.violations, 0);
    }

    #[test]
    fn threaded_coil_is_pulled_free() {
        let (layout, mut coords) = threaded_chain(true);
        let outcome = tangle_elim(&layout, &mut coords, &config(2.0, 50), &ProgressReporter::new());
        assert_eq!(outcome.phase, TanglePhase::Clean);
        assert!(outcome.iterations >= 1);
        assert!(!tangle_detect(&layout, &coords));
    }

    #[test]
    fn zero_budget_reports_violations_without_moving() {
        let (layout, mut coords) = threaded_chain(true);
        let before = coords.clone();
        let outcome = tangle_elim(&layout, &mut coords, &config(1.0, 0), &ProgressReporter::new());
        assert_eq!(outcome.phase, TanglePhase::Exhausted);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.violations, 1);
        assert_eq!(coords, before);
    }

    #[test]
    fn state_machine_walks_through_its_phases() {
        let (layout, mut coords) = threaded_chain(true);
        let mut engine = TangleEngine::new(&layout, &config(1.0, 3));
        assert_eq!(engine.phase(), TanglePhase::Idle);
        assert_eq!(engine.advance(&mut coords), TanglePhase::Detecting);
        assert_eq!(engine.advance(&mut coords), TanglePhase::Adjusting);
        assert_eq!(engine.advance(&mut coords), TanglePhase::Detecting);
        assert_eq!(engine.iterations(), 1);
    }

    #[test]
    fn elimination_respects_budget_on_random_layouts() {
        let mut rng = StdRng::seed_from_u64(2024);
        for round in 0..20 {
            let len = 40;
            let layout = ClusterLayout::from_segments(
                len,
                vec![
                    Segment::Helix(Span::new(2, 13)),
                    Segment::Sheet(vec![Span::new(18, 22), Span::new(26, 30)]),
                ],
            );
            let points = (0..len)
                .map(|_| DVector::from_fn(3, |_, _| rng.gen_range(-4.0..4.0)))
                .collect();
            let mut coords = PointSet::from_points(points).unwrap();
            let max_iterations = 1 + round % 6;
            let outcome = tangle_elim(
                &layout,
                &mut coords,
                &config(0.5, max_iterations),
                &ProgressReporter::new(),
            );
            assert!(outcome.iterations <= max_iterations);
            assert!(outcome.phase.is_terminal());
            if outcome.phase == TanglePhase::Exhausted {
                assert!(outcome.violations > 0);
                assert_eq!(outcome.iterations, max_iterations);
            }
        }
    }
}
