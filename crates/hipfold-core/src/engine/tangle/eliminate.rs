use super::detect::TanglePair;
use crate::core::models::cluster::ClusterLayout;
use crate::core::models::points::PointSet;
use crate::core::utils::numeric::{DEFAULT_DIV_TOLERANCE, safe_div};
use nalgebra::DVector;
use std::collections::BTreeMap;
use tracing::{trace, warn};

#[derive(Default)]
struct Displacement {
    sum: Option<DVector<f64>>,
    pairs: usize,
}

impl Displacement {
    fn add(&mut self, v: DVector<f64>) {
        match &mut self.sum {
            Some(sum) => *sum += v,
            None => self.sum = Some(v),
        }
        self.pairs += 1;
    }

    fn mean(self) -> Option<DVector<f64>> {
        let pairs = self.pairs as f64;
        self.sum.map(|s| s / pairs)
    }
}

/// Pushes every entangled pair apart along the line joining the cluster
/// centroids.
///
/// Each pair moves its clusters `step / 2` away from each other; a cluster
/// in several pairs moves by the mean of its contributions. Centroids are
/// computed once per call from the active members. Returns the number of
/// clusters that moved.
pub fn separate(layout: &ClusterLayout, coords: &mut PointSet, pairs: &[TanglePair], step: f64) -> usize {
    let mut centroids: BTreeMap<usize, DVector<f64>> = BTreeMap::new();
    for pair in pairs {
        for cluster in [pair.0, pair.1] {
            if centroids.contains_key(&cluster) {
                continue;
            }
            let Some(members) = layout.cluster(cluster) else {
                continue;
            };
            let view = coords.view_of(members.members().iter());
            if let Some(c) = coords.centroid(&view) {
                centroids.insert(cluster, c);
            }
        }
    }

    let mut moves: BTreeMap<usize, Displacement> = BTreeMap::new();
    for pair in pairs {
        let (Some(a), Some(b)) = (centroids.get(&pair.0), centroids.get(&pair.1)) else {
            continue;
        };
        let axis = b - a;
        let length = axis.norm();
        let half = if length <= DEFAULT_DIV_TOLERANCE {
            warn!(
                first = pair.0,
                second = pair.1,
                "Entangled clusters share a centroid; no separation direction."
            );
            DVector::zeros(axis.len())
        } else {
            axis * safe_div(0.5 * step, length, DEFAULT_DIV_TOLERANCE, 0.0)
        };
        moves.entry(pair.0).or_default().add(-&half);
        moves.entry(pair.1).or_default().add(half);
    }

    let mut moved = 0;
    for (cluster, displacement) in moves {
        let (Some(members), Some(shift)) = (layout.cluster(cluster), displacement.mean()) else {
            continue;
        };
        if shift.norm() == 0.0 {
            continue;
        }
        let view = coords.view_of(members.members().iter());
        coords.translate(&view, &shift);
        if let Some(c) = centroids.get_mut(&cluster) {
            *c += &shift;
        }
        trace!(cluster, shift = shift.norm(), "Translated entangled cluster.");
        moved += 1;
    }
    moved
}
