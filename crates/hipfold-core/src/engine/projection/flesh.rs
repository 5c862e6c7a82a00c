use super::local::LocalFrame;
use super::skeleton::SkeletonEmbedding;
use crate::core::linalg::best_rotation;
use crate::core::models::points::PointSet;
use crate::core::utils::numeric::{DEFAULT_DIV_TOLERANCE, safe_div, sqrt_clamped};
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

/// Softening constant of the axis weight `0.1 / (0.1 + relative error)`.
const AXIS_WEIGHT_SOFTENING: f64 = 0.1;

#[derive(Debug, Clone)]
struct ClusterFit {
    /// Orientation of every local axis; `-1` marks a flipped axis.
    signs: Vec<f64>,
    /// Whether the unconstrained best fit needed a reflection.
    improper: bool,
}

/// Full-chain coordinates assembled from the local frames and the skeleton.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub coords: PointSet,
    /// Clusters that ended with a flipped local axis.
    pub mirrored: Vec<usize>,
    pub mirror_passes: usize,
}

struct Fleshing<'a> {
    frames: &'a [LocalFrame],
    skeleton: &'a SkeletonEmbedding,
    distances: &'a DMatrix<f64>,
    owner: Vec<usize>,
}

impl<'a> Fleshing<'a> {
    fn centroid(&self, cluster: usize) -> DVector<f64> {
        self.skeleton.point(self.skeleton.index.centroid(cluster))
    }

    /// Best proper rotation taking the signed ideal frame of `cluster` onto
    /// its skeleton satellites, and whether the unconstrained fit was improper.
    fn fit(&self, cluster: usize, signs: &[f64]) -> (DMatrix<f64>, bool) {
        let frame = &self.frames[cluster];
        let dim = self.skeleton.dimension();
        let centre = self.centroid(cluster);

        let mut ideal = Vec::with_capacity(frame.dimension());
        let mut distorted = Vec::with_capacity(frame.dimension());
        let mut weights = Vec::with_capacity(frame.dimension());
        for axis in 0..frame.dimension().min(dim) {
            let moment = frame.moments[axis];
            let mut x = DVector::zeros(dim);
            x[axis] = signs[axis] * moment;
            let y = self.skeleton.point(self.skeleton.index.satellite(cluster, axis)) - &centre;
            let error = safe_div((y.norm() - moment).abs(), moment, DEFAULT_DIV_TOLERANCE, 1.0);
            weights.push(AXIS_WEIGHT_SOFTENING / (AXIS_WEIGHT_SOFTENING + error));
            ideal.push(x);
            distorted.push(y);
        }

        match best_rotation(&ideal, &distorted, &weights) {
            Ok(fit) => {
                trace!(cluster, rms = fit.rms, proper = fit.proper, "Fitted cluster frame.");
                (fit.proper_rotation, !fit.proper)
            }
            Err(e) => {
                warn!(cluster, error = %e, "Frame fit failed; using the identity rotation.");
                (DMatrix::identity(dim, dim), false)
            }
        }
    }

    fn place(&self, cluster: usize, rotation: &DMatrix<f64>, signs: &[f64], coords: &mut PointSet) {
        let frame = &self.frames[cluster];
        let dim = self.skeleton.dimension();
        let centre = self.centroid(cluster);
        for (row, &pos) in frame.members.iter().enumerate() {
            let mut local = DVector::zeros(dim);
            for axis in 0..frame.dimension().min(dim) {
                local[axis] = signs[axis] * frame.coords[(row, axis)];
            }
            coords.set_point(pos, &centre + rotation * local);
        }
    }

    /// Mean absolute distance error over the pairs with exactly one point in
    /// `cluster`.
    fn quality(&self, cluster: usize, coords: &PointSet) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for &i in &self.frames[cluster].members {
            let (Some(pi), true) = (coords.point(i), coords.is_active(i)) else {
                continue;
            };
            for j in 0..coords.len() {
                if self.owner[j] == cluster || !coords.is_active(j) {
                    continue;
                }
                let Some(pj) = coords.point(j) else { continue };
                let target = sqrt_clamped(self.distances[(i, j)]);
                sum += ((pi - pj).norm() - target).abs();
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f64)
    }
}

/// Places every cluster by rigid-body fitting of its local frame onto the
/// skeleton, then resolves mirror ambiguity greedily.
///
/// Clusters whose best fit needed a reflection are revisited in descending
/// order of their boundary distance error; flipping the shortest local axis
/// is kept only when it strictly lowers that error. Sweeps repeat until one
/// makes no change or `max_mirror_passes` sweeps have run.
///
/// Only single flips are tried. When the skeleton is mirrored relative to
/// several clusters at once, every single flip can raise the error while the
/// joint flip would be exact; such clusters stay mirrored.
pub fn reconstruct(
    frames: &[LocalFrame],
    skeleton: &SkeletonEmbedding,
    distances: &DMatrix<f64>,
    len: usize,
    max_mirror_passes: usize,
) -> Reconstruction {
    let dim = skeleton.dimension();
    let mut owner = vec![usize::MAX; len];
    for (c, frame) in frames.iter().enumerate() {
        for &pos in &frame.members {
            if let Some(slot) = owner.get_mut(pos) {
                *slot = c;
            }
        }
    }
    let fleshing = Fleshing {
        frames,
        skeleton,
        distances,
        owner,
    };

    let mut coords = PointSet::new(len, dim);
    let mut fits: Vec<ClusterFit> = Vec::with_capacity(frames.len());
    for (c, frame) in frames.iter().enumerate() {
        let signs = vec![1.0; frame.dimension()];
        let (rotation, improper) = if frame.dimension() == 0 {
            (DMatrix::identity(dim, dim), false)
        } else {
            fleshing.fit(c, &signs)
        };
        fleshing.place(c, &rotation, &signs, &mut coords);
        fits.push(ClusterFit { signs, improper });
    }

    let candidates: Vec<usize> = (0..frames.len()).filter(|&c| fits[c].improper).collect();
    debug!(candidates = candidates.len(), "Placed clusters on the skeleton.");

    let mut passes = 0;
    while !candidates.is_empty() {
        if passes >= max_mirror_passes {
            warn!(
                passes,
                "Mirror resolution stopped at its pass limit while flips still improved."
            );
            break;
        }
        passes += 1;

        let mut order: Vec<(usize, f64)> = candidates
            .iter()
            .filter_map(|&c| fleshing.quality(c, &coords).map(|q| (c, q)))
            .collect();
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut improved = false;
        for (c, _) in order {
            let Some(before) = fleshing.quality(c, &coords) else {
                continue;
            };
            let frame = &frames[c];
            let Some(shortest) = (0..frame.dimension()).min_by(|&a, &b| {
                frame.moments[a]
                    .partial_cmp(&frame.moments[b])
                    .unwrap_or(Ordering::Equal)
            }) else {
                continue;
            };

            let mut signs = fits[c].signs.clone();
            signs[shortest] = -signs[shortest];
            let (rotation, _) = fleshing.fit(c, &signs);
            let mut trial = coords.clone();
            fleshing.place(c, &rotation, &signs, &mut trial);

            match fleshing.quality(c, &trial) {
                Some(after) if after < before => {
                    debug!(cluster = c, before, after, "Kept mirror flip.");
                    coords = trial;
                    fits[c].signs = signs;
                    improved = true;
                }
                _ => {}
            }
        }
        if !improved {
            break;
        }
    }

    let mirrored = fits
        .iter()
        .enumerate()
        .filter(|(_, f)| f.signs.iter().any(|&s| s < 0.0))
        .map(|(c, _)| c)
        .collect();
    Reconstruction {
        coords,
        mirrored,
        mirror_passes: passes,
    }
}
