use super::local::LocalFrame;
use super::spectral::{self, DimensionBounds};
use crate::core::metric::{default_passes, metric_dist, trineq_filter_capped};
use crate::core::utils::numeric::{DEFAULT_DIV_TOLERANCE, safe_div};
use crate::engine::config::ProjectionConfig;
use crate::engine::error::EngineError;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, instrument};

/// The skeleton is never embedded in fewer dimensions than this.
const MIN_SKELETON_DIMENSION: usize = 3;

/// Row offsets of every cluster's centroid in the skeleton; the satellites of
/// the cluster follow its centroid directly. Built for one layout generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonIndex {
    generation: u64,
    offsets: Vec<usize>,
    total: usize,
}

impl SkeletonIndex {
    pub fn new(generation: u64, frames: &[LocalFrame]) -> Self {
        let mut offsets = Vec::with_capacity(frames.len());
        let mut total = 0;
        for frame in frames {
            offsets.push(total);
            total += 1 + frame.dimension();
        }
        Self {
            generation,
            offsets,
            total,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn centroid(&self, cluster: usize) -> usize {
        self.offsets[cluster]
    }

    pub fn satellite(&self, cluster: usize, axis: usize) -> usize {
        self.offsets[cluster] + 1 + axis
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Global placement of all cluster centroids and inertial satellites.
#[derive(Debug, Clone)]
pub struct SkeletonEmbedding {
    pub index: SkeletonIndex,
    /// Skeleton points by global axes.
    pub coords: DMatrix<f64>,
    pub smoothing_passes: usize,
    pub residual_violations: usize,
}

impl SkeletonEmbedding {
    pub fn dimension(&self) -> usize {
        self.coords.ncols()
    }

    pub fn point(&self, row: usize) -> DVector<f64> {
        self.coords.row(row).transpose()
    }
}

/// A local axis `y = Σᵢ αᵢ (pᵢ − C)` expressed through the global metric.
struct Satellite {
    cluster: usize,
    axis: usize,
    alpha: Vec<f64>,
    alpha_sum: f64,
    /// `⟨y, pⱼ⟩` for every chain position `j`.
    products: DVector<f64>,
}

struct SkeletonMetric<'a> {
    frames: &'a [LocalFrame],
    /// `⟨C_c, C_e⟩`.
    centroid_products: DMatrix<f64>,
    satellites: Vec<Satellite>,
    /// `⟨y_s, C_e⟩`, satellites by clusters.
    satellite_centroid: DMatrix<f64>,
}

impl<'a> SkeletonMetric<'a> {
    fn new(frames: &'a [LocalFrame], gram: &DMatrix<f64>) -> Self {
        let n = gram.nrows();
        let count = frames.len();

        let centroid_point: Vec<DVector<f64>> = frames
            .iter()
            .map(|f| {
                let mut sum = DVector::zeros(n);
                for &i in &f.members {
                    sum += gram.column(i);
                }
                sum / f.size() as f64
            })
            .collect();
        let centroid_products =
            DMatrix::from_fn(count, count, |c, e| mean_over(&centroid_point[c], &frames[e].members));

        let mut satellites = Vec::new();
        for (c, frame) in frames.iter().enumerate() {
            for axis in 0..frame.dimension() {
                let moment = frame.moments[axis];
                let alpha: Vec<f64> = (0..frame.size())
                    .map(|i| safe_div(frame.coords[(i, axis)], moment, DEFAULT_DIV_TOLERANCE, 0.0))
                    .collect();
                let alpha_sum: f64 = alpha.iter().sum();
                let mut products = &centroid_point[c] * -alpha_sum;
                for (&i, &a) in frame.members.iter().zip(alpha.iter()) {
                    products += gram.column(i) * a;
                }
                satellites.push(Satellite {
                    cluster: c,
                    axis,
                    alpha,
                    alpha_sum,
                    products,
                });
            }
        }

        let satellite_centroid = DMatrix::from_fn(satellites.len(), count, |s, e| {
            mean_over(&satellites[s].products, &frames[e].members)
        });

        Self {
            frames,
            centroid_products,
            satellites,
            satellite_centroid,
        }
    }

    fn satellite_product(&self, s: usize, t: usize) -> f64 {
        let (a, b) = (&self.satellites[s], &self.satellites[t]);
        if a.cluster == b.cluster {
            return if a.axis == b.axis {
                let m = self.frames[a.cluster].moments[a.axis];
                m * m
            } else {
                0.0
            };
        }
        let members = &self.frames[b.cluster].members;
        let weighted: f64 = members
            .iter()
            .zip(b.alpha.iter())
            .map(|(&j, &beta)| beta * a.products[j])
            .sum();
        weighted - b.alpha_sum * self.satellite_centroid[(s, b.cluster)]
    }

    /// Gram matrix of the skeleton about the global centroid.
    fn build(&self, index: &SkeletonIndex) -> DMatrix<f64> {
        // (cluster, satellite) of every skeleton row.
        let mut rows: Vec<(usize, Option<usize>)> = Vec::with_capacity(index.len());
        let mut s = 0;
        for (c, frame) in self.frames.iter().enumerate() {
            rows.push((c, None));
            for _ in 0..frame.dimension() {
                rows.push((c, Some(s)));
                s += 1;
            }
        }

        let m = rows.len();
        let mut k = DMatrix::zeros(m, m);
        for p in 0..m {
            for q in p..m {
                let (c, sp) = rows[p];
                let (e, sq) = rows[q];
                let mut value = self.centroid_products[(c, e)];
                if let Some(sp) = sp {
                    value += self.satellite_centroid[(sp, e)];
                }
                if let Some(sq) = sq {
                    value += self.satellite_centroid[(sq, c)];
                }
                if let (Some(sp), Some(sq)) = (sp, sq) {
                    value += self.satellite_product(sp, sq);
                }
                k[(p, q)] = value;
                k[(q, p)] = value;
            }
        }
        k
    }
}

fn mean_over(values: &DVector<f64>, members: &[usize]) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    members.iter().map(|&j| values[j]).sum::<f64>() / members.len() as f64
}

/// Builds the skeleton metric from the global Gram matrix and the local
/// frames, smooths it, and embeds it in at least
/// `max(3, largest local dimension)` dimensions.
#[instrument(skip_all, name = "skeleton_embedding")]
pub fn embed_skeleton(
    frames: &[LocalFrame],
    gram: &DMatrix<f64>,
    generation: u64,
    config: &ProjectionConfig,
) -> Result<SkeletonEmbedding, EngineError> {
    let index = SkeletonIndex::new(generation, frames);
    let metric = SkeletonMetric::new(frames, gram).build(&index);
    let distances = metric_dist(&metric);

    let passes = config
        .max_smoothing_passes
        .unwrap_or_else(|| default_passes(index.len()));
    let smoothed = trineq_filter_capped(&distances, passes);

    let largest_local = frames.iter().map(LocalFrame::dimension).max().unwrap_or(0);
    let lower = largest_local.max(MIN_SKELETON_DIMENSION);
    let upper = config.prior_dimension.max(lower);
    let spectrum = spectral::embed(
        &smoothed.metric,
        smoothed.diag_shift,
        config.evfract,
        DimensionBounds {
            min: lower,
            max: upper,
        },
        config.seed,
        config.solver,
    )
    .map_err(EngineError::numerical("skeleton embedding"))?;

    debug!(
        points = index.len(),
        dimension = spectrum.dimension(),
        selected = spectrum.selected,
        smoothing_passes = smoothed.passes,
        residual_violations = smoothed.violations,
        "Embedded skeleton."
    );
    Ok(SkeletonEmbedding {
        index,
        coords: spectrum.coords,
        smoothing_passes: smoothed.passes,
        residual_violations: smoothed.violations,
    })
}
