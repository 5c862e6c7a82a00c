use crate::core::linalg::Svd;
use crate::core::models::cluster::ClusterLayout;
use crate::core::models::points::PointSet;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

/// Relative singular-value cut-off below which a tetrahedron is flat.
const RANK_TOLERANCE: f64 = 1e-8;
/// Barycentric slack; a path grazing a face does not count as piercing.
const CONTAINMENT_MARGIN: f64 = 1e-9;
const MIN_TANGLE_DIMENSION: usize = 3;

/// Four chain positions spanning part of a helix or sheet cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tetrahedron {
    pub cluster: usize,
    pub vertices: [usize; 4],
}

/// An unordered pair of entangled clusters, stored as `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TanglePair(pub usize, pub usize);

impl TanglePair {
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

/// Tetrahedra of every segment-bearing cluster in the layout.
pub fn tetrahedra(layout: &ClusterLayout) -> Vec<Tetrahedron> {
    layout
        .clusters()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind().bears_tetrahedra())
        .filter_map(|(i, c)| c.segment().map(|s| (i, s)))
        .flat_map(|(cluster, segment)| {
            segment
                .tetrahedra()
                .into_iter()
                .map(move |vertices| Tetrahedron { cluster, vertices })
        })
        .filter(|t| t.vertices.iter().all(|&v| v < layout.len()))
        .collect()
}

/// Barycentric solver for one tetrahedron.
struct Barycentric {
    svd: Svd,
}

impl Barycentric {
    /// `None` when a vertex is inactive or the tetrahedron is degenerate.
    fn new(tet: &Tetrahedron, coords: &PointSet) -> Option<Self> {
        let dim = coords.dim();
        let mut system = DMatrix::zeros(dim + 1, 4);
        for (col, &v) in tet.vertices.iter().enumerate() {
            if !coords.is_active(v) {
                return None;
            }
            let p = coords.point(v)?;
            system.view_mut((0, col), (dim, 1)).copy_from(p);
            system[(dim, col)] = 1.0;
        }
        let mut svd = match Svd::new(&system) {
            Ok(svd) => svd,
            Err(e) => {
                warn!(cluster = tet.cluster, error = %e, "Cannot decompose tetrahedron; skipping it.");
                return None;
            }
        };
        let (rank, cond) = svd.rank_cond(RANK_TOLERANCE);
        if rank < 4 {
            trace!(cluster = tet.cluster, rank, cond, "Skipping flat tetrahedron.");
            return None;
        }
        Some(Self { svd })
    }

    fn coordinates(&self, p: &DVector<f64>) -> Option<DVector<f64>> {
        let dim = p.len();
        let mut rhs = DVector::zeros(dim + 1);
        rhs.rows_mut(0, dim).copy_from(p);
        rhs[dim] = 1.0;
        self.svd.lin_solve(&rhs).ok()
    }

    /// Whether the segment `p → q` passes through the tetrahedron's interior.
    fn pierced_by(&self, p: &DVector<f64>, q: &DVector<f64>) -> bool {
        let (Some(start), Some(end)) = (self.coordinates(p), self.coordinates(q)) else {
            return false;
        };
        let (mut lo, mut hi) = (0.0f64, 1.0f64);
        for k in 0..4 {
            let a = start[k];
            let b = end[k] - start[k];
            let (min, max) = (CONTAINMENT_MARGIN, 1.0 - CONTAINMENT_MARGIN);
            if b.abs() < f64::EPSILON {
                if a < min || a > max {
                    return false;
                }
                continue;
            }
            let t1 = (min - a) / b;
            let t2 = (max - a) / b;
            lo = lo.max(t1.min(t2));
            hi = hi.min(t1.max(t2));
            if lo > hi {
                return false;
            }
        }
        true
    }
}

/// Chain bonds `(i, i + 1)` that lie inside one cluster other than `owner`,
/// with both ends active.
fn candidate_bonds<'a>(
    layout: &'a ClusterLayout,
    coords: &'a PointSet,
    owner: usize,
) -> impl Iterator<Item = (usize, usize)> + 'a {
    let owners = layout.owner_index();
    let host = layout.cluster(owner).map(|c| c.members().clone());
    (0..layout.len().saturating_sub(1)).filter_map(move |i| {
        let cluster = owners.owner(i)?;
        if cluster == owner || owners.owner(i + 1) != Some(cluster) {
            return None;
        }
        if !coords.is_active(i) || !coords.is_active(i + 1) {
            return None;
        }
        if let (Some(host), Some(other)) = (&host, layout.cluster(cluster))
            && host.intersects(other.members())
        {
            return None;
        }
        Some((cluster, i))
    })
}

fn scan(layout: &ClusterLayout, coords: &PointSet, first_only: bool) -> BTreeSet<TanglePair> {
    let mut pairs = BTreeSet::new();
    if coords.len() != layout.len() {
        warn!(
            expected = layout.len(),
            found = coords.len(),
            "Point set does not match the cluster layout; no tangles reported."
        );
        return pairs;
    }
    if coords.dim() < MIN_TANGLE_DIMENSION {
        warn!(dim = coords.dim(), "Tangle detection needs at least three dimensions.");
        return pairs;
    }

    for tet in tetrahedra(layout) {
        let Some(solver) = Barycentric::new(&tet, coords) else {
            continue;
        };
        for (cluster, i) in candidate_bonds(layout, coords, tet.cluster) {
            let pair = TanglePair::new(tet.cluster, cluster);
            if pairs.contains(&pair) {
                continue;
            }
            let (Some(p), Some(q)) = (coords.point(i), coords.point(i + 1)) else {
                continue;
            };
            if solver.pierced_by(p, q) {
                trace!(
                    segment = tet.cluster,
                    other = cluster,
                    bond = i,
                    "Chain bond pierces tetrahedron."
                );
                pairs.insert(pair);
                if first_only {
                    return pairs;
                }
            }
        }
    }
    pairs
}

/// Whether any chain bond pierces a segment tetrahedron. Stops at the first hit.
pub fn tangle_detect(layout: &ClusterLayout, coords: &PointSet) -> bool {
    !scan(layout, coords, true).is_empty()
}

/// Every entangled cluster pair, in ascending order.
pub fn find_tangles(layout: &ClusterLayout, coords: &PointSet) -> Vec<TanglePair> {
    let pairs: Vec<TanglePair> = scan(layout, coords, false).into_iter().collect();
    debug!(pairs = pairs.len(), "Tangle scan finished.");
    pairs
}
