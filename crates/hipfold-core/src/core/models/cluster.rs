use super::segment::{Segment, Span};
use itertools::Itertools;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Clusters with at most this many members are pooled together.
const SMALL_CLUSTER_MAX: usize = 3;
/// A pool of small clusters larger than this becomes a cluster of its own.
const SMALL_POOL_MAX: usize = 5;
/// Default meshing: one cluster per this many chain positions.
const POSITIONS_PER_CLUSTER: usize = 25;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("Cluster {cluster} has a mask of length {found}, expected {expected}")]
    LengthMismatch {
        cluster: usize,
        expected: usize,
        found: usize,
    },

    #[error("Position {position} is not covered by any cluster")]
    Uncovered { position: usize },

    #[error("Clusters {first} and {second} overlap at position {position}")]
    Overlap {
        first: usize,
        second: usize,
        position: usize,
    },

    #[error("Cluster {cluster} is empty")]
    EmptyCluster { cluster: usize },
}

/// Fixed-length membership bit-mask over chain positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mask {
    blocks: Vec<u64>,
    len: usize,
}

impl Mask {
    pub fn new(len: usize) -> Self {
        Self {
            blocks: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn full(len: usize) -> Self {
        let mut mask = Self::new(len);
        for i in 0..len {
            mask.insert(i);
        }
        mask
    }

    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::new(len);
        for i in indices {
            mask.insert(i);
        }
        mask
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn count(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn contains(&self, i: usize) -> bool {
        i < self.len && (self.blocks[i / 64] >> (i % 64)) & 1 == 1
    }

    /// Sets bit `i`; indices beyond the mask length are ignored.
    pub fn insert(&mut self, i: usize) {
        if i < self.len {
            self.blocks[i / 64] |= 1u64 << (i % 64);
        }
    }

    pub fn remove(&mut self, i: usize) {
        if i < self.len {
            self.blocks[i / 64] &= !(1u64 << (i % 64));
        }
    }

    pub fn union_with(&mut self, other: &Mask) {
        for (a, b) in self.blocks.iter_mut().zip(other.blocks.iter()) {
            *a |= *b;
        }
    }

    pub fn intersects(&self, other: &Mask) -> bool {
        self.blocks
            .iter()
            .zip(other.blocks.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Set positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&i| self.contains(i))
    }

    /// Maximal runs of consecutive set positions.
    pub fn runs(&self) -> Vec<Span> {
        self.iter()
            .enumerate()
            .chunk_by(|&(k, i)| i - k)
            .into_iter()
            .filter_map(|(_, run)| {
                let (first, last) = run.map(|(_, i)| i).minmax().into_option()?;
                Some(Span::new(first, last))
            })
            .collect()
    }
}

/// Secondary-structure classification of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterKind {
    Helix,
    Sheet,
    Coil,
    Unknown,
}

impl ClusterKind {
    /// Whether tetrahedra are erected on clusters of this kind.
    pub fn bears_tetrahedra(self) -> bool {
        matches!(self, ClusterKind::Helix | ClusterKind::Sheet)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    members: Mask,
    segment: Option<Segment>,
}

impl Cluster {
    pub fn new(members: Mask) -> Self {
        Self {
            members,
            segment: None,
        }
    }

    pub fn from_segment(len: usize, segment: Segment) -> Self {
        Self {
            members: segment.mask(len),
            segment: Some(segment),
        }
    }

    pub fn members(&self) -> &Mask {
        &self.members
    }

    pub fn size(&self) -> usize {
        self.members.count()
    }

    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    pub fn kind(&self) -> ClusterKind {
        self.segment.as_ref().map_or(ClusterKind::Unknown, Segment::kind)
    }

    pub fn indices(&self) -> Vec<usize> {
        self.members.iter().collect()
    }
}

/// Immutable position-to-cluster lookup, tagged with the layout generation it
/// was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIndex {
    generation: u64,
    owners: Vec<usize>,
}

impl OwnerIndex {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn owner(&self, position: usize) -> Option<usize> {
        self.owners.get(position).copied()
    }
}

/// An exhaustive partition of the chain positions into clusters.
#[derive(Debug, Clone)]
pub struct ClusterLayout {
    len: usize,
    clusters: Vec<Cluster>,
    generation: u64,
    owners: Arc<OwnerIndex>,
}

impl ClusterLayout {
    /// Partitions `len` positions (chain plus two sentinels) into `count`
    /// round-robin meshing clusters, so that every cluster threads through
    /// the whole chain. `count == 0` selects `max(2, N/25 + 1)` for a chain
    /// of `N = len - 2` residues.
    pub fn make_clusters(len: usize, count: usize) -> Self {
        let mut layout = Self {
            len,
            clusters: Vec::new(),
            generation: 0,
            owners: Arc::new(OwnerIndex {
                generation: 0,
                owners: Vec::new(),
            }),
        };
        layout.remesh(count);
        layout
    }

    /// Accepts an externally supplied partition, falling back to the
    /// generated meshing (with a warning) when it is not a valid partition.
    pub fn from_clusters(len: usize, clusters: Vec<Cluster>) -> Self {
        match Self::try_from_clusters(len, clusters) {
            Ok(layout) => layout,
            Err(e) => {
                warn!("Rejecting supplied cluster layout ({}); using generated meshing.", e);
                Self::make_clusters(len, 0)
            }
        }
    }

    pub fn try_from_clusters(len: usize, clusters: Vec<Cluster>) -> Result<Self, ClusterError> {
        validate(len, &clusters)?;
        let mut layout = Self::make_clusters(len, 0);
        layout.install(consolidate(len, clusters));
        Ok(layout)
    }

    /// Builds a layout from secondary-structure segments; every run of
    /// positions not covered by a segment becomes a coil cluster.
    pub fn from_segments(len: usize, segments: Vec<Segment>) -> Self {
        let mut covered = Mask::new(len);
        let mut clusters = Vec::with_capacity(segments.len() * 2 + 1);
        for segment in segments {
            let cluster = Cluster::from_segment(len, segment);
            covered.union_with(cluster.members());
            clusters.push(cluster);
        }

        let mut run_start = None;
        for pos in 0..=len {
            let free = pos < len && !covered.contains(pos);
            match (free, run_start) {
                (true, None) => run_start = Some(pos),
                (false, Some(start)) => {
                    clusters.push(Cluster::from_segment(
                        len,
                        Segment::Coil(Span::new(start, pos - 1)),
                    ));
                    run_start = None;
                }
                _ => {}
            }
        }
        Self::from_clusters(len, clusters)
    }

    /// Re-partitions the chain with the round-robin meshing.
    pub fn remesh(&mut self, count: usize) {
        let residues = self.len.saturating_sub(2);
        let count = if count == 0 {
            (residues / POSITIONS_PER_CLUSTER + 1).max(2)
        } else {
            count
        };
        let count = count.min(self.len.max(1));
        let clusters = (0..count)
            .map(|c| Cluster::new(Mask::from_indices(self.len, (c..self.len).step_by(count))))
            .filter(|c| c.size() > 0)
            .collect();
        self.install(consolidate(self.len, clusters));
    }

    fn install(&mut self, clusters: Vec<Cluster>) {
        self.clusters = clusters;
        self.generation += 1;
        let mut owners = vec![usize::MAX; self.len];
        for (c, cluster) in self.clusters.iter().enumerate() {
            for pos in cluster.members().iter() {
                owners[pos] = c;
            }
        }
        self.owners = Arc::new(OwnerIndex {
            generation: self.generation,
            owners,
        });
        debug!(
            clusters = self.clusters.len(),
            generation = self.generation,
            "Installed cluster layout."
        );
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, index: usize) -> Option<&Cluster> {
        self.clusters.get(index)
    }

    /// Secondary-structure classification of cluster `index`.
    pub fn kind(&self, index: usize) -> ClusterKind {
        self.clusters
            .get(index)
            .map_or(ClusterKind::Unknown, Cluster::kind)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Snapshot of the position-to-cluster lookup for the current generation.
    pub fn owner_index(&self) -> Arc<OwnerIndex> {
        Arc::clone(&self.owners)
    }

    pub fn owner(&self, position: usize) -> Option<usize> {
        self.owners.owner(position)
    }
}

/// Checks that `clusters` cover `0..len` exactly once.
pub fn validate(len: usize, clusters: &[Cluster]) -> Result<(), ClusterError> {
    let mut seen: Vec<Option<usize>> = vec![None; len];
    for (c, cluster) in clusters.iter().enumerate() {
        if cluster.members().len() != len {
            return Err(ClusterError::LengthMismatch {
                cluster: c,
                expected: len,
                found: cluster.members().len(),
            });
        }
        if cluster.size() == 0 {
            return Err(ClusterError::EmptyCluster { cluster: c });
        }
        for pos in cluster.members().iter() {
            if let Some(first) = seen[pos] {
                return Err(ClusterError::Overlap {
                    first,
                    second: c,
                    position: pos,
                });
            }
            seen[pos] = Some(c);
        }
    }
    match seen.iter().position(Option::is_none) {
        Some(position) => Err(ClusterError::Uncovered { position }),
        None => Ok(()),
    }
}

/// Pools unclassified and coil clusters of at most `SMALL_CLUSTER_MAX`
/// members. A pool of more than `SMALL_POOL_MAX` members becomes a cluster of
/// its own; a smaller pool is absorbed by the largest remaining unclassified
/// or coil cluster, or kept as is when there is none. Helix and sheet
/// clusters are never pooled.
fn consolidate(len: usize, clusters: Vec<Cluster>) -> Vec<Cluster> {
    let (small, mut kept): (Vec<Cluster>, Vec<Cluster>) = clusters
        .into_iter()
        .partition(|c| c.size() <= SMALL_CLUSTER_MAX && !c.kind().bears_tetrahedra());
    let mut pool = Mask::new(len);
    for c in &small {
        pool.union_with(c.members());
    }
    if pool.is_empty() {
        return kept;
    }

    let host = kept
        .iter_mut()
        .filter(|c| !c.kind().bears_tetrahedra())
        .max_by_key(|c| c.size());
    match host {
        Some(host) if pool.count() <= SMALL_POOL_MAX => {
            host.members.union_with(&pool);
            host.segment = None;
        }
        _ => kept.push(Cluster::new(pool)),
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(layout: &ClusterLayout) {
        let clusters = layout.clusters();
        assert!(validate(layout.len(), clusters).is_ok());
        let mut union = Mask::new(layout.len());
        for c in clusters {
            union.union_with(c.members());
        }
        assert_eq!(union.count(), layout.len());
    }

    #[test]
    fn mask_insert_contains_and_count() {
        let mut mask = Mask::new(130);
        mask.insert(0);
        mask.insert(64);
        mask.insert(129);
        mask.insert(500);
        assert_eq!(mask.count(), 3);
        assert!(mask.contains(64));
        assert!(!mask.contains(65));
        mask.remove(64);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 129]);
    }

    #[test]
    fn mask_runs_compress_consecutive_positions() {
        let mask = Mask::from_indices(12, [0, 1, 2, 5, 7, 8, 11]);
        assert_eq!(
            mask.runs(),
            vec![Span::new(0, 2), Span::new(5, 5), Span::new(7, 8), Span::new(11, 11)]
        );
        assert!(Mask::new(4).runs().is_empty());
    }

    #[test]
    fn mask_intersection_queries() {
        let a = Mask::from_indices(10, [1, 3, 5]);
        let b = Mask::from_indices(10, [2, 5, 7]);
        let c = Mask::from_indices(10, [0, 9]);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn make_clusters_meshes_round_robin() {
        let layout = ClusterLayout::make_clusters(102, 4);
        assert_eq!(layout.cluster_count(), 4);
        let first = layout.cluster(0).unwrap().indices();
        assert_eq!(&first[..3], &[0, 4, 8]);
        assert_partition(&layout);
    }

    #[test]
    fn make_clusters_default_count_scales_with_chain_length() {
        assert_eq!(ClusterLayout::make_clusters(202, 0).cluster_count(), 9);
        assert_eq!(ClusterLayout::make_clusters(22, 0).cluster_count(), 2);
    }

    #[test]
    fn small_clusters_are_pooled_into_their_own_cluster_when_large() {
        let layout = ClusterLayout::make_clusters(6, 2);
        assert_eq!(layout.cluster_count(), 1);
        assert_eq!(layout.cluster(0).unwrap().size(), 6);
        assert_partition(&layout);
    }

    #[test]
    fn small_pool_is_absorbed_by_largest_coil_cluster() {
        let len = 12;
        let clusters = vec![
            Cluster::new(Mask::from_indices(len, 0..8)),
            Cluster::new(Mask::from_indices(len, [8, 9])),
            Cluster::new(Mask::from_indices(len, [10, 11])),
        ];
        let layout = ClusterLayout::try_from_clusters(len, clusters).unwrap();
        assert_eq!(layout.cluster_count(), 1);
        assert_partition(&layout);
    }

    #[test]
    fn from_clusters_falls_back_on_overlap() {
        let len = 60;
        let clusters = vec![
            Cluster::new(Mask::from_indices(len, 0..40)),
            Cluster::new(Mask::from_indices(len, 30..60)),
        ];
        assert!(matches!(
            validate(len, &clusters),
            Err(ClusterError::Overlap { first: 0, second: 1, position: 30 })
        ));
        let layout = ClusterLayout::from_clusters(len, clusters);
        assert_eq!(layout.cluster_count(), 3);
        assert_eq!(layout.cluster(0).unwrap().indices()[1], 3);
        assert_partition(&layout);
    }

    #[test]
    fn from_clusters_falls_back_on_missing_coverage() {
        let len = 30;
        let clusters = vec![Cluster::new(Mask::from_indices(len, 0..29))];
        assert_eq!(
            validate(len, &clusters),
            Err(ClusterError::Uncovered { position: 29 })
        );
        assert_partition(&ClusterLayout::from_clusters(len, clusters));
    }

    #[test]
    fn from_segments_fills_gaps_with_coil_runs() {
        let len = 30;
        let layout = ClusterLayout::from_segments(
            len,
            vec![
                Segment::Helix(Span::new(3, 12)),
                Segment::Sheet(vec![Span::new(15, 19), Span::new(23, 27)]),
            ],
        );
        assert_partition(&layout);
        assert_eq!(layout.kind(0), ClusterKind::Helix);
        assert_eq!(layout.kind(1), ClusterKind::Sheet);
        let helix = layout.owner(5).unwrap();
        assert_eq!(layout.kind(helix), ClusterKind::Helix);
        assert_ne!(layout.owner(13), Some(helix));
    }

    #[test]
    fn owner_index_tracks_generation() {
        let mut layout = ClusterLayout::make_clusters(52, 3);
        let before = layout.owner_index();
        layout.remesh(2);
        let after = layout.owner_index();
        assert!(after.generation() > before.generation());
        assert_eq!(before.owner(3), Some(0));
        assert_eq!(after.owner(3), Some(1));
    }
}
