use super::cluster::{ClusterKind, Mask};
use nalgebra::{DMatrix, Vector3};
use tracing::warn;

const HELIX_RADIUS: f64 = 2.3;
const HELIX_RISE: f64 = 1.5;
const HELIX_TWIST_DEGREES: f64 = 100.0;
const STRAND_RISE: f64 = 3.3;
const STRAND_PLEAT: f64 = 0.9;

/// Longest run of chain positions covered by a single helix tetrahedron.
const HELIX_TETRAHEDRON_SPAN: usize = 7;

/// An inclusive run of chain positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn positions(self) -> impl Iterator<Item = usize> {
        self.start..=self.end
    }
}

/// A secondary-structure segment of the chain.
///
/// Sheets that share strands are merged into a single `Sheet` before the
/// projection or tangle engines see them.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Helix(Span),
    Sheet(Vec<Span>),
    Coil(Span),
}

impl Segment {
    pub fn kind(&self) -> ClusterKind {
        match self {
            Segment::Helix(_) => ClusterKind::Helix,
            Segment::Sheet(_) => ClusterKind::Sheet,
            Segment::Coil(_) => ClusterKind::Coil,
        }
    }

    pub fn spans(&self) -> Vec<Span> {
        match self {
            Segment::Helix(span) | Segment::Coil(span) => vec![*span],
            Segment::Sheet(strands) => strands.clone(),
        }
    }

    /// Membership mask over a chain of `len` positions; positions beyond the
    /// chain are dropped.
    pub fn mask(&self, len: usize) -> Mask {
        Mask::from_indices(
            len,
            self.spans()
                .into_iter()
                .flat_map(|s| s.positions())
                .filter(|&i| i < len),
        )
    }

    /// Chain positions of the tetrahedra erected on this segment.
    ///
    /// Helices are covered by overlapping windows of at most
    /// `HELIX_TETRAHEDRON_SPAN` positions; sheets get one tetrahedron per
    /// pair of consecutive strands spanned by the strand termini. Coils carry
    /// no tetrahedra.
    pub fn tetrahedra(&self) -> Vec<[usize; 4]> {
        match self {
            Segment::Helix(span) => helix_tetrahedra(*span),
            Segment::Sheet(strands) => strands
                .windows(2)
                .filter(|pair| pair[0] != pair[1])
                .map(|pair| [pair[0].start, pair[0].end, pair[1].start, pair[1].end])
                .filter(|t| distinct(t))
                .collect(),
            Segment::Coil(_) => Vec::new(),
        }
    }

    /// Ideal Cα coordinates for every position whose local geometry is
    /// fixed by the segment type. Strands of a sheet are returned as
    /// independent groups because their register is not known here.
    pub fn ideal_coords(&self) -> Vec<Vec<(usize, Vector3<f64>)>> {
        match self {
            Segment::Helix(span) => vec![
                span.positions()
                    .enumerate()
                    .map(|(k, pos)| {
                        let angle = (k as f64 * HELIX_TWIST_DEGREES).to_radians();
                        let coords = Vector3::new(
                            HELIX_RADIUS * angle.cos(),
                            HELIX_RADIUS * angle.sin(),
                            k as f64 * HELIX_RISE,
                        );
                        (pos, coords)
                    })
                    .collect(),
            ],
            Segment::Sheet(strands) => strands
                .iter()
                .map(|span| {
                    span.positions()
                        .enumerate()
                        .map(|(k, pos)| {
                            let pleat = if k % 2 == 0 { STRAND_PLEAT } else { -STRAND_PLEAT };
                            (pos, Vector3::new(k as f64 * STRAND_RISE, 0.0, pleat))
                        })
                        .collect()
                })
                .collect(),
            Segment::Coil(_) => Vec::new(),
        }
    }

    /// Overwrites the intra-segment entries of a squared-distance restraint
    /// matrix with the distances of the ideal structure. Returns the number of
    /// pairs written.
    pub fn refresh_ideal(&self, sqdist: &mut DMatrix<f64>) -> usize {
        let n = sqdist.nrows();
        if sqdist.ncols() != n {
            warn!(
                rows = n,
                cols = sqdist.ncols(),
                "Cannot refresh ideal geometry in a non-square matrix."
            );
            return 0;
        }
        let mut written = 0;
        for group in self.ideal_coords() {
            if group.iter().any(|&(pos, _)| pos >= n) {
                warn!(
                    kind = ?self.kind(),
                    len = n,
                    "Segment extends beyond the restraint matrix; skipping ideal refresh."
                );
                continue;
            }
            for (a, &(i, pi)) in group.iter().enumerate() {
                for &(j, pj) in &group[a + 1..] {
                    let d2 = (pi - pj).norm_squared();
                    sqdist[(i, j)] = d2;
                    sqdist[(j, i)] = d2;
                    written += 1;
                }
            }
        }
        written
    }
}

fn distinct(t: &[usize; 4]) -> bool {
    (0..4).all(|a| ((a + 1)..4).all(|b| t[a] != t[b]))
}

fn helix_tetrahedra(span: Span) -> Vec<[usize; 4]> {
    if span.len() < 4 {
        return Vec::new();
    }
    let mut tetrahedra = Vec::new();
    let mut first = span.start;
    loop {
        let mut last = (first + HELIX_TETRAHEDRON_SPAN - 1).min(span.end);
        if last - first < 3 {
            first = last - 3;
            last = first + 3;
        }
        let width = last - first;
        tetrahedra.push([first, first + width / 3, first + 2 * width / 3, last]);
        if last >= span.end {
            break;
        }
        first = last;
    }
    tetrahedra
}
