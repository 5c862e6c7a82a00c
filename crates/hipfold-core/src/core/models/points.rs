use crate::core::utils::geometry;
use nalgebra::{DMatrix, DVector};
use tracing::warn;

/// An explicit selection of point indices.
///
/// Views replace hidden "active subset" masks: every operation that should
/// act on a subset of a [`PointSet`] receives the subset as an argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    indices: Vec<usize>,
}

impl View {
    pub fn new(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }
}

/// Ordered chain positions (including the two terminus sentinels) with a
/// uniform, changeable dimensionality and a per-point activity flag.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    dim: usize,
    points: Vec<DVector<f64>>,
    active: Vec<bool>,
}

impl PointSet {
    /// Creates `len` active points at the origin of a `dim`-dimensional space.
    pub fn new(len: usize, dim: usize) -> Self {
        Self {
            dim,
            points: vec![DVector::zeros(dim); len],
            active: vec![true; len],
        }
    }

    /// Builds a point set from explicit coordinates; all points become active.
    ///
    /// Returns `None` when the coordinates do not share one dimensionality.
    pub fn from_points(points: Vec<DVector<f64>>) -> Option<Self> {
        let dim = points.first().map_or(0, |p| p.len());
        if points.iter().any(|p| p.len() != dim) {
            return None;
        }
        let len = points.len();
        Some(Self {
            dim,
            points,
            active: vec![true; len],
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Changes the dimensionality of every point, truncating trailing
    /// coordinates or padding with zeros.
    pub fn set_dimension(&mut self, dim: usize) {
        if dim == self.dim {
            return;
        }
        for p in &mut self.points {
            let mut resized = DVector::zeros(dim);
            let shared = dim.min(p.len());
            resized.rows_mut(0, shared).copy_from(&p.rows(0, shared));
            *p = resized;
        }
        self.dim = dim;
    }

    pub fn point(&self, index: usize) -> Option<&DVector<f64>> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[DVector<f64>] {
        &self.points
    }

    /// Overwrites one point. A vector of the wrong dimensionality or an
    /// out-of-range index leaves the set unchanged.
    pub fn set_point(&mut self, index: usize, coords: DVector<f64>) {
        if coords.len() != self.dim {
            warn!(
                index,
                expected = self.dim,
                found = coords.len(),
                "Ignoring point update with mismatched dimension."
            );
            return;
        }
        match self.points.get_mut(index) {
            Some(p) => *p = coords,
            None => warn!(index, len = self.points.len(), "Ignoring out-of-range point update."),
        }
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    pub fn set_active(&mut self, index: usize, active: bool) {
        if let Some(flag) = self.active.get_mut(index) {
            *flag = active;
        }
    }

    /// All active points.
    pub fn view(&self) -> View {
        View {
            indices: (0..self.len()).filter(|&i| self.active[i]).collect(),
        }
    }

    /// Active points among `indices`.
    pub fn view_of(&self, indices: impl IntoIterator<Item = usize>) -> View {
        View::new(
            indices
                .into_iter()
                .filter(|&i| self.is_active(i))
                .collect(),
        )
    }

    pub fn centroid(&self, view: &View) -> Option<DVector<f64>> {
        let selected: Vec<DVector<f64>> = view
            .indices()
            .iter()
            .filter_map(|&i| self.points.get(i).cloned())
            .collect();
        if selected.is_empty() {
            return None;
        }
        geometry::centroid(&selected)
    }

    pub fn translate(&mut self, view: &View, shift: &DVector<f64>) {
        if shift.len() != self.dim {
            warn!(
                expected = self.dim,
                found = shift.len(),
                "Ignoring translation with mismatched dimension."
            );
            return;
        }
        for &i in view.indices() {
            if let Some(p) = self.points.get_mut(i) {
                *p += shift;
            }
        }
    }

    pub fn scale(&mut self, view: &View, factor: f64) {
        for &i in view.indices() {
            if let Some(p) = self.points.get_mut(i) {
                *p *= factor;
            }
        }
    }

    /// Replaces every selected point `p` by `m * p`.
    pub fn premultiply(&mut self, view: &View, m: &DMatrix<f64>) {
        if m.nrows() != self.dim || m.ncols() != self.dim {
            warn!(
                expected = self.dim,
                rows = m.nrows(),
                cols = m.ncols(),
                "Ignoring premultiplication by a matrix of the wrong shape."
            );
            return;
        }
        for &i in view.indices() {
            if let Some(p) = self.points.get_mut(i) {
                *p = m * &*p;
            }
        }
    }

    /// Squared pairwise distances among the selected points, in view order.
    pub fn sqdist_matrix(&self, view: &View) -> DMatrix<f64> {
        let selected: Vec<DVector<f64>> = view
            .indices()
            .iter()
            .filter_map(|&i| self.points.get(i).cloned())
            .collect();
        geometry::squared_distance_matrix(&selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_of_points(n: usize) -> PointSet {
        PointSet::from_points(
            (0..n)
                .map(|i| DVector::from_column_slice(&[i as f64, 0.0]))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn new_point_set_is_all_active_at_origin() {
        let ps = PointSet::new(4, 3);
        assert_eq!(ps.len(), 4);
        assert_eq!(ps.dim(), 3);
        assert_eq!(ps.view().len(), 4);
        assert!(ps.points().iter().all(|p| p.norm() == 0.0));
    }

    #[test]
    fn from_points_rejects_mixed_dimensions() {
        let pts = vec![DVector::zeros(2), DVector::zeros(3)];
        assert!(PointSet::from_points(pts).is_none());
    }

    #[test]
    fn inactive_points_are_excluded_from_views_and_centroid() {
        let mut ps = line_of_points(4);
        ps.set_active(3, false);
        let view = ps.view();
        assert_eq!(view.indices(), &[0, 1, 2]);
        let c = ps.centroid(&view).unwrap();
        assert!((c[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn view_of_filters_inactive_and_sorts_indices() {
        let mut ps = line_of_points(5);
        ps.set_active(2, false);
        let view = ps.view_of([4, 2, 0, 4]);
        assert_eq!(view.indices(), &[0, 4]);
    }

    #[test]
    fn translate_only_moves_selected_points() {
        let mut ps = line_of_points(3);
        let view = View::new(vec![1]);
        ps.translate(&view, &DVector::from_column_slice(&[0.0, 5.0]));
        assert_eq!(ps.point(1).unwrap()[1], 5.0);
        assert_eq!(ps.point(0).unwrap()[1], 0.0);
    }

    #[test]
    fn translate_with_wrong_dimension_is_a_no_op() {
        let mut ps = line_of_points(3);
        let before = ps.clone();
        ps.translate(&ps.view(), &DVector::from_column_slice(&[1.0, 1.0, 1.0]));
        assert_eq!(ps, before);
    }

    #[test]
    fn premultiply_rotates_selected_points() {
        let mut ps = line_of_points(3);
        let rot = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]);
        ps.premultiply(&ps.view(), &rot);
        let p = ps.point(2).unwrap();
        assert!(p[0].abs() < 1e-12);
        assert!((p[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn scale_and_sqdist_matrix_agree() {
        let mut ps = line_of_points(3);
        ps.scale(&ps.view(), 2.0);
        let d = ps.sqdist_matrix(&ps.view());
        assert!((d[(0, 2)] - 16.0).abs() < 1e-12);
    }

    #[test]
    fn set_dimension_pads_and_truncates() {
        let mut ps = line_of_points(2);
        ps.set_dimension(4);
        assert_eq!(ps.point(1).unwrap().len(), 4);
        assert_eq!(ps.point(1).unwrap()[0], 1.0);
        ps.set_dimension(1);
        assert_eq!(ps.dim(), 1);
        assert_eq!(ps.point(1).unwrap()[0], 1.0);
    }

    #[test]
    fn set_point_rejects_wrong_dimension() {
        let mut ps = line_of_points(2);
        ps.set_point(0, DVector::zeros(3));
        assert_eq!(ps.point(0).unwrap().len(), 2);
    }
}
