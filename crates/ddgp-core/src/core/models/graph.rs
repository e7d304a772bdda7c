use super::vertex::{Reference, Vertex};

/// The distance graph of an instance: vertices in discretization order, each
/// holding its references to lower-indexed vertices.
///
/// The graph is built incrementally by an external loader and is immutable
/// during the search. A distance between i and j (i < j) is stored exactly
/// once, in the reference list of vertex j.
#[derive(Debug, Clone, Default)]
pub struct DistanceGraph {
    vertices: Vec<Vertex>,
}

impl DistanceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph with `n` bare vertices (no references, no metadata).
    pub fn with_vertices(n: usize) -> Self {
        Self {
            vertices: (0..n).map(Vertex::new).collect(),
        }
    }

    pub fn push_vertex(&mut self, vertex: Vertex) {
        debug_assert_eq!(vertex.id, self.vertices.len());
        self.vertices.push(vertex);
    }

    /// Adds the distance constraint between `i` and `j` (any order), storing
    /// it under the higher-indexed vertex.
    pub fn add_distance(&mut self, i: usize, j: usize, lb: f64, ub: f64) {
        debug_assert!(i != j, "self-distance ({i},{i})");
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        self.vertices[hi].refs.push(Reference::new(lo, lb, ub));
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex(&self, i: usize) -> &Vertex {
        &self.vertices[i]
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// The reference holding the distance between `i` and `j`, regardless of
    /// argument order, or `None` when no such distance exists.
    pub fn reference(&self, i: usize, j: usize) -> Option<&Reference> {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        self.vertices.get(hi)?.reference_to(lo)
    }

    /// Total number of distances stored across all reference lists.
    pub fn reference_count(&self) -> usize {
        self.vertices.iter().map(Vertex::reference_count).sum()
    }

    /// All bound-interval midpoints, in storage order (vertex by vertex,
    /// reference by reference). This is the layout the refiner's auxiliary
    /// distance variables use.
    pub fn distance_list(&self) -> Vec<f64> {
        self.vertices
            .iter()
            .flat_map(|v| v.refs.iter().map(Reference::midpoint))
            .collect()
    }

    /// Number of references among the first `n` vertices only.
    pub fn reference_count_upto(&self, n: usize) -> usize {
        self.vertices[..n].iter().map(Vertex::reference_count).sum()
    }

    /// True when every stored reference is exact within `eps`.
    pub fn all_exact(&self, eps: f64) -> bool {
        self.vertices
            .iter()
            .all(|v| v.refs.iter().all(|r| r.is_exact(eps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangle_graph() -> DistanceGraph {
        let mut g = DistanceGraph::with_vertices(4);
        g.add_distance(0, 1, 1.0, 1.0);
        g.add_distance(0, 2, 1.6, 1.6);
        g.add_distance(1, 2, 1.0, 1.0);
        g.add_distance(3, 1, 1.5, 1.5);
        g.add_distance(3, 2, 1.0, 1.2);
        g
    }

    #[test]
    fn distances_are_stored_under_the_higher_vertex() {
        let g = two_triangle_graph();
        assert_eq!(g.vertex(0).reference_count(), 0);
        assert_eq!(g.vertex(2).reference_count(), 2);
        // (3,1) was added with the higher vertex first
        assert_eq!(g.vertex(3).reference_count(), 2);
    }

    #[test]
    fn reference_lookup_ignores_argument_order() {
        let g = two_triangle_graph();
        assert_eq!(g.reference(1, 3).unwrap().lb, 1.5);
        assert_eq!(g.reference(3, 1).unwrap().lb, 1.5);
        assert!(g.reference(0, 3).is_none());
    }

    #[test]
    fn reference_count_sums_all_lists() {
        let g = two_triangle_graph();
        assert_eq!(g.reference_count(), 5);
        assert_eq!(g.reference_count_upto(3), 3);
    }

    #[test]
    fn distance_list_uses_interval_midpoints_in_storage_order() {
        let g = two_triangle_graph();
        let y = g.distance_list();
        assert_eq!(y.len(), 5);
        assert_eq!(y[0], 1.0); // (0,1)
        assert_eq!(y[4], 1.1); // (3,2) midpoint of [1.0, 1.2]
    }

    #[test]
    fn all_exact_detects_the_interval_reference() {
        let g = two_triangle_graph();
        assert!(!g.all_exact(1e-3));
        assert!(g.all_exact(0.5));
    }
}
