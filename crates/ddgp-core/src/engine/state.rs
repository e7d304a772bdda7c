use crate::core::geometry::Aabb;
use crate::core::models::DistanceGraph;
use crate::engine::refine::SpgWorkspace;
use nalgebra::Point3;

/// Execution counters of one search, reported to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Branching calls made (one per vertex visit).
    pub calls: u64,
    /// Sub-arcs abandoned by box or exact pruning.
    pub pruned: u64,
    /// Local refinement invocations.
    pub refinement_attempts: u64,
    /// Refinements after which the exact test passed.
    pub refinement_successes: u64,
    /// Accepted full solutions.
    pub solutions: usize,
}

/// Quality of the best solution found so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestRecord {
    /// Ordinal of the best solution (0 while none was recorded).
    pub ordinal: usize,
    pub largest_violation: f64,
    pub mean_violation: f64,
}

impl Default for BestRecord {
    fn default() -> Self {
        Self {
            ordinal: 0,
            largest_violation: f64::INFINITY,
            mean_violation: f64::INFINITY,
        }
    }
}

/// Normalized violation accumulator of one vertex's references, carried so
/// a full solution's mean error assembles from per-level contributions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialError {
    pub count: usize,
    pub sum: f64,
}

impl PartialError {
    /// Mean normalized deviation, 0 for a vertex without scaled references.
    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }
}

/// All mutable state owned by one search.
///
/// Coordinates, boxes, and partial errors are indexed by vertex and
/// overwritten in place as the recursion descends; a sibling branch fully
/// rewrites its level before anything reads it, so backtracking needs no
/// undo log. The previous-solution matrix supports the near-duplicate skip,
/// and the workspace keeps the refiner allocation-free.
#[derive(Debug)]
pub struct SearchContext {
    pub coords: Vec<Point3<f64>>,
    pub boxes: Vec<Aabb>,
    pub partial: Vec<PartialError>,
    pub previous: Option<Vec<Point3<f64>>>,
    /// Highest vertex index realized so far; bounds the prefix delivered on
    /// cancellation.
    pub deepest: usize,
    pub workspace: SpgWorkspace,
    /// Coordinate snapshot taken before a refinement escalation, restored
    /// when every retry fails so sibling branches see unperturbed ancestors.
    pub snapshot: Vec<Point3<f64>>,
    pub stats: SearchStats,
    pub best: BestRecord,
}

impl SearchContext {
    pub fn new(graph: &DistanceGraph) -> Self {
        let n = graph.len();
        Self {
            coords: vec![Point3::origin(); n],
            boxes: vec![Aabb::point(Point3::origin()); n],
            partial: vec![PartialError::default(); n],
            previous: None,
            deepest: 0,
            workspace: SpgWorkspace::new(n, graph.reference_count()),
            snapshot: vec![Point3::origin(); n],
            stats: SearchStats::default(),
            best: BestRecord::default(),
        }
    }

    /// Mean per-vertex distance between the current coordinates and the
    /// previously recorded solution; `None` before any solution exists.
    pub fn distance_to_previous(&self) -> Option<f64> {
        let previous = self.previous.as_ref()?;
        let n = self.coords.len();
        let sum: f64 = self
            .coords
            .iter()
            .zip(previous)
            .map(|(a, b)| (a - b).norm())
            .sum();
        Some(sum / n as f64)
    }

    /// Saves the current coordinates as the reference for the next
    /// near-duplicate check.
    pub fn save_as_previous(&mut self) {
        match &mut self.previous {
            Some(prev) => prev.copy_from_slice(&self.coords),
            None => self.previous = Some(self.coords.clone()),
        }
    }
}
