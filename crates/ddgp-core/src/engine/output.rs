use crate::core::models::Vertex;
use nalgebra::Point3;

/// The external output collaborator.
///
/// The search calls back exactly at two points: once per accepted full
/// solution, with the running solution ordinal (1, 2, ...), and once
/// whenever the best-known solution improves, with ordinal 0 by convention.
/// On cancellation before any solution was found, the partial coordinate
/// prefix is delivered once with ordinal 0.
pub trait SolutionSink {
    fn deliver(&mut self, vertices: &[Vertex], coords: &[Point3<f64>], ordinal: usize);
}

/// Sink that drops everything; useful when only the report matters.
#[derive(Debug, Default)]
pub struct NullSink;

impl SolutionSink for NullSink {
    fn deliver(&mut self, _vertices: &[Vertex], _coords: &[Point3<f64>], _ordinal: usize) {}
}

/// Sink that records every delivery; the test workhorse.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub deliveries: Vec<(usize, Vec<Point3<f64>>)>,
}

impl SolutionSink for CollectingSink {
    fn deliver(&mut self, _vertices: &[Vertex], coords: &[Point3<f64>], ordinal: usize) {
        self.deliveries.push((ordinal, coords.to_vec()));
    }
}

impl CollectingSink {
    /// Ordinals of the recorded deliveries, in arrival order.
    pub fn ordinals(&self) -> Vec<usize> {
        self.deliveries.iter().map(|(o, _)| *o).collect()
    }

    /// Number of deliveries carrying a nonzero solution ordinal.
    pub fn solution_count(&self) -> usize {
        self.deliveries.iter().filter(|(o, _)| *o > 0).count()
    }
}
