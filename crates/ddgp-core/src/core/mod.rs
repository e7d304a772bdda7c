pub mod geometry;
pub mod models;
pub mod objective;
