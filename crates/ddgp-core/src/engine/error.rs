use thiserror::Error;

/// Setup-time failures surfaced before any recursion begins.
///
/// In-search conditions (pruning, refinement stall, cancellation) are not
/// errors: they are handled inside the orchestrator and only move counters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("the first three vertices are not pairwise connected by exact distances")]
    MissingInitialClique,

    #[error(
        "vertex {vertex} is not discretizable: it needs three references, two of them exact"
    )]
    NotDiscretizable { vertex: usize },

    #[error("no usable reference triplet exists for vertex {vertex} despite classification")]
    GraphInconsistency { vertex: usize },

    #[error("the reference triplet of vertex {vertex} yields a numerically singular frame")]
    DegenerateAngle { vertex: usize },
}
