//! The user-facing solve workflow: validate an instance, pick the search
//! variant, run the branch-and-prune exploration, and report the outcome.

use crate::core::models::DistanceGraph;
use crate::engine::cancel::CancelToken;
use crate::engine::config::SolverConfig;
use crate::engine::error::EngineError;
use crate::engine::output::SolutionSink;
use crate::engine::search::{BranchAndPrune, SolveReport};
use tracing::{info, instrument};

/// Realizes an instance end to end.
///
/// Setup failures (missing clique, non-discretizable vertices, degenerate
/// angles) surface before any recursion begins; afterwards the search can
/// only end by exhaustion, by a stop condition, or through the cancellation
/// token, always with a valid report. The sink receives every accepted
/// solution plus the current best (ordinal 0), or the partial prefix when
/// the search is cancelled empty-handed.
#[instrument(skip_all, name = "solve_workflow")]
pub fn run<S: SolutionSink>(
    graph: &DistanceGraph,
    config: &SolverConfig,
    sink: &mut S,
    cancel: CancelToken,
) -> Result<SolveReport, EngineError> {
    info!(
        vertices = graph.len(),
        references = graph.reference_count(),
        eps = config.eps,
        "validating instance"
    );

    let search = BranchAndPrune::new(graph, config, sink, cancel)?;
    info!(
        exact = search.plan().is_exact(),
        "instance validated, exploring the search tree"
    );

    let report = search.run()?;

    info!(
        solutions = report.stats.solutions,
        calls = report.stats.calls,
        pruned = report.stats.pruned,
        refinements = report.stats.refinement_attempts,
        cancelled = report.cancelled,
        "search finished"
    );
    if report.stats.solutions > 0 {
        info!(
            best = report.best.ordinal,
            largest_violation = report.best.largest_violation,
            mean_violation = report.best.mean_violation,
            "best solution"
        );
    }
    Ok(report)
}
