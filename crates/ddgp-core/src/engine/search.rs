//! The recursive branch-and-prune orchestrator.
//!
//! [`SearchPlan`] validates an instance and precomputes the per-vertex
//! branching data (triplet, bond angle, torsion cosines) so every setup
//! failure surfaces before the first recursive call. [`BranchAndPrune`]
//! drives the depth-first exploration: the interval variant enumerates
//! torsion sub-arcs with box pruning and local refinement, the exact variant
//! the classic two torsion branches per vertex.

use crate::core::geometry::{Aabb, Frame, cos_bond_angle, cos_torsion_angle};
use crate::core::models::{DistanceGraph, Triplet};
use crate::core::objective::largest_violation;
use crate::engine::cancel::CancelToken;
use crate::engine::config::{SolverConfig, SymmetryMode};
use crate::engine::error::EngineError;
use crate::engine::omega::{OmegaArc, OmegaIntervalSet};
use crate::engine::output::SolutionSink;
use crate::engine::pruning::{DdfOutcome, box_ddf, ddf};
use crate::engine::refine::spg;
use crate::engine::state::{BestRecord, SearchContext, SearchStats};
use nalgebra::Point3;
use std::time::Instant;
use tracing::debug;

/// Sines below this make a torsion branch collapse into its mirror.
const FLAT_SIN: f64 = 1e-6;

/// Outcome of one search run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
    pub stats: SearchStats,
    pub best: BestRecord,
    pub cancelled: bool,
}

/// Precomputed branching data of one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VertexPlan {
    triplet: Triplet,
    cos_theta: f64,
    sin_theta: f64,
    /// Parent distance the position is synthesized with.
    radius: f64,
    /// Torsion cosine at the lower extreme of the r3 bound interval.
    cos_omega_lb: f64,
    /// Torsion cosine at the upper extreme (equal to `cos_omega_lb` for an
    /// exact r3).
    cos_omega_ub: f64,
}

/// The validated, precomputed description of one search: everything the
/// recursion consumes, assembled before it starts so setup errors fail fast.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPlan {
    plans: Vec<Option<VertexPlan>>,
    symmetric: Vec<bool>,
    exact: bool,
}

impl SearchPlan {
    pub fn build(graph: &DistanceGraph, config: &SolverConfig) -> Result<Self, EngineError> {
        let eps = config.eps;
        if !graph.initial_clique(eps) {
            return Err(EngineError::MissingInitialClique);
        }
        if let Some(vertex) = graph.first_non_discretizable(eps) {
            return Err(EngineError::NotDiscretizable { vertex });
        }
        // a collinear initial clique leaves vertex 3 without a usable frame
        let d01 = graph.reference(0, 1).unwrap().lb;
        let d12 = graph.reference(1, 2).unwrap().lb;
        let d02 = graph.reference(0, 2).unwrap().lb;
        let clique_cos = cos_bond_angle(d01, d12, d02);
        if (1.0 - clique_cos * clique_cos).sqrt() < FLAT_SIN {
            return Err(EngineError::DegenerateAngle { vertex: 2 });
        }

        let exact = graph.all_exact(eps) && graph.is_consecutive(eps);
        let mut plans = vec![None; graph.len()];
        for i in 3..graph.len() {
            let plan = if exact {
                // the consecutive triplet is the fast default; fall back to
                // the stability policy when its angle is too flat
                let triplet = consecutive_triplet(graph, i);
                match plan_vertex(graph, i, triplet, eps) {
                    Ok(plan) => plan,
                    Err(EngineError::DegenerateAngle { .. }) => {
                        let triplet = graph
                            .select_triplet(i, eps)
                            .ok_or(EngineError::GraphInconsistency { vertex: i })?;
                        plan_vertex(graph, i, triplet, eps)?
                    }
                    Err(e) => return Err(e),
                }
            } else {
                let triplet = graph
                    .select_triplet(i, eps)
                    .ok_or(EngineError::GraphInconsistency { vertex: i })?;
                plan_vertex(graph, i, triplet, eps)?
            };
            plans[i] = Some(plan);
        }

        Ok(Self {
            plans,
            symmetric: graph.symmetric_layers(),
            exact,
        })
    }

    /// Rebuilds the plan with every triplet chosen by the selection policy
    /// instead of the consecutive default. The exact variant retries through
    /// this when its first attempt records no solutions.
    fn reselected(graph: &DistanceGraph, config: &SolverConfig) -> Result<Self, EngineError> {
        let eps = config.eps;
        let mut plans = vec![None; graph.len()];
        for i in 3..graph.len() {
            let triplet = graph
                .select_triplet(i, eps)
                .ok_or(EngineError::GraphInconsistency { vertex: i })?;
            plans[i] = Some(plan_vertex(graph, i, triplet, eps)?);
        }
        Ok(Self {
            plans,
            symmetric: graph.symmetric_layers(),
            exact: true,
        })
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }
}

fn consecutive_triplet(graph: &DistanceGraph, i: usize) -> Triplet {
    Triplet::new(
        *graph.reference(i, i - 1).unwrap(),
        *graph.reference(i, i - 2).unwrap(),
        *graph.reference(i, i - 3).unwrap(),
    )
}

fn plan_vertex(
    graph: &DistanceGraph,
    i: usize,
    triplet: Triplet,
    eps: f64,
) -> Result<VertexPlan, EngineError> {
    let (r1, r2, r3) = (triplet.r1, triplet.r2, triplet.r3);
    let inconsistent = EngineError::GraphInconsistency { vertex: i };
    let d21 = graph.reference(r2.other, r1.other).ok_or(inconsistent.clone())?.lb;
    let d31 = graph.reference(r3.other, r1.other).ok_or(inconsistent.clone())?.lb;
    let d32 = graph.reference(r3.other, r2.other).ok_or(inconsistent)?.lb;

    let cos_theta = cos_bond_angle(d21, r1.lb, r2.lb);
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
    if sin_theta < FLAT_SIN {
        return Err(EngineError::DegenerateAngle { vertex: i });
    }

    let degenerate = EngineError::DegenerateAngle { vertex: i };
    let cos_omega_lb = cos_torsion_angle(d32, d31, r3.lb, d21, r2.lb, r1.lb)
        .ok_or(degenerate.clone())?;
    let cos_omega_ub =
        cos_torsion_angle(d32, d31, r3.ub, d21, r2.lb, r1.lb).ok_or(degenerate)?;

    Ok(VertexPlan {
        triplet,
        cos_theta,
        sin_theta,
        radius: r1.lb,
        cos_omega_lb,
        cos_omega_ub,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Halt,
}

enum Refined {
    Feasible(DdfOutcome),
    Infeasible,
    Cancelled,
}

/// One branch-and-prune search over a validated instance.
pub struct BranchAndPrune<'a, S: SolutionSink> {
    graph: &'a DistanceGraph,
    config: &'a SolverConfig,
    plan: SearchPlan,
    sink: &'a mut S,
    cancel: CancelToken,
    ctx: SearchContext,
    deadline: Option<Instant>,
}

impl<'a, S: SolutionSink> BranchAndPrune<'a, S> {
    /// Validates the instance and prepares the search. All setup errors
    /// (missing clique, non-discretizable vertex, degenerate angles,
    /// inconsistent triplets) surface here, never during the recursion.
    pub fn new(
        graph: &'a DistanceGraph,
        config: &'a SolverConfig,
        sink: &'a mut S,
        cancel: CancelToken,
    ) -> Result<Self, EngineError> {
        let plan = SearchPlan::build(graph, config)?;
        Ok(Self {
            graph,
            config,
            plan,
            sink,
            cancel,
            ctx: SearchContext::new(graph),
            deadline: None,
        })
    }

    /// The validated plan this search will follow.
    pub fn plan(&self) -> &SearchPlan {
        &self.plan
    }

    pub fn run(mut self) -> Result<SolveReport, EngineError> {
        self.deadline = self.config.time_limit.map(|limit| Instant::now() + limit);
        self.place_initial_clique();

        let n = self.graph.len();
        if n <= 3 {
            self.record_solution(false);
        } else if self.plan.exact {
            let _ = self.explore_exact(3);

            // one retry with re-selected triplets when the consecutive
            // discretization explored the whole tree without a solution
            if self.ctx.stats.solutions == 0 && !self.should_stop() {
                let reselected = SearchPlan::reselected(self.graph, self.config)?;
                if reselected != self.plan {
                    debug!("exact search empty, retrying with re-selected triplets");
                    self.plan = reselected;
                    let _ = self.explore_exact(3);
                }
            }
        } else {
            let _ = self.explore(3);
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled && self.ctx.stats.solutions == 0 {
            // the partial prefix still goes to the output collaborator
            let upto = self.ctx.deepest + 1;
            self.sink
                .deliver(&self.graph.vertices()[..upto], &self.ctx.coords[..upto], 0);
        }

        Ok(SolveReport {
            stats: self.ctx.stats,
            best: self.ctx.best,
            cancelled,
        })
    }

    /// Places vertices 0..3 from the initial exact clique, in closed form:
    /// vertex 0 at the origin, vertex 1 on the negative x axis, vertex 2 in
    /// the upper xy plane.
    fn place_initial_clique(&mut self) {
        let d01 = self.graph.reference(0, 1).unwrap().lb;
        let d12 = self.graph.reference(1, 2).unwrap().lb;
        let d02 = self.graph.reference(0, 2).unwrap().lb;
        let cos = cos_bond_angle(d01, d12, d02);
        let sin = (1.0 - cos * cos).sqrt();

        self.ctx.coords[0] = Point3::origin();
        self.ctx.coords[1] = Point3::new(-d01, 0.0, 0.0);
        self.ctx.coords[2] = Point3::new(-d01 + d12 * cos, d12 * sin, 0.0);
        for i in 0..3 {
            self.ctx.boxes[i] = Aabb::point(self.ctx.coords[i]).inflate(self.config.eps);
            self.ctx.partial[i] = ddf(self.graph, i, &self.ctx.coords, self.config.eps).partial;
        }
        self.ctx.deepest = 2;
    }

    /// Interval variant: one recursion level, iterating the torsion
    /// sub-arcs of vertex `i`.
    fn explore(&mut self, i: usize) -> Flow {
        self.ctx.stats.calls += 1;
        let plan = self.plan.plans[i].expect("branching vertex has a plan");
        let p1 = self.ctx.coords[plan.triplet.r1.other];
        let p2 = self.ctx.coords[plan.triplet.r2.other];
        let p3 = self.ctx.coords[plan.triplet.r3.other];
        let frame = Frame::from_points(&p1, &p2, &p3);

        let arcs = OmegaIntervalSet::build(
            plan.cos_omega_lb,
            plan.cos_omega_ub,
            self.plan.symmetric[i],
            plan.radius,
            self.config.resolution,
            self.config.eps,
        );

        for arc in self.arc_order(i, &arcs) {
            if self.should_stop() {
                return Flow::Halt;
            }

            let mid = arc.midpoint();
            let pos = frame.synthesize(
                &p1,
                plan.radius,
                plan.cos_theta,
                plan.sin_theta,
                mid.cos(),
                mid.sin(),
            );
            self.ctx.coords[i] = pos;
            self.ctx.deepest = self.ctx.deepest.max(i);

            let lo_pos = frame.synthesize(
                &p1,
                plan.radius,
                plan.cos_theta,
                plan.sin_theta,
                arc.lo.cos(),
                arc.lo.sin(),
            );
            let hi_pos = frame.synthesize(
                &p1,
                plan.radius,
                plan.cos_theta,
                plan.sin_theta,
                arc.hi.cos(),
                arc.hi.sin(),
            );
            self.ctx.boxes[i] =
                Aabb::from_points(&[lo_pos, pos, hi_pos]).inflate(self.config.eps);

            if box_ddf(self.graph, i, &self.ctx.boxes, self.config.eps) > 0 {
                self.ctx.stats.pruned += 1;
                continue;
            }

            let outcome = ddf(self.graph, i, &self.ctx.coords, self.config.eps);
            let outcome = if outcome.is_feasible() {
                outcome
            } else {
                match self.try_refine(i) {
                    Refined::Feasible(refined) => refined,
                    Refined::Infeasible => {
                        self.ctx.stats.pruned += 1;
                        continue;
                    }
                    Refined::Cancelled => return Flow::Halt,
                }
            };
            self.ctx.partial[i] = outcome.partial;

            if i + 1 < self.graph.len() {
                if self.explore(i + 1) == Flow::Halt {
                    return Flow::Halt;
                }
            } else {
                self.record_solution(true);
            }

            if self.solution_budget_reached() || self.should_stop() {
                return Flow::Halt;
            }
        }
        Flow::Continue
    }

    /// Exact variant: two torsion branches per vertex, no boxes, no
    /// refinement.
    fn explore_exact(&mut self, i: usize) -> Flow {
        self.ctx.stats.calls += 1;
        let plan = self.plan.plans[i].expect("branching vertex has a plan");
        let p1 = self.ctx.coords[plan.triplet.r1.other];
        let p2 = self.ctx.coords[plan.triplet.r2.other];
        let p3 = self.ctx.coords[plan.triplet.r3.other];
        let frame = Frame::from_points(&p1, &p2, &p3);

        let cos_omega = plan.cos_omega_lb;
        let sin_omega = (1.0 - cos_omega * cos_omega).sqrt();
        let signs: &[f64] = if sin_omega < FLAT_SIN {
            &[1.0]
        } else if i == 3 {
            match self.config.symmetry {
                SymmetryMode::All => &[1.0, -1.0],
                SymmetryMode::LeftHalf => &[1.0],
                SymmetryMode::RightHalf => &[-1.0],
            }
        } else {
            &[1.0, -1.0]
        };

        for &sign in signs {
            if self.should_stop() {
                return Flow::Halt;
            }

            let pos = frame.synthesize(
                &p1,
                plan.radius,
                plan.cos_theta,
                plan.sin_theta,
                cos_omega,
                sign * sin_omega,
            );
            self.ctx.coords[i] = pos;
            self.ctx.deepest = self.ctx.deepest.max(i);
            self.ctx.boxes[i] = Aabb::point(pos).inflate(self.config.eps);

            let outcome = ddf(self.graph, i, &self.ctx.coords, self.config.eps);
            if !outcome.is_feasible() {
                self.ctx.stats.pruned += 1;
                continue;
            }
            self.ctx.partial[i] = outcome.partial;

            if i + 1 < self.graph.len() {
                if self.explore_exact(i + 1) == Flow::Halt {
                    return Flow::Halt;
                }
            } else {
                self.record_solution(false);
            }

            if self.solution_budget_reached() || self.should_stop() {
                return Flow::Halt;
            }
        }
        Flow::Continue
    }

    /// Iteration order over the sub-arcs, honoring the symmetry exploration
    /// mode at the first branching vertex.
    fn arc_order(&self, i: usize, arcs: &OmegaIntervalSet) -> Vec<OmegaArc> {
        if i == 3 {
            let half = arcs.len().div_ceil(2);
            match self.config.symmetry {
                SymmetryMode::All => arcs.iter().collect(),
                SymmetryMode::LeftHalf => arcs.iter().take(half).collect(),
                SymmetryMode::RightHalf => {
                    let mut tail: Vec<_> = arcs.iter().rev().take(half).collect();
                    tail.reverse();
                    tail
                }
            }
        } else {
            arcs.iter().collect()
        }
    }

    /// Escalates an infeasible placement to the local refiner, expanding the
    /// box margin on every retry. Retries stop early once the vertex's mean
    /// deviation no longer improves.
    fn try_refine(&mut self, i: usize) -> Refined {
        let upto = i + 1;
        self.ctx.snapshot[..upto].copy_from_slice(&self.ctx.coords[..upto]);

        let mut last_error = f64::INFINITY;
        for attempt in 0..self.config.spg.max_box_expansions {
            if self.cancel.is_cancelled() {
                self.ctx.coords[..upto].copy_from_slice(&self.ctx.snapshot[..upto]);
                return Refined::Cancelled;
            }
            self.ctx.stats.refinement_attempts += 1;
            let margin = self.config.eps * (1u64 << attempt) as f64;
            let refinement = spg(
                self.graph,
                i + 1,
                &mut self.ctx.coords,
                &self.ctx.boxes,
                margin,
                &self.config.spg,
                &mut self.ctx.workspace,
            );
            let outcome = ddf(self.graph, i, &self.ctx.coords, self.config.eps);
            if outcome.is_feasible() {
                self.ctx.stats.refinement_successes += 1;
                return Refined::Feasible(outcome);
            }
            debug!(
                vertex = i,
                attempt,
                outcome = ?refinement.outcome,
                objective = refinement.objective,
                "refinement left the placement infeasible"
            );
            let error = outcome.partial.mean();
            if error >= last_error {
                break;
            }
            last_error = error;
        }
        self.ctx.coords[..upto].copy_from_slice(&self.ctx.snapshot[..upto]);
        Refined::Infeasible
    }

    /// Handles a realized full structure: near-duplicate skip, counters,
    /// quality evaluation, delivery, best tracking.
    fn record_solution(&mut self, check_distinct: bool) {
        let n = self.graph.len();
        if check_distinct {
            if let Some(d) = self.ctx.distance_to_previous() {
                if d < self.config.resolution {
                    return;
                }
            }
        }

        self.ctx.stats.solutions += 1;
        let ordinal = self.ctx.stats.solutions;
        let lde = largest_violation(self.graph, n, &self.ctx.coords, self.config.eps);
        // the per-level accumulators assemble into the mean violation
        let mde: f64 = self.ctx.partial.iter().map(|p| p.sum).sum::<f64>() / n as f64;
        self.ctx.save_as_previous();
        self.sink.deliver(self.graph.vertices(), &self.ctx.coords, ordinal);

        if lde < self.ctx.best.largest_violation {
            self.ctx.best = BestRecord {
                ordinal,
                largest_violation: lde,
                mean_violation: mde,
            };
            self.sink.deliver(self.graph.vertices(), &self.ctx.coords, 0);
        }
        debug!(ordinal, lde, mde, "solution recorded");
    }

    fn solution_budget_reached(&self) -> bool {
        let found = self.ctx.stats.solutions;
        (self.config.single_solution && found >= 1)
            || (self.config.max_solutions > 0 && found >= self.config.max_solutions)
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}
