//! # DDGP Core Library
//!
//! A branch-and-prune engine for discretizable distance geometry: given a
//! sparse set of pairwise distance constraints (exact or interval-valued)
//! whose order admits a discretization, realize 3D point placements that
//! satisfy them.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   (`DistanceGraph`, references, triplets), pure geometric math (frames,
//!   dihedral cosines, box distance bounds), and the objective functions
//!   driving the local refiner.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer hosts the search
//!   machinery: torsion-arc enumeration, exact and interval-box pruning, the
//!   spectral projected gradient refiner, and the recursive branch-and-prune
//!   orchestrator with its search context.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing layer.
//!   It validates an instance against the discretization assumptions (fail
//!   fast, before any recursion) and drives a complete solve, reporting
//!   counters and solution quality.

pub mod core;
pub mod engine;
pub mod workflows;
