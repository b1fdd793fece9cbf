//! # MSIBI Core Library
//!
//! A library for multistate iterative Boltzmann inversion: refining tabulated
//! coarse-grained potentials until the distributions they produce match
//! target distributions at one or more thermodynamic states.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict layered architecture to keep the
//! numerical kernels pure and the orchestration testable without a
//! simulation engine installed.
//!
//! - **[`core`]: The Foundation.** Stateless numerics: grids and
//!   distributions, structural sampling from trajectories, potential forms,
//!   the Boltzmann-inversion correction, and the fit metric.
//!
//! - **[`io`]: Persistence.** Trajectory readers behind the
//!   `TrajectoryReader` trait, plus the plain-text table and distribution
//!   formats exchanged with the simulation engine.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer owns the states and
//!   force tables, dispatches query simulations across workers through the
//!   `EngineAdapter` seam, and applies the multistate correction.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing
//!   layer. [`workflows::Msibi`] ties the engine and core together into a
//!   complete, resumable optimization run.

pub mod core;
pub mod engine;
pub mod io;
pub mod workflows;
