// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`runner`] owns the per-realization step sequence and produces the
//!   ordered message stream.
//! - [`step`] supervises a single step process (`tokio::process::Command`),
//!   sampling it while it runs.
//! - [`sampler`] snapshots a process tree's resource usage.

pub mod runner;
pub mod sampler;
pub mod step;

pub use runner::{JobRunner, RunSupervisor};
pub use sampler::ProcessTreeSampler;
pub use step::SPAWN_FAILURE_EXIT_CODE;
