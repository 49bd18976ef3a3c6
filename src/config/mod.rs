// src/config/mod.rs

//! Jobs descriptor loading and validation.
//!
//! - [`model`]: the serde-backed `jobs.json` model and runner settings.
//! - [`loader`]: reading the descriptor, with one bounded retry when the file
//!   has not appeared yet.
//! - [`validate`]: semantic checks and step-filter resolution.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{JOBS_FILE, jobs_file_path, load_and_validate, read_jobs_file};
pub use model::{JobsDescriptor, RawJobsDescriptor, RunnerSettings, StepDefinition};
pub use validate::{select_steps, validate_descriptor};
