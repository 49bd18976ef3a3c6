#![allow(dead_code)]

use std::path::{Path, PathBuf};

use fmrunner::config::{JOBS_FILE, JobsDescriptor, RawJobsDescriptor, StepDefinition};

/// Builder for a jobs descriptor, either in memory or written as
/// `jobs.json` into a run directory.
pub struct JobsDescriptorBuilder {
    raw: RawJobsDescriptor,
}

impl JobsDescriptorBuilder {
    pub fn new(realization: usize) -> Self {
        Self {
            raw: RawJobsDescriptor {
                real_id: realization,
                ..Default::default()
            },
        }
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.raw.steps.push(step);
        self
    }

    pub fn ens_id(mut self, id: &str) -> Self {
        self.raw.ens_id = Some(id.to_string());
        self
    }

    pub fn experiment_id(mut self, id: &str) -> Self {
        self.raw.experiment_id = Some(id.to_string());
        self
    }

    pub fn dispatch_url(mut self, url: &str) -> Self {
        self.raw.dispatch_url = Some(url.to_string());
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.raw.ee_token = Some(token.to_string());
        self
    }

    pub fn global_env(mut self, key: &str, value: &str) -> Self {
        self.raw.global_environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn raw(&self) -> &RawJobsDescriptor {
        &self.raw
    }

    pub fn build(self) -> JobsDescriptor {
        JobsDescriptor::try_from(self.raw).expect("Failed to build valid descriptor from builder")
    }

    /// Write `jobs.json` into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join(JOBS_FILE);
        let json = serde_json::to_string_pretty(&self.raw).expect("descriptor serializes");
        std::fs::write(&path, json).expect("write jobs.json");
        path
    }
}

/// Builder for one `jobList` entry.
pub struct StepBuilder {
    step: StepDefinition,
}

impl StepBuilder {
    pub fn new(name: &str, executable: &str) -> Self {
        Self {
            step: StepDefinition::new(name, executable),
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.step.args.push(arg.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.step.required = false;
        self
    }

    pub fn stdout(mut self, file: &str) -> Self {
        self.step.stdout = Some(file.to_string());
        self
    }

    pub fn stderr(mut self, file: &str) -> Self {
        self.step.stderr = Some(file.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.step.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> StepDefinition {
        self.step
    }
}

/// A step running `script` through `/bin/sh -c`.
pub fn shell_step(name: &str, script: &str) -> StepBuilder {
    StepBuilder::new(name, "/bin/sh").arg("-c").arg(script)
}
