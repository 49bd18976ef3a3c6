// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{JobsDescriptor, RawJobsDescriptor, StepDefinition};
use crate::errors::ConfigError;

impl TryFrom<RawJobsDescriptor> for JobsDescriptor {
    type Error = ConfigError;

    fn try_from(raw: RawJobsDescriptor) -> Result<Self, Self::Error> {
        validate_descriptor(&raw)?;
        Ok(JobsDescriptor::new_unchecked(raw))
    }
}

/// Run every semantic check on an unchecked descriptor.
pub fn validate_descriptor(raw: &RawJobsDescriptor) -> Result<(), ConfigError> {
    validate_steps(&raw.steps)?;
    if let Some(url) = raw.dispatch_url.as_deref() {
        crate::transport::parse_endpoint(url)?;
    }
    Ok(())
}

fn validate_steps(steps: &[StepDefinition]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "step #{index} has an empty name"
            )));
        }
        if step.executable.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "step '{}' has an empty executable",
                step.name
            )));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "step name '{}' appears more than once in jobList",
                step.name
            )));
        }
    }
    Ok(())
}

/// Resolve a step-name filter against the descriptor.
///
/// An empty filter selects every step. Otherwise the selected steps keep
/// file order, regardless of the order the names were given in. Unknown
/// names are reported together.
pub fn select_steps(
    descriptor: &JobsDescriptor,
    names: &[String],
) -> Result<Vec<usize>, ConfigError> {
    let steps = descriptor.steps();
    if names.is_empty() {
        return Ok((0..steps.len()).collect());
    }

    let unknown: Vec<String> = names
        .iter()
        .filter(|name| !steps.iter().any(|s| &s.name == *name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownSteps(unknown));
    }

    Ok(steps
        .iter()
        .enumerate()
        .filter(|(_, s)| names.contains(&s.name))
        .map(|(i, _)| i)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(names: &[&str]) -> JobsDescriptor {
        let raw = RawJobsDescriptor {
            steps: names
                .iter()
                .map(|n| StepDefinition::new(*n, "/bin/true"))
                .collect(),
            ..Default::default()
        };
        JobsDescriptor::try_from(raw).unwrap()
    }

    #[test]
    fn empty_filter_selects_all_in_file_order() {
        let d = descriptor(&["a", "b", "c"]);
        assert_eq!(select_steps(&d, &[]).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn filter_keeps_file_order() {
        let d = descriptor(&["a", "b", "c"]);
        let names = vec!["c".to_string(), "a".to_string()];
        assert_eq!(select_steps(&d, &names).unwrap(), vec![0, 2]);
    }

    #[test]
    fn unknown_names_are_reported_together() {
        let d = descriptor(&["a"]);
        let names = vec!["x".to_string(), "a".to_string(), "y".to_string()];
        match select_steps(&d, &names) {
            Err(ConfigError::UnknownSteps(unknown)) => assert_eq!(unknown, vec!["x", "y"]),
            other => panic!("expected UnknownSteps, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let raw = RawJobsDescriptor {
            steps: vec![
                StepDefinition::new("a", "/bin/true"),
                StepDefinition::new("a", "/bin/false"),
            ],
            ..Default::default()
        };
        let err = JobsDescriptor::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn bad_dispatch_url_is_rejected() {
        let raw = RawJobsDescriptor {
            dispatch_url: Some("ws://nowhere".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            JobsDescriptor::try_from(raw),
            Err(ConfigError::Endpoint(_))
        ));
    }
}
