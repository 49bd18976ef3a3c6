#![cfg(unix)]

mod common;
use crate::common::{init_tracing, with_timeout};

use std::fs;
use std::path::{Path, PathBuf};

use fmrunner::cli::{LogLevel, RunArgs};
use fmrunner::errors::FmRunnerError;
use fmrunner::reporting::{FanoutOutcome, OK_FILE, STATUS_LOG};
use fmrunner::{LOG_DIR, run_realization};
use fmrunner_test_utils::{AckMode, JobsDescriptorBuilder, MockCollector, shell_step};

fn args(run_path: &Path, steps: &[&str]) -> RunArgs {
    RunArgs {
        run_path: Some(run_path.to_path_buf()),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        sample_interval_ms: Some(20),
        jobs_retry_secs: Some(0),
    }
}

fn logs_named(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    fs::read_dir(dir.join(LOG_DIR))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(prefix))
        .collect()
}

#[tokio::test]
async fn batch_run_writes_status_and_logs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    JobsDescriptorBuilder::new(0)
        .step(shell_step("prep", "true").build())
        .step(shell_step("sim", "true").build())
        .write_to(dir.path());

    let outcome = with_timeout(run_realization(args(dir.path(), &[]), Some(LogLevel::Debug)))
        .await
        .unwrap();

    assert_eq!(outcome, FanoutOutcome::Completed);
    assert!(dir.path().join(OK_FILE).exists());

    let status = fs::read_to_string(dir.path().join(STATUS_LOG)).unwrap();
    // Start + Exited per step, then Finish; Running lines are optional.
    let kinds: Vec<String> = status
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["kind"].as_str().unwrap().to_string())
        .filter(|k| k != "running")
        .collect();
    assert_eq!(kinds, vec!["start", "exited", "start", "exited", "finish"]);

    assert_eq!(logs_named(dir.path(), "job-runner-log-").len(), 1);
    let profiles = logs_named(dir.path(), "memory-profile-");
    assert_eq!(profiles.len(), 1);
    let header = fs::read_to_string(&profiles[0]).unwrap();
    assert!(header.starts_with("timestamp,step_index,step_name"));
}

#[tokio::test]
async fn ensemble_run_also_reports_to_the_collector() {
    init_tracing();
    let collector = MockCollector::start(AckMode::Normal).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    JobsDescriptorBuilder::new(3)
        .ens_id("ens-0")
        .dispatch_url(&collector.url())
        .step(shell_step("sim", "true").build())
        .write_to(dir.path());

    let outcome = with_timeout(run_realization(args(dir.path(), &[]), None)).await.unwrap();

    assert_eq!(outcome, FanoutOutcome::Completed);
    assert_eq!(collector.connects(), 1);
    assert_eq!(collector.disconnects(), 1);
    let messages = collector.messages();
    assert!(messages.iter().all(|m| m.realization == 3));
    assert_eq!(messages.last().unwrap().finish_success(), Some(true));
    collector.shutdown().await;
}

#[tokio::test]
async fn interactive_run_leaves_no_status_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    JobsDescriptorBuilder::new(0)
        .step(shell_step("a", "true").build())
        .step(shell_step("b", "touch b-ran").build())
        .write_to(dir.path());

    let outcome = with_timeout(run_realization(args(dir.path(), &["a"]), None)).await.unwrap();

    assert_eq!(outcome, FanoutOutcome::Completed);
    assert!(!dir.path().join(STATUS_LOG).exists());
    assert!(!dir.path().join("b-ran").exists());
}

#[tokio::test]
async fn missing_run_path_is_reported_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nowhere");

    let err = run_realization(args(&missing, &[]), None).await.unwrap_err();

    assert!(matches!(err, FmRunnerError::NoSuchDirectory(_)));
    assert_eq!(err.to_string(), format!("No such directory: {}", missing.display()));
}

#[tokio::test]
async fn unknown_step_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    JobsDescriptorBuilder::new(0)
        .step(shell_step("a", "touch a-ran").build())
        .write_to(dir.path());

    let err = run_realization(args(dir.path(), &["zzz"]), None).await.unwrap_err();

    assert!(matches!(err, FmRunnerError::Config(_)));
    assert!(!dir.path().join("a-ran").exists());
}
