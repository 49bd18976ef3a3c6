mod common;
use crate::common::{init_tracing, with_timeout};

use std::time::{Duration, Instant};

use fmrunner::config::{jobs_file_path, load_and_validate, read_jobs_file};
use fmrunner::errors::ConfigError;
use fmrunner_test_utils::{JobsDescriptorBuilder, StepBuilder};

#[tokio::test]
async fn file_appearing_during_the_retry_wait_is_loaded() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let builder = JobsDescriptorBuilder::new(7).step(StepBuilder::new("sim", "/bin/true").build());

    let run_path = dir.path().to_path_buf();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        builder.write_to(&run_path);
    });

    let descriptor = with_timeout(load_and_validate(jobs_file_path(dir.path()), Duration::from_millis(300)))
        .await
        .unwrap();
    writer.await.unwrap();

    assert_eq!(descriptor.realization(), 7);
    assert_eq!(descriptor.steps()[0].name, "sim");
}

#[tokio::test]
async fn missing_file_is_retried_exactly_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let wait = Duration::from_millis(100);

    let started = Instant::now();
    let result = with_timeout(read_jobs_file(jobs_file_path(dir.path()), wait)).await;

    assert!(matches!(result, Err(ConfigError::JobsFileMissing(_))));
    let elapsed = started.elapsed();
    assert!(elapsed >= wait, "gave up after {elapsed:?}");
    assert!(elapsed < wait * 5, "waited too long: {elapsed:?}");
}

#[tokio::test]
async fn malformed_file_fails_without_retrying() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(jobs_file_path(dir.path()), "{ not json").unwrap();

    let started = Instant::now();
    let result = read_jobs_file(jobs_file_path(dir.path()), Duration::from_secs(30)).await;

    assert!(matches!(result, Err(ConfigError::Malformed(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn written_descriptor_round_trips_through_the_loader() {
    let dir = tempfile::tempdir().unwrap();
    JobsDescriptorBuilder::new(2)
        .ens_id("ens-1")
        .dispatch_url("tcp://127.0.0.1:5555")
        .token("secret")
        .step(StepBuilder::new("prep", "/bin/echo").arg("x").optional().build())
        .write_to(dir.path());

    let d = load_and_validate(jobs_file_path(dir.path()), Duration::ZERO).await.unwrap();
    assert_eq!(d.ens_id(), Some("ens-1"));
    assert_eq!(d.token(), Some("secret"));
    assert_eq!(d.steps()[0].args, vec!["x"]);
    assert!(!d.steps()[0].required);
}
