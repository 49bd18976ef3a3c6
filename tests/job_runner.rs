#![cfg(unix)]

mod common;
use crate::common::{drain, fast_settings, init_tracing, with_timeout};

use fmrunner::errors::ConfigError;
use fmrunner::exec::{JobRunner, SPAWN_FAILURE_EXIT_CODE};
use fmrunner::message::{Message, MessageKind};
use fmrunner_test_utils::{JobsDescriptorBuilder, StepBuilder, shell_step};

fn names(messages: &[Message], kind: &str) -> Vec<String> {
    messages
        .iter()
        .filter(|m| m.kind_name() == kind)
        .filter_map(|m| m.step.as_ref().map(|s| s.name.clone()))
        .collect()
}

fn exit_code_of(messages: &[Message], step: &str) -> Option<(i32, Option<String>)> {
    messages.iter().find_map(|m| match (&m.kind, &m.step) {
        (MessageKind::Exited { exit_code, error }, Some(s)) if s.name == step => {
            Some((*exit_code, error.clone()))
        }
        _ => None,
    })
}

#[tokio::test]
async fn every_step_starts_and_exits_and_finish_comes_last() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .step(shell_step("a", "true").build())
        .step(shell_step("b", "true").build())
        .step(shell_step("c", "true").build())
        .build();

    let rx = JobRunner::new(descriptor, fast_settings(), dir.path()).start(&[]).unwrap();
    let messages = with_timeout(drain(rx)).await;

    assert_eq!(names(&messages, "start"), vec!["a", "b", "c"]);
    assert_eq!(names(&messages, "exited"), vec!["a", "b", "c"]);
    assert_eq!(messages.iter().filter(|m| m.is_finish()).count(), 1);
    assert_eq!(messages.last().unwrap().finish_success(), Some(true));

    // Start always precedes the step's Exited.
    for step in ["a", "b", "c"] {
        let start = messages.iter().position(|m| m.kind_name() == "start" && m.step.as_ref().unwrap().name == step);
        let exit = messages.iter().position(|m| m.kind_name() == "exited" && m.step.as_ref().unwrap().name == step);
        assert!(start.unwrap() < exit.unwrap());
    }
}

#[tokio::test]
async fn required_failure_stops_the_remaining_steps() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(1)
        .step(shell_step("a", "true").build())
        .step(shell_step("b", "exit 3").build())
        .step(shell_step("c", "touch c-ran").build())
        .build();

    let rx = JobRunner::new(descriptor, fast_settings(), dir.path()).start(&[]).unwrap();
    let messages = with_timeout(drain(rx)).await;

    let (code, error) = exit_code_of(&messages, "b").unwrap();
    assert_eq!(code, 3);
    assert!(error.unwrap().contains("status code 3"));
    assert!(names(&messages, "start").iter().all(|n| n != "c"));
    assert!(!dir.path().join("c-ran").exists());
    assert_eq!(messages.last().unwrap().finish_success(), Some(false));
}

#[tokio::test]
async fn optional_failure_does_not_fail_the_run() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .step(shell_step("a", "exit 2").optional().build())
        .step(shell_step("b", "true").build())
        .build();

    let rx = JobRunner::new(descriptor, fast_settings(), dir.path()).start(&[]).unwrap();
    let messages = with_timeout(drain(rx)).await;

    assert_eq!(exit_code_of(&messages, "a").unwrap().0, 2);
    assert_eq!(names(&messages, "exited"), vec!["a", "b"]);
    assert_eq!(messages.last().unwrap().finish_success(), Some(true));
}

#[tokio::test]
async fn spawn_failure_fails_even_an_optional_step() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .step(StepBuilder::new("ghost", "/definitely/not/here").optional().build())
        .step(shell_step("after", "true").build())
        .build();

    let rx = JobRunner::new(descriptor, fast_settings(), dir.path()).start(&[]).unwrap();
    let messages = with_timeout(drain(rx)).await;

    let (code, error) = exit_code_of(&messages, "ghost").unwrap();
    assert_eq!(code, SPAWN_FAILURE_EXIT_CODE);
    assert!(error.is_some());
    assert!(names(&messages, "start").iter().all(|n| n != "after"));
    assert_eq!(messages.last().unwrap().finish_success(), Some(false));
}

#[tokio::test]
async fn unknown_step_names_are_rejected_before_anything_runs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .step(shell_step("a", "touch a-ran").build())
        .build();

    let result = JobRunner::new(descriptor, fast_settings(), dir.path())
        .start(&["a".to_string(), "nope".to_string()]);

    match result {
        Err(ConfigError::UnknownSteps(unknown)) => assert_eq!(unknown, vec!["nope"]),
        other => panic!("expected UnknownSteps, got {other:?}"),
    }
    tokio::task::yield_now().await;
    assert!(!dir.path().join("a-ran").exists());
}

#[tokio::test]
async fn filtered_run_keeps_file_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .step(shell_step("a", "echo a >> order.txt").build())
        .step(shell_step("b", "echo b >> order.txt").build())
        .step(shell_step("c", "echo c >> order.txt").build())
        .build();

    let rx = JobRunner::new(descriptor, fast_settings(), dir.path())
        .start(&["c".to_string(), "a".to_string()])
        .unwrap();
    let messages = with_timeout(drain(rx)).await;

    assert_eq!(names(&messages, "start"), vec!["a", "c"]);
    let order = std::fs::read_to_string(dir.path().join("order.txt")).unwrap();
    assert_eq!(order, "a\nc\n");
}

#[tokio::test]
async fn redirects_and_environment_are_applied() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .global_env("GREETING", "hello")
        .step(
            shell_step("say", "echo $GREETING $WHO; echo oops >&2")
                .env("WHO", "world")
                .stdout("say.stdout")
                .stderr("say.stderr")
                .build(),
        )
        .build();

    let rx = JobRunner::new(descriptor, fast_settings(), dir.path()).start(&[]).unwrap();
    let messages = with_timeout(drain(rx)).await;

    assert_eq!(messages.last().unwrap().finish_success(), Some(true));
    let out = std::fs::read_to_string(dir.path().join("say.stdout")).unwrap();
    let err = std::fs::read_to_string(dir.path().join("say.stderr")).unwrap();
    assert_eq!(out.trim(), "hello world");
    assert_eq!(err.trim(), "oops");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn long_running_step_reports_resource_usage() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .step(shell_step("slow", "sleep 0.4").build())
        .build();

    let rx = JobRunner::new(descriptor, fast_settings(), dir.path()).start(&[]).unwrap();
    let messages = with_timeout(drain(rx)).await;

    let statuses: Vec<_> = messages
        .iter()
        .filter_map(|m| match &m.kind {
            MessageKind::Running { status } => Some(*status),
            _ => None,
        })
        .collect();
    assert!(!statuses.is_empty(), "expected at least one Running message");
    for pair in statuses.windows(2) {
        assert!(pair[0].max_rss_bytes <= pair[1].max_rss_bytes);
    }
    assert!(statuses.iter().all(|s| s.rss_bytes <= s.max_rss_bytes));
}

#[cfg(target_os = "linux")]
fn process_alive(pid: &str) -> bool {
    // A killed child that has not been reaped yet shows up as a zombie.
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat.rsplit(')').next().is_some_and(|rest| !rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn aborting_after_every_reporter_failed_kills_the_running_step() {
    use fmrunner::errors::ReportingError;
    use fmrunner::reporting::{HardShutdown, report_all_messages};
    use fmrunner_test_utils::{RecordingKiller, RecordingReporter};

    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let descriptor = JobsDescriptorBuilder::new(0)
        .step(shell_step("hang", "echo $$ > hang.pid; exec sleep 30").build())
        .build();

    let (messages, supervisor) = JobRunner::new(descriptor, fast_settings(), dir.path())
        .spawn(&[])
        .unwrap();

    let pid_file = dir.path().join("hang.pid");
    let pid = with_timeout(async {
        loop {
            if let Ok(pid) = std::fs::read_to_string(&pid_file) {
                if !pid.trim().is_empty() {
                    return pid.trim().to_string();
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(process_alive(&pid));

    let mut reporters = vec![RecordingReporter::new("only").failing_at(0)];
    let shutdown = HardShutdown::new(RecordingKiller::default());
    let result = report_all_messages(messages, &mut reporters, &shutdown, std::future::pending()).await;
    assert!(matches!(result, Err(ReportingError::AllReportersFailed)));

    with_timeout(supervisor.abort()).await;

    let gone = with_timeout(async {
        while process_alive(&pid) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        true
    })
    .await;
    assert!(gone);
    assert_eq!(shutdown.killer().kills(), 0);
}
