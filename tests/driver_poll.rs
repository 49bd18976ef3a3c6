mod common;
use crate::common::{init_tracing, with_timeout};

use std::collections::BTreeSet;
use std::time::Duration;

use fmrunner::driver::{Driver, Event, PollHooks, poll};
use fmrunner::errors::DriverError;
use fmrunner::message::Message;
use fmrunner::reporting::EventSink;
use fmrunner::transport::{AckClient, DealerSocket, FrameBody, WireFrame};
use fmrunner::types::StepRef;

fn expected(iens: &[usize]) -> BTreeSet<usize> {
    iens.iter().copied().collect()
}

#[tokio::test]
async fn hooks_fire_in_delivery_order_and_the_loop_is_stopped_afterwards() {
    init_tracing();
    let mut driver = Driver::bind("127.0.0.1:0", None).await.unwrap();
    let events = driver.event_sender().unwrap();
    for event in [
        Event::Started { iens: 0 },
        Event::Started { iens: 1 },
        Event::Finished { iens: 0, returncode: 0 },
        Event::Started { iens: 2 },
        Event::Finished { iens: 1, returncode: 1 },
        Event::Finished { iens: 2, returncode: 0 },
    ] {
        events.send(event).unwrap();
    }

    let mut seen = Vec::new();
    {
        let seen = std::sync::Mutex::new(&mut seen);
        let hooks = PollHooks::new()
            .on_started(|iens| seen.lock().unwrap().push(format!("started {iens}")))
            .on_finished(|iens, rc| seen.lock().unwrap().push(format!("finished {iens} {rc}")));
        with_timeout(poll(&mut driver, &expected(&[0, 1, 2]), hooks)).await.unwrap();
    }

    assert_eq!(
        seen,
        vec![
            "started 0",
            "started 1",
            "finished 0 0",
            "started 2",
            "finished 1 1",
            "finished 2 0",
        ]
    );
    assert!(!driver.is_polling());
    // Finishing again is harmless.
    driver.finish().await.unwrap();
}

#[tokio::test]
async fn nothing_expected_returns_immediately() {
    init_tracing();
    let mut driver = Driver::bind("127.0.0.1:0", None).await.unwrap();

    with_timeout(poll(&mut driver, &BTreeSet::new(), PollHooks::new())).await.unwrap();

    assert!(!driver.is_polling());
}

#[tokio::test]
async fn duplicate_finish_frames_do_not_repeat_the_callback() {
    init_tracing();
    let mut driver = Driver::bind("127.0.0.1:0", None).await.unwrap();
    let addr = driver.local_addr().to_string();

    let sender = tokio::spawn(async move {
        let mut client = AckClient::new(addr.clone(), "realization-0", None)
            .with_ack_timeout(Duration::from_secs(2));
        client.connect().await?;
        client.send_message(&Message::start(0, StepRef::new(0, "sim"))).await?;
        // Same Finish twice, as after a retransmission.
        client.send_message(&Message::finish(0, true)).await?;
        client.send_message(&Message::finish(0, true)).await?;
        client.disconnect().await?;

        let mut sink = EventSink::new(&addr, 1, None);
        sink.report(&Message::start(1, StepRef::new(0, "sim"))).await?;
        sink.report(&Message::finish(1, false)).await?;
        // The consumer may already have shut the collector down.
        let _ = sink.stop().await;
        anyhow::Ok(())
    });

    let mut finished = Vec::new();
    let hooks = PollHooks::new().on_finished(|iens, rc| finished.push((iens, rc)));
    with_timeout(poll(&mut driver, &expected(&[0, 1]), hooks)).await.unwrap();
    sender.await.unwrap().unwrap();

    assert_eq!(finished, vec![(0, 0), (1, 1)]);
    assert!(!driver.is_polling());
}

#[tokio::test]
async fn poll_finishes_the_driver_even_when_it_fails() {
    init_tracing();
    let mut driver = Driver::bind("127.0.0.1:0", None).await.unwrap();
    driver.poll().unwrap();
    assert!(driver.is_polling());

    let result = with_timeout(poll(&mut driver, &expected(&[0]), PollHooks::new())).await;

    assert!(matches!(result, Err(DriverError::AlreadyPolling)));
    assert!(!driver.is_polling());
}

#[tokio::test]
async fn cancelled_loop_still_processes_frames_it_already_received() {
    init_tracing();
    let mut driver = Driver::bind("127.0.0.1:0", None).await.unwrap();
    driver.poll().unwrap();

    let mut sink = EventSink::new(&driver.local_addr().to_string(), 4, None);
    sink.report(&Message::start(4, StepRef::new(0, "sim"))).await.unwrap();
    sink.report(&Message::finish(4, true)).await.unwrap();

    // Acks prove the frames were handled; the events must be queued.
    driver.finish().await.unwrap();
    assert_eq!(driver.try_next_event(), Some(Event::Started { iens: 4 }));
    assert_eq!(driver.try_next_event(), Some(Event::Finished { iens: 4, returncode: 0 }));
    assert_eq!(driver.next_event().await, None);
}

#[tokio::test]
async fn resubmitted_realization_is_reported_again() {
    init_tracing();
    let mut driver = Driver::bind("127.0.0.1:0", None).await.unwrap();
    driver.poll().unwrap();
    let addr = driver.local_addr().to_string();

    for (identity, success) in [("realization-0-first", false), ("realization-0-second", true)] {
        let mut client = AckClient::new(addr.clone(), identity, None);
        with_timeout(client.connect()).await.unwrap();
        client.send_message(&Message::start(0, StepRef::new(0, "sim"))).await.unwrap();
        client.send_message(&Message::finish(0, success)).await.unwrap();
        client.disconnect().await.unwrap();
    }

    let mut events = Vec::new();
    for _ in 0..4 {
        events.push(with_timeout(driver.next_event()).await.unwrap());
    }
    assert_eq!(
        events,
        vec![
            Event::Started { iens: 0 },
            Event::Finished { iens: 0, returncode: 1 },
            Event::Started { iens: 0 },
            Event::Finished { iens: 0, returncode: 0 },
        ]
    );
    driver.finish().await.unwrap();
}

#[tokio::test]
async fn data_without_an_accepted_connect_is_refused_when_a_token_is_set() {
    init_tracing();
    let mut driver = Driver::bind("127.0.0.1:0", Some("secret".into())).await.unwrap();
    driver.poll().unwrap();

    let mut socket = DealerSocket::connect(&driver.local_addr().to_string()).await.unwrap();
    let payload = serde_json::to_string(&Message::finish(7, true)).unwrap();
    socket
        .send(&WireFrame::new(1, "realization-7-sneaky", FrameBody::Data { payload }))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_millis(300), socket.recv()).await;
    assert!(reply.is_err(), "expected no ack, got {reply:?}");

    let stats = driver.finish().await.unwrap();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.events, 0);
    assert_eq!(driver.try_next_event(), None);
}
