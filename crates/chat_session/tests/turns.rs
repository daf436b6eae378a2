mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chat_provider::Role;
use chat_provider_mock::{MockBackend, MockStep};
use chat_session::{TurnErrorKind, TurnOptions};

use support::{cancel_signal, session_with, Recorder};

fn roles(session: &chat_session::Session) -> Vec<Role> {
    session.history().entries().iter().map(|entry| entry.role).collect()
}

#[test]
fn slow_consumer_sees_every_fragment_and_result_is_complete() {
    let backend = Arc::new(MockBackend::simulated(10, Duration::from_millis(100)));
    let mut session = session_with(&backend);
    let recorder = Recorder::slow(Duration::from_millis(200));

    let result = session
        .send_message("count for me", recorder.callback())
        .expect("simulated turn succeeds");

    let expected: Vec<String> = (0..10).map(|i| format!("Chunk {i}")).collect();
    assert_eq!(result.text, expected.concat());
    assert_eq!(result.fragment_count, 10);
    assert_eq!(recorder.seen(), expected);
}

#[test]
fn empty_stream_returns_without_waiting_for_a_tick() {
    let backend = Arc::new(MockBackend::new(Vec::new()));
    let mut session = chat_session::Session::new(backend.clone(), "sys")
        .with_presenter_tick(Duration::from_secs(30));
    let recorder = Recorder::new();
    let started = Instant::now();

    let result = session
        .send_message("silence", recorder.callback())
        .expect("empty turn succeeds");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.text, "");
    assert_eq!(result.fragment_count, 0);
    assert!(recorder.seen().is_empty());
    assert_eq!(roles(&session), vec![Role::User, Role::Model]);
}

#[test]
fn tiny_channel_drops_renders_but_never_text() {
    let backend = Arc::new(MockBackend::simulated(30, Duration::ZERO));
    let mut session = session_with(&backend).with_delivery_capacity(1);
    let recorder = Recorder::slow(Duration::from_millis(20));

    let result = session
        .send_message("flood", recorder.callback())
        .expect("flood turn succeeds");

    let expected: Vec<String> = (0..30).map(|i| format!("Chunk {i}")).collect();
    assert_eq!(result.text, expected.concat());
    assert_eq!(result.fragment_count, 30);

    let seen = recorder.seen();
    assert!(!seen.is_empty());
    assert!(seen.len() <= 30);
    let positions: Vec<usize> = seen
        .iter()
        .map(|text| {
            expected
                .iter()
                .position(|candidate| candidate == text)
                .expect("rendered fragment came from the stream")
        })
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn success_appends_user_then_model_once() {
    let backend = Arc::new(MockBackend::new(vec![
        MockStep::text("Hello"),
        MockStep::text(", world"),
    ]));
    let mut session = session_with(&backend);

    session.send_message("greet", |_: &str| {}).expect("first turn");
    session.send_message("again", |_: &str| {}).expect("second turn");

    assert_eq!(session.history_len(), 4);
    assert_eq!(
        roles(&session),
        vec![Role::User, Role::Model, Role::User, Role::Model]
    );
    let entries = session.history().entries();
    assert_eq!(entries[0].text(), "greet");
    assert_eq!(entries[1].text(), "Hello, world");
}

#[test]
fn request_history_is_the_snapshot_before_the_new_message() {
    let backend = Arc::new(MockBackend::new(vec![MockStep::text("ok")]));
    let mut session = session_with(&backend);

    session.send_message("one", |_: &str| {}).expect("first turn");
    session.send_message("two", |_: &str| {}).expect("second turn");

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].message.text(), "two");
    assert_eq!(
        requests[1].system_instruction.as_deref(),
        Some(chat_session::DEFAULT_SYSTEM_INSTRUCTION)
    );
}

#[test]
fn source_error_returns_partial_and_keeps_only_the_prompt() {
    let backend = Arc::new(MockBackend::new(vec![
        MockStep::text("par"),
        MockStep::text("tial"),
        MockStep::Fail("connection reset".to_string()),
        MockStep::text("never"),
    ]));
    let mut session = session_with(&backend);
    let recorder = Recorder::new();

    let error = session
        .send_message("fragile", recorder.callback())
        .expect_err("stream fails mid-way");

    assert!(matches!(error.kind, TurnErrorKind::Source(_)));
    assert_eq!(error.to_string(), "reply stream failed: connection reset");
    assert_eq!(error.partial.text, "partial");
    assert_eq!(error.partial.fragment_count, 2);
    assert_eq!(recorder.seen(), vec!["par", "tial"]);
    assert_eq!(roles(&session), vec![Role::User]);
}

#[test]
fn malformed_chunk_stops_the_turn() {
    let backend = Arc::new(MockBackend::new(vec![
        MockStep::text("a"),
        MockStep::Malformed,
        MockStep::text("b"),
    ]));
    let mut session = session_with(&backend);

    let error = session
        .send_message("odd", |_: &str| {})
        .expect_err("malformed chunk fails the turn");

    assert!(matches!(error.kind, TurnErrorKind::MalformedFragment));
    assert_eq!(error.to_string(), "received malformed chunk data");
    assert_eq!(error.partial.text, "a");
    assert_eq!(error.partial.fragment_count, 1);
}

#[test]
fn setup_failure_reports_setup_and_renders_nothing() {
    let backend = Arc::new(MockBackend::new(vec![MockStep::text("x")]).with_open_error("no chat"));
    let mut session = session_with(&backend);
    let recorder = Recorder::new();

    let error = session
        .send_message("hello", recorder.callback())
        .expect_err("open fails");

    assert!(matches!(error.kind, TurnErrorKind::Setup(_)));
    assert_eq!(error.to_string(), "failed to open reply stream: no chat");
    assert_eq!(error.partial.fragment_count, 0);
    assert!(recorder.seen().is_empty());
    assert_eq!(roles(&session), vec![Role::User]);

    // The session stays usable once teardown has run.
    let error = session
        .send_message("again", |_: &str| {})
        .expect_err("open still fails");
    assert!(matches!(error.kind, TurnErrorKind::Setup(_)));
    assert_eq!(session.history_len(), 2);
}

#[test]
fn cancel_signal_stops_a_hanging_stream() {
    let backend = Arc::new(MockBackend::new(vec![MockStep::text("start"), MockStep::Hang]));
    let mut session = session_with(&backend);
    let cancel = cancel_signal();

    let canceller = {
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.store(true, Ordering::Release);
        })
    };

    let error = session
        .send_message_with(
            "wait",
            TurnOptions::default().with_cancel(cancel),
            |_: &str| {},
        )
        .expect_err("turn is cancelled");
    canceller.join().expect("canceller joins");

    assert!(matches!(error.kind, TurnErrorKind::Cancelled));
    assert!(error.is_cancelled());
    assert_eq!(error.partial.text, "start");
    assert_eq!(roles(&session), vec![Role::User]);
}

#[test]
fn timeout_cancels_and_reports_timed_out() {
    let backend = Arc::new(MockBackend::new(vec![MockStep::text("slow"), MockStep::Hang]));
    let mut session = session_with(&backend);
    let started = Instant::now();

    let error = session
        .send_message_with(
            "wait",
            TurnOptions::default().with_timeout(Duration::from_millis(80)),
            |_: &str| {},
        )
        .expect_err("turn times out");

    assert!(matches!(error.kind, TurnErrorKind::TimedOut { .. }));
    assert!(error.is_cancelled());
    assert_eq!(error.partial.text, "slow");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn generous_timeout_does_not_affect_a_fast_turn() {
    let backend = Arc::new(MockBackend::new(vec![MockStep::text("quick")]));
    let mut session = session_with(&backend);

    let result = session
        .send_message_with(
            "hi",
            TurnOptions::default().with_timeout(Duration::from_secs(30)),
            |_: &str| {},
        )
        .expect("fast turn succeeds");

    assert_eq!(result.text, "quick");
}

#[test]
fn system_prompt_turn_sends_the_instruction() {
    let backend = Arc::new(MockBackend::new(vec![MockStep::text("Understood.")]));
    let mut session = session_with(&backend);
    session.update_system_instruction("Review diffs critically.");

    let result = session
        .send_system_prompt(|_: &str| {})
        .expect("system prompt turn");

    assert_eq!(result.text, "Understood.");
    let requests = backend.requests();
    assert_eq!(requests[0].message.text(), "Review diffs critically.");
    assert_eq!(
        requests[0].system_instruction.as_deref(),
        Some("Review diffs critically.")
    );
    assert_eq!(session.history().entries()[0].text(), "Review diffs critically.");
    assert_eq!(roles(&session), vec![Role::User, Role::Model]);
}

#[test]
fn blank_system_instruction_is_not_sent() {
    let backend = Arc::new(MockBackend::new(vec![MockStep::text("ok")]));
    let mut session = session_with(&backend);
    session.update_system_instruction("   ");

    session.send_message("hi", |_: &str| {}).expect("turn");

    assert_eq!(backend.requests()[0].system_instruction, None);
}
