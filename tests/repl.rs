use std::sync::Arc;

use ai_chat::repl::last_reply_text;
use ai_chat::{DisplayStyle, MarkdownRenderer};
use chat_provider_mock::{MockBackend, MockStep};
use chat_session::Session;

fn session(steps: Vec<MockStep>) -> Session {
    Session::new(Arc::new(MockBackend::new(steps)), "be brief")
}

#[test]
fn last_reply_is_the_newest_model_entry() {
    let mut session = session(vec![MockStep::text("# Title\n"), MockStep::text("body")]);
    session.send_message("hi", |_| {}).expect("turn completes");

    assert_eq!(
        last_reply_text(session.history()).as_deref(),
        Some("# Title\nbody")
    );
}

#[test]
fn failed_turn_leaves_nothing_to_restyle() {
    let mut session = session(vec![MockStep::Fail("reset".to_string())]);
    assert!(session.send_message("hi", |_| {}).is_err());

    assert_eq!(last_reply_text(session.history()), None);
}

#[test]
fn last_reply_renders_in_a_new_style() {
    let mut session = session(vec![MockStep::text("**bold** reply")]);
    session.send_message("hi", |_| {}).expect("turn completes");
    let reply = last_reply_text(session.history()).expect("reply recorded");

    let plain = MarkdownRenderer::new(DisplayStyle::Notty).render(&reply);
    let styled = MarkdownRenderer::new(DisplayStyle::Dracula).render(&reply);

    assert!(plain.contains("bold reply"));
    assert!(!plain.contains('\x1b'));
    assert!(styled.contains('\x1b'));
}
