use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use little_chat_core::{ControllerBuilder, Message};
use little_chat_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use tokio::time::sleep;

use super::*;

/// Feeds scripted input lines and records everything drawn.
#[derive(Default)]
struct ScriptedRenderer {
    inputs: VecDeque<String>,
    messages: Vec<Message>,
    deltas: Vec<String>,
    notices: Vec<String>,
}

impl ScriptedRenderer {
    fn with_inputs(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|line| format!("{line}\n")).collect(),
            ..Default::default()
        }
    }

    fn has_notice(&self, needle: &str) -> bool {
        self.notices.iter().any(|notice| notice.contains(needle))
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    fn render_message(&mut self, message: &Message) {
        self.messages.push(message.clone());
    }

    fn render_delta(&mut self, delta: &str) {
        self.deltas.push(delta.to_owned());
    }

    fn render_notice(&mut self, notice: &str) {
        self.notices.push(notice.to_owned());
    }

    async fn read_input(&mut self) -> Option<String> {
        self.inputs.pop_front()
    }
}

fn app_with(
    provider: TestModelProvider,
    inputs: &[&str],
) -> ChatApp<ScriptedRenderer> {
    let controller = ControllerBuilder::with_model_provider(provider).build();
    ChatApp::new(controller, ScriptedRenderer::with_inputs(inputs))
        .with_accounts(Box::new(
            PersistentAccountStore::new(MemoryStore::new()).with_iterations(10),
        ))
}

#[tokio::test]
async fn test_chat_and_archive() {
    let mut provider = TestModelProvider::default();
    provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::MessageDelta("4".to_owned()),
    ]));
    let mut app = app_with(
        provider,
        &["2+2?", "   ", "/new", "/history", "/quit", "never read"],
    );
    app.run().await;

    let controller = app.controller();
    assert!(controller.transcript().is_empty());
    assert_eq!(controller.archive().len(), 1);

    let renderer = app.renderer();
    assert_eq!(renderer.deltas, vec!["4"]);
    assert_eq!(renderer.messages.len(), 1);
    assert_eq!(renderer.messages[0].text(), "4");
    assert!(renderer.has_notice("Chat saved as #0"));
    assert!(renderer.has_notice("2+2?"));
    assert_eq!(
        renderer.inputs.front().map(String::as_str),
        Some("never read\n")
    );
}

#[tokio::test]
async fn test_switch_redraws_transcript() {
    let mut provider = TestModelProvider::default();
    provider.add_text_reply("4");
    let mut app =
        app_with(provider, &["2+2?", "/new", "/switch 0", "/switch 9"]);
    app.run().await;

    let renderer = app.renderer();
    // The reply, then the two reopened messages.
    assert_eq!(renderer.messages.len(), 3);
    assert_eq!(renderer.messages[1].text(), "2+2?");
    assert!(renderer.has_notice("Reopened chat #0"));
    assert!(renderer.has_notice("chat log #9 not found"));
    assert_eq!(app.controller().transcript().len(), 2);
}

#[tokio::test]
async fn test_bad_commands_are_reported() {
    let mut app = app_with(TestModelProvider::default(), &[]);
    assert!(app.handle_line("/dance\n").await.is_continue());
    assert!(app.handle_line("/switch\n").await.is_continue());
    assert!(app.handle_line("/quit\n").await.is_break());

    let renderer = app.renderer();
    assert!(renderer.has_notice("unknown command /dance"));
    assert!(renderer.has_notice("usage: /switch <id>"));
}

#[tokio::test]
async fn test_backend_failure_is_shown_inline() {
    let mut provider = TestModelProvider::default();
    provider.add_assistant_response_step(PresetResponse::always_failing(
        little_chat_model::ErrorKind::RateLimitExceeded,
    ));
    let mut app = app_with(provider, &[]);
    app.handle_line("Hi\n").await;

    let reply = &app.renderer().messages[0];
    assert!(reply.is_error());
    assert!(reply.text().starts_with("❌ Error: rate limit exceeded"));
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_cancels_turn() {
    let mut provider = TestModelProvider::default();
    provider.add_text_reply("Too late");
    provider.set_delay(Duration::from_secs(30));

    let (interrupt_tx, interrupt_rx) = mpsc::unbounded_channel();
    // Stale interrupts from before the turn are ignored.
    interrupt_tx.send(()).unwrap();
    let mut app = app_with(provider, &[]).with_interrupts(interrupt_rx);

    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        interrupt_tx.send(()).ok();
    });
    app.handle_line("Hi\n").await;

    let transcript = app.controller().transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(
        transcript.last().unwrap().text(),
        "❌ Error: request cancelled"
    );
}

#[tokio::test]
async fn test_register_and_login() {
    let mut app = app_with(TestModelProvider::default(), &[]);
    app.handle_line("/register alice s3cret\n").await;
    app.handle_line("/register alice again\n").await;
    app.handle_line("/login alice wrong\n").await;
    assert_eq!(app.controller().user(), "default");

    app.handle_line("/login alice s3cret\n").await;
    assert_eq!(app.controller().user(), "alice");

    let renderer = app.renderer();
    assert!(renderer.has_notice("Account alice created"));
    assert!(renderer.has_notice("taken"));
    assert!(renderer.has_notice("Wrong username or password."));
    assert!(renderer.has_notice("Logged in as alice."));
}

#[tokio::test]
async fn test_export_command() {
    let mut provider = TestModelProvider::default();
    provider.add_text_reply("Hello");
    let dir = tempfile::tempdir().unwrap();
    let mut app =
        app_with(provider, &[]).with_export_dir(dir.path().join("exports"));

    app.handle_line("Hi\n").await;
    app.handle_line("/export\n").await;

    let exported: Vec<_> = std::fs::read_dir(dir.path().join("exports"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(exported.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&exported[0]).unwrap(),
        "USER: Hi\nASSISTANT: Hello\n"
    );
    assert!(app.renderer().has_notice("Chat exported to"));
}

#[test]
fn test_preview() {
    assert_eq!(preview("short"), "short");
    assert_eq!(preview("first line\nsecond"), "first line");
    let long = "a".repeat(50);
    assert_eq!(preview(&long), format!("{}…", "a".repeat(40)));
}
