use std::process::Stdio;

use little_chat_core::{Message, Role};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Reads assistant replies aloud through the system text-to-speech command.
///
/// The reply is written to the program's stdin and never passed as an
/// argument, so model output cannot smuggle in command line options.
#[derive(Clone, Debug)]
pub struct VoiceOutput {
    enabled: bool,
    program: String,
    args: Vec<String>,
}

impl VoiceOutput {
    /// Creates a voice output using `say -f -` on macOS and
    /// `espeak --stdin` elsewhere.
    #[inline]
    pub fn new(enabled: bool) -> Self {
        let (program, args) = default_command();
        Self::with_program(enabled, program, args.iter().copied())
    }

    /// Creates a voice output that runs `program args..` and writes the
    /// text to its stdin.
    pub fn with_program<P, I, A>(enabled: bool, program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            enabled,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if replies are spoken at all.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns `true` if `message` would be spoken.
    pub fn should_speak(&self, message: &Message) -> bool {
        self.enabled
            && message.role() == Role::Assistant
            && !message.is_error()
            && !message.text().trim().is_empty()
    }

    /// Speaks `message` and waits until it has been read. Failures are
    /// logged and otherwise ignored.
    pub async fn say(&self, message: &Message) {
        if !self.should_speak(message) {
            return;
        }
        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("failed to run {}: {err}", self.program);
                return;
            }
        };
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(message.text().as_bytes()).await
            {
                warn!("failed to feed {}: {err}", self.program);
            }
        }
        match child.wait().await {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("{} exited with {status}", self.program),
            Err(err) => warn!("failed to wait for {}: {err}", self.program),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

const SAY_ARGS: &[&str] = &["-f", "-"];
const ESPEAK_ARGS: &[&str] = &["--stdin"];

#[inline]
fn default_command() -> (&'static str, &'static [&'static str]) {
    match std::env::consts::OS {
        "macos" => ("say", SAY_ARGS),
        _ => ("espeak", ESPEAK_ARGS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_assistant_replies_are_spoken() {
        let voice = VoiceOutput::new(true);
        assert!(voice.should_speak(&Message::assistant("Xin chào!")));
        assert!(!voice.should_speak(&Message::user("Hi")));
        assert!(!voice.should_speak(&Message::assistant_error(
            "❌ Error: request cancelled"
        )));
        assert!(!voice.should_speak(&Message::assistant("  ")));
    }

    #[test]
    fn test_disabled() {
        let voice = VoiceOutput::new(false);
        assert!(!voice.is_enabled());
        assert!(!voice.should_speak(&Message::assistant("Xin chào!")));
    }

    #[tokio::test]
    async fn test_missing_program_is_not_fatal() {
        let voice = VoiceOutput::with_program(
            true,
            "little-chat-no-such-tts-program",
            Vec::<String>::new(),
        );
        voice.say(&Message::assistant("Hello")).await;
    }

    #[tokio::test]
    async fn test_reply_goes_to_stdin_not_argv() {
        let dir = tempfile::tempdir().unwrap();
        let heard = dir.path().join("heard.txt");
        let script = format!("cat > '{}'", heard.display());
        let voice =
            VoiceOutput::with_program(true, "sh", ["-c", script.as_str()]);
        let reply = Message::assistant("-w /tmp/owned.wav hello");

        let command = voice.command();
        let args: Vec<_> = command.as_std().get_args().collect();
        assert_eq!(args, ["-c", script.as_str()]);

        voice.say(&reply).await;
        assert_eq!(
            std::fs::read_to_string(&heard).unwrap(),
            "-w /tmp/owned.wav hello"
        );
    }
}
