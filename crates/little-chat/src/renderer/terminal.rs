use std::io::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use little_chat_core::{Message, Role, Theme};
use owo_colors::{AnsiColors, OwoColorize};
use tokio::io::{self, AsyncBufReadExt, BufReader, Stdin};

use super::Renderer;
use crate::images::image_links;

const BAR_CHAR: &str = "▎";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Palette {
    user: AnsiColors,
    assistant: AnsiColors,
    text: AnsiColors,
    error: AnsiColors,
    notice: AnsiColors,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Light => Self {
                user: AnsiColors::Blue,
                assistant: AnsiColors::Magenta,
                text: AnsiColors::Black,
                error: AnsiColors::Red,
                notice: AnsiColors::BrightBlack,
            },
            Theme::Dark => Self {
                user: AnsiColors::BrightCyan,
                assistant: AnsiColors::BrightMagenta,
                text: AnsiColors::BrightWhite,
                error: AnsiColors::BrightRed,
                notice: AnsiColors::BrightBlack,
            },
        }
    }
}

/// Draws the chat on a color terminal and reads input from stdin.
pub struct TerminalRenderer {
    ai_name: String,
    palette: Palette,
    stdin: BufReader<Stdin>,
    spinner: Option<ProgressBar>,
    streaming: bool,
}

impl TerminalRenderer {
    /// Creates a renderer that calls the assistant `ai_name`.
    pub fn new<S: Into<String>>(ai_name: S, theme: Theme) -> Self {
        Self {
            ai_name: ai_name.into(),
            palette: Palette::for_theme(theme),
            stdin: BufReader::new(io::stdin()),
            spinner: None,
            streaming: false,
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn assistant_prefix(&self) -> String {
        let bar = BAR_CHAR.color(self.palette.assistant);
        let name =
            self.ai_name.color(self.palette.assistant).bold().to_string();
        format!("{bar}🤖 {name}: ")
    }

    fn format_message(&self, message: &Message) -> String {
        match message.role() {
            Role::User => {
                let bar = BAR_CHAR.color(self.palette.user);
                format!("{bar}🧑 {}", message.text().color(self.palette.text))
            }
            Role::Assistant if message.is_error() => format!(
                "{}{}",
                self.assistant_prefix(),
                message.text().color(self.palette.error)
            ),
            Role::Assistant => format!(
                "{}{}",
                self.assistant_prefix(),
                message.text().color(self.palette.text)
            ),
        }
    }

    fn print_image_links(&self, message: &Message) {
        if message.role() != Role::Assistant || message.is_error() {
            return;
        }
        for link in image_links(message.text()) {
            println!(
                "{}🖼  Related image: {}",
                BAR_CHAR.color(self.palette.assistant),
                link.underline()
            );
        }
    }
}

#[async_trait]
impl Renderer for TerminalRenderer {
    fn render_message(&mut self, message: &Message) {
        self.stop_spinner();
        if self.streaming {
            // The reply text is on screen already.
            self.streaming = false;
            println!();
            if message.is_error() {
                println!("{}", self.format_message(message));
            }
        } else {
            println!("{}", self.format_message(message));
        }
        self.print_image_links(message);
    }

    fn render_delta(&mut self, delta: &str) {
        self.stop_spinner();
        if !self.streaming {
            self.streaming = true;
            print!("{}", self.assistant_prefix());
        }
        print!("{}", delta.color(self.palette.text));
        std::io::stdout().flush().ok();
    }

    fn render_notice(&mut self, notice: &str) {
        self.stop_spinner();
        for line in notice.lines() {
            println!("{}", line.color(self.palette.notice));
        }
    }

    fn render_waiting(&mut self) {
        let style = ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.set_message(format!("🤔 {} is replying...", self.ai_name));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    async fn read_input(&mut self) -> Option<String> {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        match self.stdin.read_line(&mut line).await {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(err) => {
                error!("error reading input: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palettes_differ() {
        assert_ne!(
            Palette::for_theme(Theme::Light),
            Palette::for_theme(Theme::Dark)
        );
    }

    #[test]
    fn test_assistant_bubble_names_the_assistant() {
        let renderer = TerminalRenderer::new("PhoGPT", Theme::Dark);
        let line = renderer.format_message(&Message::assistant("Xin chào!"));
        assert!(line.contains("PhoGPT"));
        assert!(line.contains("Xin chào!"));

        let line = renderer.format_message(&Message::user("Hi"));
        assert!(!line.contains("PhoGPT"));
        assert!(line.contains("Hi"));
    }
}
