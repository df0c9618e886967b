use async_trait::async_trait;
use little_chat_core::Message;

#[cfg(feature = "cli")]
mod terminal;

#[cfg(feature = "cli")]
pub use terminal::TerminalRenderer;

/// The presentation side of a chat: draws messages and reads user input.
#[async_trait]
pub trait Renderer: Send {
    /// Draws one complete message.
    ///
    /// For an assistant reply that was streamed through
    /// [`render_delta`](Renderer::render_delta), this closes the streamed
    /// bubble instead.
    fn render_message(&mut self, message: &Message);

    /// Draws the next fragment of the reply being streamed.
    fn render_delta(&mut self, delta: &str);

    /// Draws a line that is not part of the conversation, e.g. command
    /// feedback.
    fn render_notice(&mut self, notice: &str);

    /// Called when a turn was sent and no reply has arrived yet.
    fn render_waiting(&mut self) {}

    /// Reads the next input line, `None` at the end of input.
    async fn read_input(&mut self) -> Option<String>;
}
