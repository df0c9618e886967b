//! A terminal chat front-end for Gemini models.
//!
//! The crate includes the `little-chat` CLI. The pieces it is made of, the
//! chat loop, the renderers and the command parser, can also be used as a
//! library to put the same chat into another host.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod app;
mod command;
mod images;
mod renderer;
mod voice;

pub use app::ChatApp;
pub use command::{Command, CommandError, HELP, parse_command};
pub use images::image_links;
#[cfg(feature = "cli")]
pub use renderer::TerminalRenderer;
pub use renderer::Renderer;
pub use voice::VoiceOutput;

/// Re-exports of [`little_chat_core`] crate.
pub mod core {
    pub use little_chat_core::*;
}
