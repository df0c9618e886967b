//! Session state machine of little-chat: the active transcript, the archive
//! of past chat logs, persistence, export and accounts.

#[macro_use]
extern crate tracing;

pub mod account;
pub mod config;
mod controller;
pub mod conversation;
pub mod error;
pub mod export;
mod model_client;
mod model_session;
pub mod store;

pub use account::{Account, AccountStore, PasswordHash, PersistentAccountStore};
pub use config::{ChatConfig, PersistenceKind, Theme};
pub use controller::{
    ControllerBuilder, ERROR_PREFIX, SessionController, SessionStage,
};
pub use conversation::{
    ArchiveEntry, ArchiveId, ChatLogArchive, Message, MessageKind, Role,
    Transcript,
};
pub use error::{
    AccountError, ConfigError, ExportError, SessionError, StoreError,
};
pub use model_session::TurnFailure;
