//! An abstraction layer for hosted chat models.
//!
//! This crate establishes an unified protocol for the chat session to talk
//! to various supported model backends, so that the session can switch
//! between them without modifying the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
