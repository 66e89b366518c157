//! Shared types and error definitions used by the store, the protocol and the
//! server.
//!
//! ## Submodules
//!
//! - [`error`] - The error taxonomy. Each variant's `Display` text is the
//!   reason sent to clients after `fail: `.
//! - [`types`] - Account/amount aliases and the fixed-width record codec.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{AccountNumber, Amount, Party, Record};
