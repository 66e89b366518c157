#![doc = include_str!("../README.md")]

mod common;
pub mod protocol;
pub mod store;

pub use common::*;
pub use protocol::{Outcome, Reply, Request};
pub use store::LedgerStore;
