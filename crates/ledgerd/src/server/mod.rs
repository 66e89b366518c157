//! Server-side components of the `ledgerd` account service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration and its validation.
//! - [`pool`] - Pending-connection queues, worker tasks and the pool that
//!   owns them.
//! - [`service`] - The acceptor, the per-connection session handler and the
//!   [`service::LedgerService`] that wires them to the pool.
//! - [`telemetry`] - Console logging and the timestamped audit log.
//!
//! These components are wired together in the server's `main.rs`.

pub mod config;
pub mod pool;
pub mod service;
pub mod telemetry;
