//! Error types for the ledger service.
//!
//! This module defines the central `Error` enum. Every business-rule and
//! storage failure is recoverable: the session that hit it answers the client
//! with `fail: <reason>` and keeps going. The `Display` implementation of each
//! variant is exactly that `<reason>`.
//!
//! ## Error Cases
//! - `MalformedRequest`: Unknown operation, wrong field count or non-integer
//!   fields. The store is never touched.
//! - `InvalidAmount`: A negative amount.
//! - `AccountNotFound`: The named account has no record.
//! - `InsufficientFunds`: The debit would drive a balance negative.
//! - `SameAccount`: A transfer whose source and destination are equal.
//! - `StoreUnavailable`: The ledger file could not be opened, read or written.
//! - `CorruptRecord`: A record is not of the fixed width required for an
//!   in-place rewrite.
//! - `BalanceOverflow`: The resulting balance does not fit the balance type.
//! - `ConnectionIo`: A read or write on a client connection failed.
//! - `ServiceShutdown`: A connection arrived after shutdown started.

use crate::common::types::Party;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the ledger service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request line could not be parsed.
    #[error("incorrect command")]
    MalformedRequest,

    /// A deposit, withdrawal or transfer carried a negative amount.
    #[error("amount cannot be negative")]
    InvalidAmount,

    /// No record exists for the given side of the operation.
    #[error("{0} not found")]
    AccountNotFound(Party),

    /// The debited account holds less than the requested amount.
    #[error("insufficient balance")]
    InsufficientFunds,

    /// Transfers must move funds between two different accounts.
    #[error("transfer only between different accounts")]
    SameAccount,

    /// The ledger file could not be opened or accessed.
    #[error("error with database file")]
    StoreUnavailable(#[from] std::io::Error),

    /// The record at `offset` does not have the fixed record width.
    #[error("error with database file")]
    CorruptRecord { offset: u64 },

    /// The new balance would overflow.
    #[error("balance overflow")]
    BalanceOverflow,

    /// Client connection failure; ends that session only.
    #[error("connection error: {context}")]
    ConnectionIo { context: String },

    /// The service is in the process of shutting down.
    #[error("service is shutting down")]
    ServiceShutdown,
}
