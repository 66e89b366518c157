//! Line protocol spoken between clients and the server.
//!
//! Every exchange is one newline-terminated ASCII request answered by exactly
//! one response line. The first character of a request selects the
//! operation; the remaining whitespace-separated fields must all be integers:
//!
//! | Request | Success response |
//! |---------|------------------|
//! | `l <account>` | `ok: balance: <balance>` |
//! | `d <account> <amount>` | `ok: deposited: <amount>` |
//! | `w <account> <amount>` | `ok: withdrew <amount>` |
//! | `t <from> <to> <amount>` | `ok: transferred <amount> from <from> to <to>` |
//!
//! Failures are rendered as `fail: <reason>` using the [`Error`] display text.
//! Line terminators are handled by the transport framing, so the types here
//! deal in bare lines.

use crate::common::{AccountNumber, Amount, Error, Result};
use core::{fmt, str::FromStr};

/// First line sent to every new connection.
pub const GREETING: &str = "ready";

/// A parsed client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Lookup {
        account: AccountNumber,
    },
    Deposit {
        account: AccountNumber,
        amount: Amount,
    },
    Withdraw {
        account: AccountNumber,
        amount: Amount,
    },
    Transfer {
        from: AccountNumber,
        to: AccountNumber,
        amount: Amount,
    },
}

impl FromStr for Request {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut chars = line.chars();
        let op = chars.next().ok_or(Error::MalformedRequest)?;
        let args = chars.as_str();

        match op {
            'l' => {
                let [account] = parse_fields(args)?;
                Ok(Self::Lookup { account })
            }
            'd' => {
                let [account, amount] = parse_fields(args)?;
                Ok(Self::Deposit { account, amount })
            }
            'w' => {
                let [account, amount] = parse_fields(args)?;
                Ok(Self::Withdraw { account, amount })
            }
            't' => {
                let [from, to, amount] = parse_fields(args)?;
                Ok(Self::Transfer { from, to, amount })
            }
            _ => Err(Error::MalformedRequest),
        }
    }
}

/// Parses exactly `N` integer fields; more or fewer is malformed.
fn parse_fields<const N: usize>(args: &str) -> Result<[i64; N]> {
    let mut fields = args.split_whitespace();
    let mut out = [0; N];
    for slot in &mut out {
        *slot = fields
            .next()
            .and_then(|field| field.parse().ok())
            .ok_or(Error::MalformedRequest)?;
    }
    if fields.next().is_some() {
        return Err(Error::MalformedRequest);
    }
    Ok(out)
}

/// The successful result of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Balance(Amount),
    /// Always the deposited amount, never the resulting balance.
    Deposited(Amount),
    Withdrew(Amount),
    Transferred {
        amount: Amount,
        from: AccountNumber,
        to: AccountNumber,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balance(balance) => write!(f, "balance: {balance}"),
            Self::Deposited(amount) => write!(f, "deposited: {amount}"),
            Self::Withdrew(amount) => write!(f, "withdrew {amount}"),
            Self::Transferred { amount, from, to } => {
                write!(f, "transferred {amount} from {from} to {to}")
            }
        }
    }
}

/// One response line, without its terminator.
#[derive(Debug)]
pub struct Reply(pub Result<Outcome>);

impl From<Error> for Reply {
    fn from(err: Error) -> Self {
        Self(Err(err))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Ok(outcome) => write!(f, "ok: {outcome}"),
            Err(err) => write!(f, "fail: {err}"),
        }
    }
}
