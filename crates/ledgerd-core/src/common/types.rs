//! # Ledger record types
//!
//! The ledger file is plain text, one record per line. Each record holds an
//! account number and a balance, both right-justified in a
//! [`FIELD_WIDTH`]-character column, separated by a comma and terminated by a
//! newline:
//!
//! ```text
//!                              7,                           250
//! ```
//!
//! Every record encodes to exactly [`RECORD_LEN`] bytes. The store relies on
//! that: an update seeks to the record's original offset and overwrites it in
//! place, so a record of any other length would clobber its neighbours.

use core::fmt;

/// Account identifier. The key of the ledger; at most one record per value.
pub type AccountNumber = i64;

/// Balances and transaction amounts.
pub type Amount = i64;

/// Width of each right-justified column in a ledger record.
pub const FIELD_WIDTH: usize = 30;

/// Encoded length of one record: two columns, the separator and the newline.
pub const RECORD_LEN: usize = FIELD_WIDTH * 2 + 2;

/// One account's balance as stored in the ledger file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub account: AccountNumber,
    pub balance: Amount,
}

impl Record {
    pub const fn new(account: AccountNumber, balance: Amount) -> Self {
        Self { account, balance }
    }

    /// Encodes the record as a fixed-width line of [`RECORD_LEN`] bytes.
    pub fn encode(&self) -> String {
        format!(
            "{:>width$},{:>width$}\n",
            self.account,
            self.balance,
            width = FIELD_WIDTH
        )
    }

    /// Parses a ledger line. Padding around either field is ignored; lines
    /// that are not two comma-separated integers yield `None` and are skipped
    /// by scans.
    pub fn decode(line: &str) -> Option<Self> {
        let (account, balance) = line.trim_end_matches(['\n', '\r']).split_once(',')?;
        Some(Self {
            account: account.trim().parse().ok()?,
            balance: balance.trim().parse().ok()?,
        })
    }
}

/// Which account an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// The single account of a withdrawal.
    Account,
    /// The debited side of a transfer.
    From,
    /// The credited side of a transfer.
    To,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Account => "account",
            Self::From => "from account",
            Self::To => "to account",
        })
    }
}
