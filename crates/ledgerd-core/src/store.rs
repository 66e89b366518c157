//! Flat-file account ledger guarded by a single global lock.
//!
//! [`LedgerStore`] keeps every account in one plain-text file of fixed-width
//! [`Record`]s (see [`crate::types`]). Lookups are linear scans; updates
//! overwrite a record at its original offset; new accounts are appended.
//!
//! ## Locking
//!
//! Every operation, of every kind, from every worker, runs inside one
//! exclusive critical section over the whole file. The lock is acquired by
//! [`LedgerStore::open_file`], which hands back a [`LedgerFile`] owning both the
//! mutex guard and the open file handle. Dropping it closes the file and then
//! releases the lock, so all exit paths, early error returns included,
//! release it. A transfer's debit and credit are written under the same guard
//! and are never observable separately.
//!
//! There is exactly one lock, so there is no lock ordering to get wrong.

use crate::{
    common::{
        AccountNumber, Amount, Error, Party, Record, Result,
        types::RECORD_LEN,
    },
    protocol::{Outcome, Reply, Request},
};
use parking_lot::{Mutex, MutexGuard};
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Seek, SeekFrom, Write},
    path::PathBuf,
};

/// The shared account ledger.
///
/// Cheap to share behind an `Arc`; all methods take `&self` and serialize on
/// the internal lock.
#[derive(Debug)]
pub struct LedgerStore {
    path: Mutex<PathBuf>,
}

/// Where a record was found during a scan.
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    len: usize,
    balance: Amount,
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    ReadWrite,
}

/// An open ledger file together with the global lock that protects it.
///
/// Field order matters: the file is closed before the guard is released.
struct LedgerFile<'a> {
    file: File,
    _guard: MutexGuard<'a, PathBuf>,
}

impl LedgerStore {
    /// Opens the ledger at `path`, creating an empty file if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the file can neither be opened
    /// nor created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: Mutex::new(path),
        })
    }

    /// Path of the backing ledger file.
    pub fn path(&self) -> PathBuf {
        self.path.lock().clone()
    }

    /// Returns the balance of `account`, or `0` when it has no record.
    ///
    /// A missing account and an account holding zero are indistinguishable.
    pub fn lookup_balance(&self, account: AccountNumber) -> Result<Amount> {
        let mut ledger = self.open_file(Access::Read)?;
        let [slot] = ledger.locate([account])?;
        Ok(slot.map_or(0, |slot| slot.balance))
    }

    /// Credits `amount` to `account`, creating the account on first deposit.
    ///
    /// Returns the deposited amount, not the resulting balance.
    pub fn deposit(&self, account: AccountNumber, amount: Amount) -> Result<Amount> {
        ensure_non_negative(amount)?;
        let mut ledger = self.open_file(Access::ReadWrite)?;

        match ledger.locate([account])? {
            [Some(slot)] => {
                let balance = slot
                    .balance
                    .checked_add(amount)
                    .ok_or(Error::BalanceOverflow)?;
                ledger.overwrite(slot, Record::new(account, balance))?;
            }
            [None] => ledger.append(Record::new(account, amount))?,
        }

        Ok(amount)
    }

    /// Debits `amount` from an existing `account`.
    pub fn withdraw(&self, account: AccountNumber, amount: Amount) -> Result<Amount> {
        ensure_non_negative(amount)?;
        let mut ledger = self.open_file(Access::ReadWrite)?;

        let [slot] = ledger.locate([account])?;
        let slot = slot.ok_or(Error::AccountNotFound(Party::Account))?;
        if slot.balance < amount {
            return Err(Error::InsufficientFunds);
        }

        ledger.overwrite(slot, Record::new(account, slot.balance - amount))?;
        Ok(amount)
    }

    /// Moves `amount` from `from` to `to`. Either both records change or
    /// neither does.
    pub fn transfer(&self, from: AccountNumber, to: AccountNumber, amount: Amount) -> Result<()> {
        if from == to {
            return Err(Error::SameAccount);
        }
        ensure_non_negative(amount)?;
        let mut ledger = self.open_file(Access::ReadWrite)?;

        let [from_slot, to_slot] = ledger.locate([from, to])?;
        let from_slot = from_slot.ok_or(Error::AccountNotFound(Party::From))?;
        let to_slot = to_slot.ok_or(Error::AccountNotFound(Party::To))?;

        if from_slot.balance < amount {
            return Err(Error::InsufficientFunds);
        }
        let credited = to_slot
            .balance
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow)?;

        // Validate both before the first write so a bad record cannot leave
        // the debit applied without the credit.
        check_width(from_slot)?;
        check_width(to_slot)?;

        ledger.overwrite(from_slot, Record::new(from, from_slot.balance - amount))?;
        ledger.overwrite(to_slot, Record::new(to, credited))?;
        Ok(())
    }

    /// Runs one parsed request against the ledger.
    pub fn execute(&self, request: Request) -> Reply {
        let outcome = match request {
            Request::Lookup { account } => self.lookup_balance(account).map(Outcome::Balance),
            Request::Deposit { account, amount } => {
                self.deposit(account, amount).map(Outcome::Deposited)
            }
            Request::Withdraw { account, amount } => {
                self.withdraw(account, amount).map(Outcome::Withdrew)
            }
            Request::Transfer { from, to, amount } => self
                .transfer(from, to, amount)
                .map(|()| Outcome::Transferred { amount, from, to }),
        };
        Reply(outcome)
    }

    /// Acquires the global lock and opens the ledger file under it.
    fn open_file(&self, access: Access) -> Result<LedgerFile<'_>> {
        let guard = self.path.lock();
        let file = open_options(access).open(guard.as_path())?;
        Ok(LedgerFile {
            file,
            _guard: guard,
        })
    }
}

impl LedgerFile<'_> {
    /// Scans the file once from the start and returns the first record of
    /// each requested account.
    fn locate<const N: usize>(&mut self, accounts: [AccountNumber; N]) -> Result<[Option<Slot>; N]> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut slots = [None; N];
        let mut line = String::new();
        let mut offset = 0_u64;

        loop {
            line.clear();
            let len = reader.read_line(&mut line)?;
            if len == 0 {
                break;
            }

            if let Some(record) = Record::decode(&line) {
                for (slot, account) in slots.iter_mut().zip(accounts) {
                    if slot.is_none() && record.account == account {
                        *slot = Some(Slot {
                            offset,
                            len,
                            balance: record.balance,
                        });
                    }
                }
                if slots.iter().all(Option::is_some) {
                    break;
                }
            }

            offset += len as u64;
        }

        Ok(slots)
    }

    /// Rewrites the record at `slot` in place.
    fn overwrite(&mut self, slot: Slot, record: Record) -> Result<()> {
        check_width(slot)?;
        self.file.seek(SeekFrom::Start(slot.offset))?;
        self.file.write_all(record.encode().as_bytes())?;
        Ok(())
    }

    fn append(&mut self, record: Record) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(record.encode().as_bytes())?;
        Ok(())
    }
}

fn open_options(access: Access) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.read(true);
    if let Access::ReadWrite = access {
        options.write(true);
    }
    options
}

fn ensure_non_negative(amount: Amount) -> Result<()> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }
    Ok(())
}

/// Only records of the fixed width may be rewritten in place.
fn check_width(slot: Slot) -> Result<()> {
    if slot.len != RECORD_LEN {
        return Err(Error::CorruptRecord {
            offset: slot.offset,
        });
    }
    Ok(())
}
