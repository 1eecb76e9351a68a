//! In-memory ledger repository
//!
//! Each account sits behind its own mutex. A commit locks the accounts it
//! touches in id order, then the transfer table, so settlements on disjoint
//! account pairs never wait on each other and no two commits can deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, TaxId, Transfer, TransferStatus};
use crate::ports::{AccountWrite, Commit, CommitOutcome, LedgerRepository};

type AccountCell = Arc<Mutex<Account>>;

fn poisoned<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::Other(format!("Lock poisoned: {}", e))
}

/// Ledger repository held entirely in process memory
#[derive(Default)]
pub struct MemoryRepository {
    accounts: RwLock<HashMap<Uuid, AccountCell>>,
    transfers: Mutex<HashMap<Uuid, Transfer>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, id: Uuid) -> Result<AccountCell> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    /// Lock two distinct accounts in id order; returns (sender, receiver) guards
    fn lock_pair<'a>(
        sender: &'a AccountCell,
        receiver: &'a AccountCell,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<(MutexGuard<'a, Account>, MutexGuard<'a, Account>)> {
        if sender_id < receiver_id {
            let s = sender.lock().map_err(poisoned)?;
            let r = receiver.lock().map_err(poisoned)?;
            Ok((s, r))
        } else {
            let r = receiver.lock().map_err(poisoned)?;
            let s = sender.lock().map_err(poisoned)?;
            Ok((s, r))
        }
    }

    fn settle(
        &self,
        transfer: &Transfer,
        sender: &AccountWrite,
        receiver: &AccountWrite,
        expect_pending: bool,
    ) -> Result<CommitOutcome> {
        if sender.account.id == receiver.account.id {
            return Err(Error::invalid_transfer("cannot transfer to yourself"));
        }
        let sender_cell = self.cell(sender.account.id)?;
        let receiver_cell = self.cell(receiver.account.id)?;
        let (mut sender_guard, mut receiver_guard) = Self::lock_pair(
            &sender_cell,
            &receiver_cell,
            sender.account.id,
            receiver.account.id,
        )?;

        if sender_guard.version() != sender.expected_version
            || receiver_guard.version() != receiver.expected_version
        {
            return Ok(CommitOutcome::AccountConflict);
        }

        let mut transfers = self.transfers.lock().map_err(poisoned)?;
        let guard_holds = match transfers.get(&transfer.id()) {
            Some(stored) => expect_pending && stored.status() == TransferStatus::Pending,
            None => !expect_pending,
        };
        if !guard_holds {
            return Ok(CommitOutcome::TransferNotPending);
        }

        *sender_guard = sender.account.clone();
        *receiver_guard = receiver.account.clone();
        transfers.insert(transfer.id(), transfer.clone());
        Ok(CommitOutcome::Committed)
    }

    fn fail(
        &self,
        transfer: &Transfer,
        sender_id: Uuid,
        expected_sender_version: i64,
    ) -> Result<CommitOutcome> {
        let sender_cell = self.cell(sender_id)?;
        let sender_guard = sender_cell.lock().map_err(poisoned)?;
        if sender_guard.version() != expected_sender_version {
            return Ok(CommitOutcome::AccountConflict);
        }

        let mut transfers = self.transfers.lock().map_err(poisoned)?;
        let is_pending = transfers
            .get(&transfer.id())
            .is_some_and(|stored| stored.status() == TransferStatus::Pending);
        if !is_pending {
            return Ok(CommitOutcome::TransferNotPending);
        }
        transfers.insert(transfer.id(), transfer.clone());
        Ok(CommitOutcome::Committed)
    }
}

impl LedgerRepository for MemoryRepository {
    fn insert_account(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(poisoned)?;
        if accounts.contains_key(&account.id) {
            return Err(Error::validation(format!("account {} already exists", account.id)));
        }
        for cell in accounts.values() {
            if cell.lock().map_err(poisoned)?.tax_id == account.tax_id {
                return Err(Error::validation("tax id already registered"));
            }
        }
        accounts.insert(account.id, Arc::new(Mutex::new(account.clone())));
        Ok(())
    }

    fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let cell = {
            let accounts = self.accounts.read().map_err(poisoned)?;
            accounts.get(&id).cloned()
        };
        match cell {
            Some(cell) => Ok(Some(cell.lock().map_err(poisoned)?.clone())),
            None => Ok(None),
        }
    }

    fn find_account_by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().map_err(poisoned)?;
        for cell in accounts.values() {
            let account = cell.lock().map_err(poisoned)?;
            if &account.tax_id == tax_id {
                return Ok(Some(account.clone()));
            }
        }
        Ok(None)
    }

    fn insert_transfer(&self, transfer: &Transfer) -> Result<()> {
        let mut transfers = self.transfers.lock().map_err(poisoned)?;
        if transfers.contains_key(&transfer.id()) {
            return Err(Error::validation(format!(
                "transfer {} already exists",
                transfer.id()
            )));
        }
        transfers.insert(transfer.id(), transfer.clone());
        Ok(())
    }

    fn get_transfer(&self, id: Uuid) -> Result<Option<Transfer>> {
        let transfers = self.transfers.lock().map_err(poisoned)?;
        Ok(transfers.get(&id).cloned())
    }

    fn list_transfers_for(&self, user: Uuid) -> Result<Vec<Transfer>> {
        let transfers = self.transfers.lock().map_err(poisoned)?;
        let mut found: Vec<Transfer> = transfers
            .values()
            .filter(|t| t.involves(user))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(found)
    }

    fn commit(&self, commit: &Commit) -> Result<CommitOutcome> {
        match commit {
            Commit::InsertSettled {
                transfer,
                sender,
                receiver,
            } => self.settle(transfer, sender, receiver, false),
            Commit::SettlePending {
                transfer,
                sender,
                receiver,
            } => self.settle(transfer, sender, receiver, true),
            Commit::FailPending {
                transfer,
                sender_id,
                expected_sender_version,
            } => self.fail(transfer, *sender_id, *expected_sender_version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;

    fn open(repo: &MemoryRepository, tax_id: &str, cents: i64) -> Account {
        let account = Account::open(
            "user",
            "user@example.com",
            TaxId::parse(tax_id).unwrap(),
            Amount::from_cents(cents),
        )
        .unwrap();
        repo.insert_account(&account).unwrap();
        account
    }

    #[test]
    fn test_duplicate_tax_id_rejected() {
        let repo = MemoryRepository::new();
        open(&repo, "111.111.111-11", 0);
        let dup = Account::open(
            "other",
            "other@example.com",
            TaxId::parse("11111111111").unwrap(),
            Amount::ZERO,
        )
        .unwrap();
        assert!(repo.insert_account(&dup).is_err());
    }

    #[test]
    fn test_stale_version_is_a_conflict() {
        let repo = MemoryRepository::new();
        let mut sender = open(&repo, "111.111.111-11", 10_000);
        let mut receiver = open(&repo, "222.222.222-22", 0);
        let mut transfer =
            Transfer::new_pending(sender.id, receiver.id, Amount::from_cents(100), None).unwrap();
        transfer.settle(&mut sender, &mut receiver).unwrap();

        let outcome = repo
            .commit(&Commit::InsertSettled {
                transfer,
                sender: AccountWrite::new(sender, 7),
                receiver: AccountWrite::new(receiver.clone(), 0),
            })
            .unwrap();

        assert_eq!(outcome, CommitOutcome::AccountConflict);
        let stored = repo.get_account(receiver.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Amount::ZERO);
        assert!(repo.list_transfers_for(receiver.id).unwrap().is_empty());
    }

    #[test]
    fn test_settle_pending_requires_pending_row() {
        let repo = MemoryRepository::new();
        let mut sender = open(&repo, "111.111.111-11", 10_000);
        let mut receiver = open(&repo, "222.222.222-22", 0);
        let mut transfer =
            Transfer::new_pending(sender.id, receiver.id, Amount::from_cents(100), None).unwrap();
        // Never inserted as PENDING
        transfer.settle(&mut sender, &mut receiver).unwrap();

        let outcome = repo
            .commit(&Commit::SettlePending {
                transfer,
                sender: AccountWrite::new(sender.clone(), 0),
                receiver: AccountWrite::new(receiver, 0),
            })
            .unwrap();

        assert_eq!(outcome, CommitOutcome::TransferNotPending);
        let stored = repo.get_account(sender.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Amount::from_cents(10_000));
    }
}
