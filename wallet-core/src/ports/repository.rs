//! Repository port - ledger persistence abstraction

use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Account, TaxId, Transfer};

/// An account to write, with the version it had when it was read
#[derive(Debug, Clone)]
pub struct AccountWrite {
    pub account: Account,
    pub expected_version: i64,
}

impl AccountWrite {
    pub fn new(account: Account, expected_version: i64) -> Self {
        Self {
            account,
            expected_version,
        }
    }
}

/// One indivisible unit of ledger writes.
///
/// Every write is guarded. If any guard misses, nothing is applied.
#[derive(Debug, Clone)]
pub enum Commit {
    /// Insert an already COMPLETED transfer and both account balances
    InsertSettled {
        transfer: Transfer,
        sender: AccountWrite,
        receiver: AccountWrite,
    },
    /// Move a stored PENDING transfer to COMPLETED with both account balances
    SettlePending {
        transfer: Transfer,
        sender: AccountWrite,
        receiver: AccountWrite,
    },
    /// Move a stored PENDING transfer to FAILED.
    ///
    /// Guarded by the sender's version so the failure is only recorded
    /// against the balance that was actually checked.
    FailPending {
        transfer: Transfer,
        sender_id: Uuid,
        expected_sender_version: i64,
    },
}

impl Commit {
    pub fn transfer(&self) -> &Transfer {
        match self {
            Commit::InsertSettled { transfer, .. }
            | Commit::SettlePending { transfer, .. }
            | Commit::FailPending { transfer, .. } => transfer,
        }
    }
}

/// What happened to a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All writes landed
    Committed,
    /// An account changed since it was read; nothing was written
    AccountConflict,
    /// The transfer is no longer PENDING (or already exists); nothing was written
    TransferNotPending,
}

/// Ledger persistence
///
/// Implementations must apply a [`Commit`] atomically: either every write
/// lands or none does, and the guards are checked inside the same unit.
pub trait LedgerRepository: Send + Sync {
    // === Accounts ===

    /// Add a new account
    fn insert_account(&self, account: &Account) -> Result<()>;

    /// Get account by ID
    fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Resolve an account by tax id. `None` means no such account.
    fn find_account_by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Account>>;

    // === Transfers ===

    /// Store a new PENDING transfer
    fn insert_transfer(&self, transfer: &Transfer) -> Result<()>;

    /// Get transfer by ID
    fn get_transfer(&self, id: Uuid) -> Result<Option<Transfer>>;

    /// All transfers where `user` is sender or receiver, newest first
    fn list_transfers_for(&self, user: Uuid) -> Result<Vec<Transfer>>;

    // === Settlement ===

    /// Apply a guarded unit of writes
    fn commit(&self, commit: &Commit) -> Result<CommitOutcome>;
}
