//! Transfer domain model and its state machine
//!
//! ```text
//! PENDING ──settle──▶ COMPLETED
//!    │
//!    └────fail─────▶ FAILED
//! ```
//!
//! COMPLETED and FAILED are terminal. The balance snapshot is written in the
//! same step that moves a transfer to COMPLETED and never changes after.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::Account;
use super::money::Amount;
use super::result::{Error, Result};

/// Transfer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "COMPLETED" => Ok(TransferStatus::Completed),
            "FAILED" => Ok(TransferStatus::Failed),
            other => Err(Error::database(format!("unknown transfer status '{}'", other))),
        }
    }
}

/// The four balances recorded at settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSnapshot {
    pub sender_balance_before: Amount,
    pub sender_balance_after: Amount,
    pub receiver_balance_before: Amount,
    pub receiver_balance_after: Amount,
}

impl SettlementSnapshot {
    /// Sum of both balances before and after must match
    pub fn conserves_funds(&self) -> bool {
        let before = self
            .sender_balance_before
            .checked_add(self.receiver_balance_before);
        let after = self
            .sender_balance_after
            .checked_add(self.receiver_balance_after);
        before.is_some() && before == after
    }
}

/// A movement of funds from one account to another
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transfer {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    amount: Amount,
    status: TransferStatus,
    snapshot: Option<SettlementSnapshot>,
    pub comment: Option<String>,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Create a PENDING transfer. No balance is checked here.
    pub fn new_pending(
        sender_id: Uuid,
        receiver_id: Uuid,
        amount: Amount,
        comment: Option<String>,
    ) -> Result<Self> {
        if !amount.is_positive() {
            return Err(Error::invalid_transfer("amount must be greater than zero"));
        }
        if sender_id == receiver_id {
            return Err(Error::invalid_transfer("cannot transfer to yourself"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            amount,
            status: TransferStatus::Pending,
            snapshot: None,
            comment: comment.filter(|c| !c.trim().is_empty()),
            created_at: Utc::now(),
            settled_at: None,
        })
    }

    /// Rebuild a transfer from storage
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        amount: Amount,
        status: TransferStatus,
        snapshot: Option<SettlementSnapshot>,
        comment: Option<String>,
        created_at: DateTime<Utc>,
        settled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            amount,
            status,
            snapshot,
            comment,
            created_at,
            settled_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender_id(&self) -> Uuid {
        self.sender_id
    }

    pub fn receiver_id(&self) -> Uuid {
        self.receiver_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn snapshot(&self) -> Option<&SettlementSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    /// True if `user` is the sender or the receiver
    pub fn involves(&self, user: Uuid) -> bool {
        self.sender_id == user || self.receiver_id == user
    }

    /// Move the funds and record the snapshot.
    ///
    /// On any error neither account nor the transfer is modified.
    pub(crate) fn settle(&mut self, sender: &mut Account, receiver: &mut Account) -> Result<()> {
        if self.status != TransferStatus::Pending {
            return Err(Error::InvalidState(self.status));
        }
        if sender.id != self.sender_id || receiver.id != self.receiver_id {
            return Err(Error::invalid_transfer("accounts do not match the transfer"));
        }
        if !sender.can_cover(self.amount) {
            return Err(Error::InsufficientFunds);
        }
        if receiver.balance().checked_add(self.amount).is_none() {
            return Err(Error::invalid_transfer("receiver balance would overflow"));
        }

        let sender_balance_before = sender.balance();
        let receiver_balance_before = receiver.balance();

        sender.debit(self.amount)?;
        receiver.credit(self.amount)?;

        self.snapshot = Some(SettlementSnapshot {
            sender_balance_before,
            sender_balance_after: sender.balance(),
            receiver_balance_before,
            receiver_balance_after: receiver.balance(),
        });
        self.status = TransferStatus::Completed;
        self.settled_at = Some(Utc::now());
        Ok(())
    }

    /// Record a settlement that could not be funded
    pub(crate) fn fail(&mut self) -> Result<()> {
        if self.status != TransferStatus::Pending {
            return Err(Error::InvalidState(self.status));
        }
        self.status = TransferStatus::Failed;
        self.settled_at = Some(Utc::now());
        Ok(())
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {} | {} | {}",
            self.sender_id, self.receiver_id, self.amount, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaxId;

    fn account(tax_id: &str, cents: i64) -> Account {
        Account::open(
            "user",
            "user@example.com",
            TaxId::parse(tax_id).unwrap(),
            Amount::from_cents(cents),
        )
        .unwrap()
    }

    #[test]
    fn test_new_pending_validation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let err = Transfer::new_pending(a, b, Amount::ZERO, None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransfer(_)));

        let err = Transfer::new_pending(a, b, Amount::from_cents(-100), None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransfer(_)));

        let err = Transfer::new_pending(a, a, Amount::from_cents(100), None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransfer(_)));

        let t = Transfer::new_pending(a, b, Amount::from_cents(100), Some("  ".into())).unwrap();
        assert_eq!(t.status(), TransferStatus::Pending);
        assert!(t.snapshot().is_none());
        assert!(t.comment.is_none());
    }

    #[test]
    fn test_serializes_for_json_output() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let t = Transfer::new_pending(a, b, Amount::from_cents(1_050), None).unwrap();

        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["amount"], "10.50");
        assert_eq!(json["sender_id"], a.to_string());
        assert!(json["snapshot"].is_null());
    }

    #[test]
    fn test_settle_records_snapshot() {
        let mut sender = account("111.111.111-11", 10_000);
        let mut receiver = account("222.222.222-22", 5_000);
        let mut t =
            Transfer::new_pending(sender.id, receiver.id, Amount::from_cents(3_000), None).unwrap();

        t.settle(&mut sender, &mut receiver).unwrap();

        assert_eq!(t.status(), TransferStatus::Completed);
        assert_eq!(sender.balance(), Amount::from_cents(7_000));
        assert_eq!(receiver.balance(), Amount::from_cents(8_000));

        let snap = t.snapshot().unwrap();
        assert_eq!(snap.sender_balance_before, Amount::from_cents(10_000));
        assert_eq!(snap.sender_balance_after, Amount::from_cents(7_000));
        assert_eq!(snap.receiver_balance_before, Amount::from_cents(5_000));
        assert_eq!(snap.receiver_balance_after, Amount::from_cents(8_000));
        assert!(snap.conserves_funds());
        assert!(t.settled_at().is_some());
    }

    #[test]
    fn test_settle_insufficient_funds_mutates_nothing() {
        let mut sender = account("111.111.111-11", 10_000);
        let mut receiver = account("222.222.222-22", 0);
        let mut t =
            Transfer::new_pending(sender.id, receiver.id, Amount::from_cents(20_000), None)
                .unwrap();
        let (s0, r0, t0) = (sender.clone(), receiver.clone(), t.clone());

        let err = t.settle(&mut sender, &mut receiver).unwrap_err();

        assert!(matches!(err, Error::InsufficientFunds));
        assert_eq!(sender, s0);
        assert_eq!(receiver, r0);
        assert_eq!(t, t0);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut sender = account("111.111.111-11", 10_000);
        let mut receiver = account("222.222.222-22", 0);
        let mut t =
            Transfer::new_pending(sender.id, receiver.id, Amount::from_cents(100), None).unwrap();

        t.settle(&mut sender, &mut receiver).unwrap();
        let err = t.settle(&mut sender, &mut receiver).unwrap_err();
        assert!(matches!(err, Error::InvalidState(TransferStatus::Completed)));
        assert!(matches!(t.fail(), Err(Error::InvalidState(TransferStatus::Completed))));
        assert_eq!(sender.balance(), Amount::from_cents(9_900));

        let mut failed =
            Transfer::new_pending(sender.id, receiver.id, Amount::from_cents(100), None).unwrap();
        failed.fail().unwrap();
        assert_eq!(failed.status(), TransferStatus::Failed);
        let err = failed.settle(&mut sender, &mut receiver).unwrap_err();
        assert!(matches!(err, Error::InvalidState(TransferStatus::Failed)));
    }

    #[test]
    fn test_settle_rejects_mismatched_accounts() {
        let mut sender = account("111.111.111-11", 10_000);
        let mut receiver = account("222.222.222-22", 0);
        let mut other = account("333.333.333-33", 0);
        let mut t =
            Transfer::new_pending(sender.id, receiver.id, Amount::from_cents(100), None).unwrap();

        assert!(t.settle(&mut sender, &mut other).is_err());
        assert!(t.settle(&mut receiver, &mut sender).is_err());
        assert_eq!(t.status(), TransferStatus::Pending);
    }

    #[test]
    fn test_status_round_trip_and_display() {
        for status in [
            TransferStatus::Pending,
            TransferStatus::Completed,
            TransferStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransferStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<TransferStatus>().is_err());
        assert!(TransferStatus::Failed.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let t = Transfer::new_pending(a, b, Amount::from_cents(1_234), None).unwrap();
        assert_eq!(t.to_string(), format!("{} → {} | 12.34 | PENDING", a, b));
    }
}
