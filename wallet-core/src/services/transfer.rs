//! Transfer service - creating and settling transfers
//!
//! Both ways of paying someone end in the same place. A direct transfer is
//! settled immediately; a pending one is settled when its sender confirms
//! it. Either way the service reads both accounts, runs
//! [`Transfer::settle`] on copies and hands the result to
//! [`LedgerRepository::commit`]. If an account moved in between, the commit
//! is refused and the whole read-settle-commit cycle runs again.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::DEFAULT_MAX_SETTLEMENT_RETRIES;
use crate::domain::result::{Error, Result};
use crate::domain::{Account, Amount, TaxId, Transfer};
use crate::ports::{AccountWrite, Commit, CommitOutcome, LedgerRepository};

/// The two request shapes that reach the settlement primitive
#[derive(Debug)]
enum SettleRequest {
    /// A freshly built transfer that has never been stored
    Direct(Transfer),
    /// A stored PENDING transfer, confirmed by `caller`
    Confirm { transfer_id: Uuid, caller: Uuid },
}

/// A commit ready to submit, and what to report once it lands
struct Attempt {
    commit: Commit,
    refusal: Option<Error>,
}

impl Attempt {
    fn settled(commit: Commit) -> Self {
        Self {
            commit,
            refusal: None,
        }
    }

    fn refused(commit: Commit, error: Error) -> Self {
        Self {
            commit,
            refusal: Some(error),
        }
    }

    fn finish(self) -> Result<Transfer> {
        match self.refusal {
            Some(error) => Err(error),
            None => Ok(self.commit.transfer().clone()),
        }
    }
}

pub struct TransferService {
    repository: Arc<dyn LedgerRepository>,
    max_attempts: u32,
}

impl TransferService {
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        Self::with_max_attempts(repository, DEFAULT_MAX_SETTLEMENT_RETRIES)
    }

    pub fn with_max_attempts(repository: Arc<dyn LedgerRepository>, max_attempts: u32) -> Self {
        Self {
            repository,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Pay the account registered under `receiver_key` (a tax id) right away
    ///
    /// Returns the COMPLETED transfer. Nothing is stored when the sender
    /// cannot cover the amount.
    pub fn create_direct(
        &self,
        sender_id: Uuid,
        receiver_key: &str,
        amount: Amount,
        comment: Option<String>,
    ) -> Result<Transfer> {
        let tax_id = TaxId::parse(receiver_key)?;
        let receiver = self
            .repository
            .find_account_by_tax_id(&tax_id)?
            .ok_or_else(|| Error::ReceiverNotFound(tax_id.to_string()))?;

        let transfer = Transfer::new_pending(sender_id, receiver.id, amount, comment)?;
        self.settle_with_retry(SettleRequest::Direct(transfer))
    }

    /// Record a PENDING transfer for the sender to confirm later
    ///
    /// The sender's balance is not looked at here; it is checked when the
    /// transfer is confirmed.
    pub fn create_pending(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        amount: Amount,
        comment: Option<String>,
    ) -> Result<Transfer> {
        let transfer = Transfer::new_pending(sender_id, receiver_id, amount, comment)?;

        self.load_sender(sender_id)?;
        self.load_receiver(receiver_id)?;

        self.repository.insert_transfer(&transfer)?;
        Ok(transfer)
    }

    /// Settle a PENDING transfer on behalf of its sender
    ///
    /// If the sender can no longer cover the amount the transfer is stored
    /// as FAILED and `InsufficientFunds` is returned.
    pub fn confirm(&self, transfer_id: Uuid, caller: Uuid) -> Result<Transfer> {
        self.settle_with_retry(SettleRequest::Confirm {
            transfer_id,
            caller,
        })
    }

    /// A transfer the caller took part in
    pub fn get(&self, transfer_id: Uuid, caller: Uuid) -> Result<Transfer> {
        let transfer = self.load_transfer(transfer_id)?;
        if !transfer.involves(caller) {
            return Err(Error::Forbidden(
                "you are not a participant in this transfer".to_string(),
            ));
        }
        Ok(transfer)
    }

    /// Every transfer the caller sent or received, newest first
    pub fn list_for(&self, caller: Uuid) -> Result<Vec<Transfer>> {
        self.repository.list_transfers_for(caller)
    }

    fn settle_with_retry(&self, request: SettleRequest) -> Result<Transfer> {
        for _ in 0..self.max_attempts {
            let attempt = self.prepare(&request)?;

            let outcome = self
                .repository
                .commit(&attempt.commit)
                .map_err(|e| Error::SettlementFailed(e.to_string()))?;

            match outcome {
                CommitOutcome::Committed => return attempt.finish(),
                CommitOutcome::AccountConflict => std::thread::yield_now(),
                CommitOutcome::TransferNotPending => {
                    return Err(self.settled_elsewhere(attempt.commit.transfer().id()))
                }
            }
        }

        Err(Error::SettlementFailed(format!(
            "accounts kept changing, gave up after {} attempts",
            self.max_attempts
        )))
    }

    /// Read current state and build the commit for one attempt
    fn prepare(&self, request: &SettleRequest) -> Result<Attempt> {
        match request {
            SettleRequest::Direct(transfer) => {
                let mut sender = self.load_sender(transfer.sender_id())?;
                let mut receiver = self.load_receiver(transfer.receiver_id())?;
                let (sender_version, receiver_version) = (sender.version(), receiver.version());

                let mut settled = transfer.clone();
                settled.settle(&mut sender, &mut receiver)?;

                Ok(Attempt::settled(Commit::InsertSettled {
                    transfer: settled,
                    sender: AccountWrite::new(sender, sender_version),
                    receiver: AccountWrite::new(receiver, receiver_version),
                }))
            }
            SettleRequest::Confirm {
                transfer_id,
                caller,
            } => {
                let mut transfer = self.load_transfer(*transfer_id)?;
                if transfer.sender_id() != *caller {
                    return Err(Error::Forbidden(
                        "only the sender can confirm a transfer".to_string(),
                    ));
                }
                if transfer.status().is_terminal() {
                    return Err(Error::InvalidState(transfer.status()));
                }

                let mut sender = self.load_sender(transfer.sender_id())?;
                let mut receiver = self.load_receiver(transfer.receiver_id())?;
                let (sender_version, receiver_version) = (sender.version(), receiver.version());

                match transfer.settle(&mut sender, &mut receiver) {
                    Ok(()) => Ok(Attempt::settled(Commit::SettlePending {
                        transfer,
                        sender: AccountWrite::new(sender, sender_version),
                        receiver: AccountWrite::new(receiver, receiver_version),
                    })),
                    Err(Error::InsufficientFunds) => {
                        transfer.fail()?;
                        Ok(Attempt::refused(
                            Commit::FailPending {
                                transfer,
                                sender_id: sender.id,
                                expected_sender_version: sender_version,
                            },
                            Error::InsufficientFunds,
                        ))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Someone else finished the transfer first: report what it became
    fn settled_elsewhere(&self, transfer_id: Uuid) -> Error {
        match self.repository.get_transfer(transfer_id) {
            Ok(Some(current)) => Error::InvalidState(current.status()),
            Ok(None) => Error::SettlementFailed(format!("transfer {} vanished", transfer_id)),
            Err(e) => Error::SettlementFailed(e.to_string()),
        }
    }

    fn load_transfer(&self, id: Uuid) -> Result<Transfer> {
        self.repository
            .get_transfer(id)?
            .ok_or_else(|| Error::not_found(format!("transfer {}", id)))
    }

    fn load_sender(&self, id: Uuid) -> Result<Account> {
        self.repository
            .get_account(id)?
            .ok_or_else(|| Error::not_found(format!("sender account {}", id)))
    }

    fn load_receiver(&self, id: Uuid) -> Result<Account> {
        self.repository
            .get_account(id)?
            .ok_or_else(|| Error::ReceiverNotFound(id.to_string()))
    }
}
