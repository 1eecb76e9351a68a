//! Account domain model

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::money::Amount;
use super::result::{Error, Result};
use super::tax_id::TaxId;

/// A user's wallet. The account id is the user id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub tax_id: TaxId,
    pub phone_number: Option<String>,
    balance: Amount,
    /// Bumped on every committed balance change; stores compare-and-swap on it
    version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new account with an opening balance
    pub fn open(
        name: impl Into<String>,
        email: impl Into<String>,
        tax_id: TaxId,
        opening_balance: Amount,
    ) -> Result<Self> {
        if opening_balance.is_negative() {
            return Err(Error::validation("opening balance cannot be negative"));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("account name cannot be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            email: email.into(),
            tax_id,
            phone_number: None,
            balance: opening_balance,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild an account from storage
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid,
        name: String,
        email: String,
        tax_id: TaxId,
        phone_number: Option<String>,
        balance: Amount,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            tax_id,
            phone_number,
            balance,
            version,
            created_at,
            updated_at,
        }
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn can_cover(&self, amount: Amount) -> bool {
        self.balance >= amount
    }

    pub(crate) fn credit(&mut self, amount: Amount) -> Result<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| Error::invalid_transfer("balance overflow"))?;
        self.touch();
        Ok(())
    }

    pub(crate) fn debit(&mut self, amount: Amount) -> Result<()> {
        if !self.can_cover(amount) {
            return Err(Error::InsufficientFunds);
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(Error::InsufficientFunds)?;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
