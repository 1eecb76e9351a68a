//! Account service - opening and looking up wallets

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, Amount, TaxId};
use crate::ports::LedgerRepository;

const MAX_PHONE_LEN: usize = 15;

/// Details needed to open an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub tax_id: String,
    pub phone_number: Option<String>,
    pub opening_balance: Amount,
}

pub struct AccountService {
    repository: Arc<dyn LedgerRepository>,
}

impl AccountService {
    pub fn new(repository: Arc<dyn LedgerRepository>) -> Self {
        Self { repository }
    }

    /// Open an account; the tax id must not be registered yet
    pub fn open_account(&self, request: NewAccount) -> Result<Account> {
        let tax_id = TaxId::parse(&request.tax_id)?;

        let email = request.email.trim();
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(Error::validation("invalid email address"));
        }

        let phone_number = request
            .phone_number
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if phone_number.as_ref().is_some_and(|p| p.len() > MAX_PHONE_LEN) {
            return Err(Error::validation(format!(
                "phone number longer than {} characters",
                MAX_PHONE_LEN
            )));
        }

        if self.repository.find_account_by_tax_id(&tax_id)?.is_some() {
            return Err(Error::validation("tax id already registered"));
        }

        let mut account = Account::open(
            request.name.trim(),
            email,
            tax_id,
            request.opening_balance,
        )?;
        account.phone_number = phone_number;

        self.repository.insert_account(&account)?;
        Ok(account)
    }

    pub fn get_account(&self, id: Uuid) -> Result<Account> {
        self.repository
            .get_account(id)?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    /// Look an account up by tax id (canonical or bare digits)
    pub fn find_by_tax_id(&self, tax_id: &str) -> Result<Account> {
        let tax_id = TaxId::parse(tax_id)?;
        self.repository
            .find_account_by_tax_id(&tax_id)?
            .ok_or_else(|| Error::not_found(format!("no account with tax id {}", tax_id)))
    }

    /// Resolve an account from either its id or its tax id
    pub fn resolve(&self, key: &str) -> Result<Account> {
        match Uuid::parse_str(key.trim()) {
            Ok(id) => self.get_account(id),
            Err(_) => self.find_by_tax_id(key),
        }
    }
}
