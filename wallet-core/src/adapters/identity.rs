//! Identity from the process environment
//!
//! `WALLET_USER` names the signed-in account; `defaultUser` in
//! settings.json is used when it is unset.

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::ports::IdentityProvider;

pub const USER_ENV: &str = "WALLET_USER";

pub struct EnvIdentity {
    default_user: Option<Uuid>,
}

impl EnvIdentity {
    pub fn new(default_user: Option<Uuid>) -> Self {
        Self { default_user }
    }

    fn resolve(&self, from_env: Option<String>) -> Result<Uuid> {
        match from_env.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => Uuid::parse_str(value)
                .map_err(|_| Error::validation(format!("{} is not an account id", USER_ENV))),
            None => self.default_user.ok_or_else(|| {
                Error::Forbidden(format!(
                    "no user signed in (set {} or defaultUser in settings.json)",
                    USER_ENV
                ))
            }),
        }
    }
}

impl IdentityProvider for EnvIdentity {
    fn current_user(&self) -> Result<Uuid> {
        self.resolve(std::env::var(USER_ENV).ok())
    }
}
