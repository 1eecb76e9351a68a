//! Identity port - who is making the request
//!
//! Authentication happens outside the core. The core only receives the
//! resulting account id and compares it for equality.

use uuid::Uuid;

use crate::domain::result::Result;

/// Supplies the authenticated caller's account id
pub trait IdentityProvider: Send + Sync {
    /// The caller's account id, or an error if nobody is signed in
    fn current_user(&self) -> Result<Uuid>;
}
