//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod money;
pub mod result;
mod tax_id;
pub mod transfer;

pub use account::Account;
pub use money::Amount;
pub use tax_id::TaxId;
pub use transfer::{SettlementSnapshot, Transfer, TransferStatus};
