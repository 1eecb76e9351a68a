//! Wallet Core - a ledger of accounts and the transfers between them
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transfer, Amount, TaxId)
//! - **ports**: Trait definitions for external dependencies (LedgerRepository, IdentityProvider)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB, in-memory, environment identity)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;

use adapters::duckdb::DuckDbRepository;
use adapters::identity::EnvIdentity;
use config::Config;
use services::{AccountService, TransferService};

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{Account, Amount, SettlementSnapshot, TaxId, Transfer, TransferStatus};
pub use ports::IdentityProvider;
pub use services::{EntryPoint, LogEvent, LoggingService};

/// Main context for wallet operations
///
/// Holds the database, configuration and services for one wallet
/// directory. The directory stays locked against other processes for as
/// long as the context lives.
pub struct WalletContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub identity: EnvIdentity,
    pub account_service: AccountService,
    pub transfer_service: TransferService,
    _lock: File,
}

impl WalletContext {
    pub fn new(wallet_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(wallet_dir)
            .with_context(|| format!("Failed to create {:?}", wallet_dir))?;

        let lock_path = wallet_dir.join("wallet.lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {:?}", lock_path))?;
        lock.lock_exclusive()
            .with_context(|| format!("Failed to lock {:?}", lock_path))?;

        let config = Config::load(wallet_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&wallet_dir.join("wallet.duckdb"))?);
        repository.ensure_schema()?;

        let account_service = AccountService::new(repository.clone());
        let transfer_service =
            TransferService::with_max_attempts(repository.clone(), config.max_settlement_retries);
        let identity = EnvIdentity::new(config.default_user);

        Ok(Self {
            config,
            repository,
            identity,
            account_service,
            transfer_service,
            _lock: lock,
        })
    }
}
