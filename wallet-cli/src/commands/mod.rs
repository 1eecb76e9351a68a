//! CLI command implementations

pub mod account;
pub mod logs;
pub mod transfer;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use uuid::Uuid;

use wallet_core::{
    EntryPoint, Error, IdentityProvider, LogEvent, LoggingService, OperationResult, WalletContext,
};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let wallet_dir = get_wallet_dir().ok()?;
    std::fs::create_dir_all(&wallet_dir).ok()?;
    LoggingService::new(&wallet_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the wallet directory from `WALLET_DIR` or default to ~/.wallet
pub fn get_wallet_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("WALLET_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".wallet"))
        .ok_or_else(|| anyhow!("Could not find home directory; set WALLET_DIR"))
}

/// Open the wallet, creating it on first use
pub fn get_context() -> Result<WalletContext> {
    let wallet_dir = get_wallet_dir()?;
    WalletContext::new(&wallet_dir).context("Failed to open wallet")
}

/// The signed-in account id
pub fn current_user(ctx: &WalletContext) -> wallet_core::domain::result::Result<Uuid> {
    ctx.identity.current_user()
}

/// First 8 characters of an id, for tables
pub fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Print an operation's outcome and log it
///
/// In JSON mode both outcomes are printed as an `OperationResult`
/// envelope on stdout. Failures are also logged with their error code and
/// returned so the process exits non-zero.
pub fn finish<T: Serialize>(
    logger: &Option<LoggingService>,
    command: &str,
    json: bool,
    result: wallet_core::domain::result::Result<T>,
    render: impl FnOnce(&T),
) -> Result<()> {
    match result {
        Ok(data) => {
            if let Some(l) = logger {
                let _ = l.log_command(command);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
            } else {
                render(&data);
            }
            Ok(())
        }
        Err(e) => {
            log_event(
                logger,
                LogEvent::new("command_failed")
                    .with_command(command)
                    .with_failure(&e)
                    .with_error_details(if e.is_client_error() { "client" } else { "system" }),
            );
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&OperationResult::<T>::from_error(&e))?
                );
            }
            Err(failure(e))
        }
    }
}

fn failure(e: Error) -> anyhow::Error {
    anyhow!("{} ({})", e, e.code())
}
