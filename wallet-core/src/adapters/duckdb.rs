//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection, OptionalExt, Row};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, Amount, SettlementSnapshot, TaxId, Transfer, TransferStatus,
};
use crate::ports::{AccountWrite, Commit, CommitOutcome, LedgerRepository};
use crate::services::MigrationService;

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str = "account_id, name, email, tax_id, phone_number, balance::VARCHAR,
     version, created_at, updated_at";

const TRANSFER_COLUMNS: &str = "transfer_id, sender_id, receiver_id, amount::VARCHAR, status,
     sender_balance_before::VARCHAR, sender_balance_after::VARCHAR,
     receiver_balance_before::VARCHAR, receiver_balance_after::VARCHAR,
     comment, created_at, settled_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock")
}

/// DuckDB repository implementation
///
/// All access goes through one connection. `commit` runs in a DuckDB
/// transaction and rolls back on any guard miss or error.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff while another process holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Connection::open(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map(Error::from).unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<crate::services::MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn)
            .run_pending()
            .map_err(|e| Error::database(e.to_string()))
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Sum of every account balance; settlements never change it
    pub fn total_balance(&self) -> Result<Amount> {
        let conn = self.lock()?;
        let total: String = conn.query_row(
            "SELECT COALESCE(SUM(balance), 0)::DECIMAL(18,2)::VARCHAR FROM sys_accounts",
            [],
            |row| row.get(0),
        )?;
        Amount::try_from(total)
    }

    pub fn transfer_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sys_transfers", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }
}

impl LedgerRepository for DuckDbRepository {
    fn insert_account(&self, account: &Account) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_accounts (account_id, name, email, tax_id, phone_number,
                                       balance, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, ?)",
            params![
                account.id.to_string(),
                account.name,
                account.email,
                account.tax_id.as_str(),
                account.phone_number,
                account.balance().to_string(),
                account.version(),
                format_timestamp(&account.created_at),
                format_timestamp(&account.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM sys_accounts WHERE account_id = ?", ACCOUNT_COLUMNS),
                [id.to_string()],
                AccountRow::from_row,
            )
            .optional()?;
        row.map(AccountRow::into_account).transpose()
    }

    fn find_account_by_tax_id(&self, tax_id: &TaxId) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM sys_accounts WHERE tax_id = ?", ACCOUNT_COLUMNS),
                [tax_id.as_str()],
                AccountRow::from_row,
            )
            .optional()?;
        row.map(AccountRow::into_account).transpose()
    }

    fn insert_transfer(&self, transfer: &Transfer) -> Result<()> {
        let conn = self.lock()?;
        insert_transfer_row(&conn, transfer)
    }

    fn get_transfer(&self, id: Uuid) -> Result<Option<Transfer>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM sys_transfers WHERE transfer_id = ?", TRANSFER_COLUMNS),
                [id.to_string()],
                TransferRow::from_row,
            )
            .optional()?;
        row.map(TransferRow::into_transfer).transpose()
    }

    fn list_transfers_for(&self, user: Uuid) -> Result<Vec<Transfer>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_transfers
             WHERE sender_id = ? OR receiver_id = ?
             ORDER BY created_at DESC, transfer_id",
            TRANSFER_COLUMNS
        ))?;
        let user = user.to_string();
        let rows = stmt
            .query_map(params![user, user], TransferRow::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(TransferRow::into_transfer).collect()
    }

    fn commit(&self, commit: &Commit) -> Result<CommitOutcome> {
        let mut conn = self.lock()?;
        // Dropping `tx` without commit() rolls everything back
        let tx = conn.transaction()?;

        match commit {
            Commit::InsertSettled {
                transfer,
                sender,
                receiver,
            } => {
                if !update_account_guarded(&tx, sender)?
                    || !update_account_guarded(&tx, receiver)?
                {
                    return Ok(CommitOutcome::AccountConflict);
                }
                if transfer_exists(&tx, transfer.id())? {
                    return Ok(CommitOutcome::TransferNotPending);
                }
                insert_transfer_row(&tx, transfer)?;
            }
            Commit::SettlePending {
                transfer,
                sender,
                receiver,
            } => {
                if !update_account_guarded(&tx, sender)?
                    || !update_account_guarded(&tx, receiver)?
                {
                    return Ok(CommitOutcome::AccountConflict);
                }
                if !update_pending_transfer(&tx, transfer)? {
                    return Ok(CommitOutcome::TransferNotPending);
                }
            }
            Commit::FailPending {
                transfer,
                sender_id,
                expected_sender_version,
            } => {
                let current: Option<i64> = tx
                    .query_row(
                        "SELECT version FROM sys_accounts WHERE account_id = ?",
                        [sender_id.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if current != Some(*expected_sender_version) {
                    return Ok(CommitOutcome::AccountConflict);
                }
                if !update_pending_transfer(&tx, transfer)? {
                    return Ok(CommitOutcome::TransferNotPending);
                }
            }
        }

        tx.commit()?;
        Ok(CommitOutcome::Committed)
    }
}

/// Write an account's new balance if nobody changed it since it was read
fn update_account_guarded(conn: &Connection, write: &AccountWrite) -> Result<bool> {
    let account = &write.account;
    let changed = conn.execute(
        "UPDATE sys_accounts
         SET balance = CAST(? AS DECIMAL(18,2)), version = ?, updated_at = ?
         WHERE account_id = ? AND version = ?",
        params![
            account.balance().to_string(),
            account.version(),
            format_timestamp(&account.updated_at),
            account.id.to_string(),
            write.expected_version,
        ],
    )?;
    Ok(changed == 1)
}

/// Move a PENDING row to the transfer's new status and snapshot
fn update_pending_transfer(conn: &Connection, transfer: &Transfer) -> Result<bool> {
    let snapshot = snapshot_params(transfer.snapshot());
    let changed = conn.execute(
        "UPDATE sys_transfers
         SET status = ?,
             sender_balance_before = CAST(? AS DECIMAL(18,2)),
             sender_balance_after = CAST(? AS DECIMAL(18,2)),
             receiver_balance_before = CAST(? AS DECIMAL(18,2)),
             receiver_balance_after = CAST(? AS DECIMAL(18,2)),
             settled_at = ?
         WHERE transfer_id = ? AND status = 'PENDING'",
        params![
            transfer.status().as_str(),
            snapshot[0],
            snapshot[1],
            snapshot[2],
            snapshot[3],
            transfer.settled_at().as_ref().map(format_timestamp),
            transfer.id().to_string(),
        ],
    )?;
    Ok(changed == 1)
}

fn transfer_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sys_transfers WHERE transfer_id = ?",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn insert_transfer_row(conn: &Connection, transfer: &Transfer) -> Result<()> {
    let snapshot = snapshot_params(transfer.snapshot());
    conn.execute(
        "INSERT INTO sys_transfers (transfer_id, sender_id, receiver_id, amount, status,
                                    sender_balance_before, sender_balance_after,
                                    receiver_balance_before, receiver_balance_after,
                                    comment, created_at, settled_at)
         VALUES (?, ?, ?, CAST(? AS DECIMAL(18,2)), ?,
                 CAST(? AS DECIMAL(18,2)), CAST(? AS DECIMAL(18,2)),
                 CAST(? AS DECIMAL(18,2)), CAST(? AS DECIMAL(18,2)),
                 ?, ?, ?)",
        params![
            transfer.id().to_string(),
            transfer.sender_id().to_string(),
            transfer.receiver_id().to_string(),
            transfer.amount().to_string(),
            transfer.status().as_str(),
            snapshot[0],
            snapshot[1],
            snapshot[2],
            snapshot[3],
            transfer.comment,
            format_timestamp(&transfer.created_at()),
            transfer.settled_at().as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

/// The four snapshot values as nullable strings, in column order
fn snapshot_params(snapshot: Option<&SettlementSnapshot>) -> [Option<String>; 4] {
    match snapshot {
        Some(s) => [
            Some(s.sender_balance_before.to_string()),
            Some(s.sender_balance_after.to_string()),
            Some(s.receiver_balance_before.to_string()),
            Some(s.receiver_balance_after.to_string()),
        ],
        None => [None, None, None, None],
    }
}

// Row mapping: columns are read as plain strings inside the duckdb closure,
// then converted with proper errors outside it.

struct AccountRow {
    id: String,
    name: String,
    email: String,
    tax_id: String,
    phone_number: Option<String>,
    balance: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    fn from_row(row: &Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            tax_id: row.get(3)?,
            phone_number: row.get(4)?,
            balance: row.get(5)?,
            version: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_account(self) -> Result<Account> {
        Ok(Account::restore(
            parse_uuid(&self.id)?,
            self.name,
            self.email,
            TaxId::parse(&self.tax_id)?,
            self.phone_number,
            Amount::try_from(self.balance)?,
            self.version,
            parse_timestamp(&self.created_at)?,
            parse_timestamp(&self.updated_at)?,
        ))
    }
}

struct TransferRow {
    id: String,
    sender_id: String,
    receiver_id: String,
    amount: String,
    status: String,
    snapshot: [Option<String>; 4],
    comment: Option<String>,
    created_at: String,
    settled_at: Option<String>,
}

impl TransferRow {
    fn from_row(row: &Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            amount: row.get(3)?,
            status: row.get(4)?,
            snapshot: [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
            comment: row.get(9)?,
            created_at: row.get(10)?,
            settled_at: row.get(11)?,
        })
    }

    fn into_transfer(self) -> Result<Transfer> {
        let snapshot = match self.snapshot {
            [Some(sb), Some(sa), Some(rb), Some(ra)] => Some(SettlementSnapshot {
                sender_balance_before: Amount::try_from(sb)?,
                sender_balance_after: Amount::try_from(sa)?,
                receiver_balance_before: Amount::try_from(rb)?,
                receiver_balance_after: Amount::try_from(ra)?,
            }),
            [None, None, None, None] => None,
            _ => {
                return Err(Error::database(format!(
                    "transfer {} has a partial balance snapshot",
                    self.id
                )))
            }
        };

        Ok(Transfer::restore(
            parse_uuid(&self.id)?,
            parse_uuid(&self.sender_id)?,
            parse_uuid(&self.receiver_id)?,
            Amount::try_from(self.amount)?,
            self.status.parse::<TransferStatus>()?,
            snapshot,
            self.comment,
            parse_timestamp(&self.created_at)?,
            self.settled_at.as_deref().map(parse_timestamp).transpose()?,
        ))
    }
}

// Helper functions

/// Fixed-width RFC 3339 so that string order equals time order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("bad id '{}': {}", s, e)))
}
