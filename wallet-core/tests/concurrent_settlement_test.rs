//! Concurrent settlement tests
//!
//! Many threads settle against the same accounts at once. Whatever the
//! interleaving, a pending transfer settles at most once and money is never
//! created or destroyed. Every scenario runs against both repositories.
//!
//! Run with: cargo test --test concurrent_settlement_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;

use wallet_core::adapters::duckdb::DuckDbRepository;
use wallet_core::adapters::memory::MemoryRepository;
use wallet_core::ports::LedgerRepository;
use wallet_core::services::TransferService;
use wallet_core::{Account, Amount, Error, TaxId, TransferStatus};

/// Number of concurrent threads for stress tests
const THREAD_COUNT: usize = 8;

/// Transfers each thread submits in the cross-transfer test
const TRANSFERS_PER_THREAD: usize = 10;

/// Settlement attempts allowed per request; high enough that contention
/// between THREAD_COUNT threads never exhausts it
const MAX_ATTEMPTS: u32 = 64;

fn amount(s: &str) -> Amount {
    Amount::parse(s).unwrap()
}

fn seed_account(repo: &dyn LedgerRepository, n: usize, balance: &str) -> Account {
    let digit = char::from(b'0' + n as u8);
    let tax_id = TaxId::parse(&digit.to_string().repeat(11)).unwrap();
    let account = Account::open(
        format!("holder {}", n),
        format!("holder{}@example.com", n),
        tax_id,
        amount(balance),
    )
    .unwrap();
    repo.insert_account(&account).unwrap();
    account
}

fn memory_repo() -> (Arc<dyn LedgerRepository>, Option<TempDir>) {
    (Arc::new(MemoryRepository::new()), None)
}

fn duckdb_repo() -> (Arc<dyn LedgerRepository>, Option<TempDir>) {
    let temp_dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&temp_dir.path().join("concurrent.duckdb")).unwrap();
    repo.ensure_schema().unwrap();
    (Arc::new(repo), Some(temp_dir))
}

// ============================================================================
// Same pending transfer, many confirmers
// ============================================================================

fn run_concurrent_confirms(repo: Arc<dyn LedgerRepository>) {
    let sender = seed_account(repo.as_ref(), 1, "100.00");
    let receiver = seed_account(repo.as_ref(), 2, "0");

    let service = Arc::new(TransferService::with_max_attempts(repo.clone(), MAX_ATTEMPTS));
    let pending = service
        .create_pending(sender.id, receiver.id, amount("60.00"), None)
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let success_count = Arc::new(AtomicUsize::new(0));
    let invalid_state_count = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let success_count = Arc::clone(&success_count);
            let invalid_state_count = Arc::clone(&invalid_state_count);
            let transfer_id = pending.id();
            let caller = sender.id;

            thread::spawn(move || {
                barrier.wait();
                match service.confirm(transfer_id, caller) {
                    Ok(_) => {
                        success_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Error::InvalidState(_)) => {
                        invalid_state_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(success_count.load(Ordering::SeqCst), 1);
    assert_eq!(invalid_state_count.load(Ordering::SeqCst), THREAD_COUNT - 1);

    let sender_after = repo.get_account(sender.id).unwrap().unwrap();
    let receiver_after = repo.get_account(receiver.id).unwrap().unwrap();
    assert_eq!(sender_after.balance(), amount("40.00"));
    assert_eq!(receiver_after.balance(), amount("60.00"));
    assert_eq!(sender_after.version(), 1);

    let stored = repo.get_transfer(pending.id()).unwrap().unwrap();
    assert_eq!(stored.status(), TransferStatus::Completed);
}

#[test]
fn test_concurrent_confirms_settle_once_memory() {
    let (repo, _dir) = memory_repo();
    run_concurrent_confirms(repo);
}

#[test]
fn test_concurrent_confirms_settle_once_duckdb() {
    let (repo, _dir) = duckdb_repo();
    run_concurrent_confirms(repo);
}

// ============================================================================
// Several pending transfers draining one account
// ============================================================================

/// The sender can afford exactly half of the confirmations racing for its
/// balance. Whichever half wins, the rest fail and nothing overdraws.
fn run_competing_withdrawals(repo: Arc<dyn LedgerRepository>) {
    let affordable = THREAD_COUNT / 2;
    let sender = seed_account(repo.as_ref(), 1, &format!("{}.00", affordable * 10));
    let receiver = seed_account(repo.as_ref(), 2, "0");

    let service = Arc::new(TransferService::with_max_attempts(repo.clone(), MAX_ATTEMPTS));
    let pending: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            service
                .create_pending(sender.id, receiver.id, amount("10.00"), None)
                .unwrap()
                .id()
        })
        .collect();

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let completed = Arc::new(AtomicUsize::new(0));
    let refused = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = pending
        .iter()
        .map(|&transfer_id| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let completed = Arc::clone(&completed);
            let refused = Arc::clone(&refused);
            let caller = sender.id;

            thread::spawn(move || {
                barrier.wait();
                match service.confirm(transfer_id, caller) {
                    Ok(_) => {
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Error::InsufficientFunds) => {
                        refused.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(completed.load(Ordering::SeqCst), affordable);
    assert_eq!(refused.load(Ordering::SeqCst), THREAD_COUNT - affordable);
    assert_eq!(
        repo.get_account(sender.id).unwrap().unwrap().balance(),
        Amount::ZERO
    );

    let statuses: Vec<_> = pending
        .iter()
        .map(|id| repo.get_transfer(*id).unwrap().unwrap().status())
        .collect();
    assert_eq!(
        statuses.iter().filter(|s| **s == TransferStatus::Failed).count(),
        THREAD_COUNT - affordable
    );
    assert!(statuses.iter().all(|s| s.is_terminal()));
}

#[test]
fn test_competing_withdrawals_never_overdraw_memory() {
    let (repo, _dir) = memory_repo();
    run_competing_withdrawals(repo);
}

#[test]
fn test_competing_withdrawals_never_overdraw_duckdb() {
    let (repo, _dir) = duckdb_repo();
    run_competing_withdrawals(repo);
}

// ============================================================================
// Cross transfers conserve the total
// ============================================================================

fn run_cross_transfers(repo: Arc<dyn LedgerRepository>) {
    const ACCOUNTS: usize = 4;
    let accounts: Vec<Account> = (1..=ACCOUNTS)
        .map(|n| seed_account(repo.as_ref(), n, "50.00"))
        .collect();
    let keys: Vec<String> = accounts.iter().map(|a| a.tax_id.to_string()).collect();
    let total_before = amount("200.00");

    let service = Arc::new(TransferService::with_max_attempts(repo.clone(), MAX_ATTEMPTS));
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let completed = Arc::clone(&completed);
            let sender = accounts[thread_id % ACCOUNTS].id;
            let keys = keys.clone();

            thread::spawn(move || {
                barrier.wait();
                for i in 0..TRANSFERS_PER_THREAD {
                    let receiver = &keys[(thread_id + i + 1) % ACCOUNTS];
                    let cents = ((thread_id * 7 + i * 13) % 900 + 100) as i64;
                    match service.create_direct(sender, receiver, Amount::from_cents(cents), None) {
                        Ok(_) => {
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                        // Self-transfers and empty wallets are expected here
                        Err(Error::InsufficientFunds) | Err(Error::InvalidTransfer(_)) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut total_after = Amount::ZERO;
    for account in &accounts {
        let current = repo.get_account(account.id).unwrap().unwrap();
        assert!(!current.balance().is_negative());
        total_after = total_after.checked_add(current.balance()).unwrap();
    }
    assert_eq!(total_after, total_before);
    assert!(completed.load(Ordering::SeqCst) > 0);

    for account in &accounts {
        for transfer in repo.list_transfers_for(account.id).unwrap() {
            assert_eq!(transfer.status(), TransferStatus::Completed);
            assert!(transfer.snapshot().unwrap().conserves_funds());
        }
    }
}

#[test]
fn test_cross_transfers_conserve_total_memory() {
    let (repo, _dir) = memory_repo();
    run_cross_transfers(repo);
}

#[test]
fn test_cross_transfers_conserve_total_duckdb() {
    let (repo, _dir) = duckdb_repo();
    run_cross_transfers(repo);
}
