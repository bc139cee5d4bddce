//! Upload Store
//!
//! Holds deposited hash sets with:
//! - One mutex over the name map, the eviction ledger and the running total
//! - Oldest-first eviction once the total stored hash count passes its cap
//! - A one-shot expiry timer per deposit, cancelled when the upload goes early
//! - A per-upload query budget; exceeding it destroys the upload

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::AbortHandle;

use super::types::{DepositReceipt, StoreError, StoreLimits, StoreStats, Upload};
use crate::matching::match_mask;

// ============================================================================
// Upload Store
// ============================================================================

/// Process-wide store of deposited uploads
#[derive(Clone)]
pub struct UploadStore {
    inner: Arc<UploadStoreInner>,
}

struct UploadStoreInner {
    state: Mutex<StoreState>,
    limits: StoreLimits,

    /// Expiry tasks that have not yet finished or been cancelled
    pending_expiries: Arc<AtomicUsize>,
}

#[derive(Default)]
struct StoreState {
    /// Live uploads indexed by name
    uploads: HashMap<String, Upload>,

    /// Names in deposit order, keyed by deposit sequence
    ledger: BTreeMap<u64, String>,

    /// Sum of stored hashes over all live uploads
    total_hashes: usize,

    next_sequence: u64,
}

impl StoreState {
    /// Remove an upload from both the map and the ledger. No-op if absent.
    fn remove(&mut self, name: &str) -> Option<Upload> {
        let upload = self.uploads.remove(name)?;
        self.ledger.remove(&upload.sequence);
        self.total_hashes -= upload.len();
        upload.cancel_expiry();
        Some(upload)
    }

    /// Drop the oldest uploads until the total is within `max_total`
    fn evict(&mut self, max_total: usize) -> usize {
        let mut evicted = 0;
        while self.total_hashes > max_total {
            let Some((_, name)) = self.ledger.pop_first() else {
                break;
            };
            if let Some(upload) = self.uploads.remove(&name) {
                self.total_hashes -= upload.len();
                upload.cancel_expiry();
                evicted += 1;
                tracing::info!(
                    sequence = upload.sequence,
                    hashes = upload.len(),
                    deposited_at = %upload.deposited_at,
                    total_hashes = self.total_hashes,
                    "Evicted oldest upload"
                );
            }
        }
        evicted
    }
}

/// Counts a live expiry task; dropped when the task ends or is aborted
struct PendingExpiry(Arc<AtomicUsize>);

impl PendingExpiry {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingExpiry {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl UploadStore {
    /// Create a store with the default limits
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    /// Create a store with custom limits
    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            inner: Arc::new(UploadStoreInner {
                state: Mutex::new(StoreState::default()),
                limits,
                pending_expiries: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    pub fn limits(&self) -> &StoreLimits {
        &self.inner.limits
    }

    // ========================================================================
    // Deposit
    // ========================================================================

    /// Store `hashes` under `name`, once
    ///
    /// Fails with [`StoreError::NameTaken`] while an upload with that name is
    /// live. On success the upload is sorted, appended to the eviction ledger,
    /// eviction runs, and, if the upload survived eviction, its expiry timer
    /// is armed.
    pub fn deposit(&self, name: &str, mut hashes: Vec<u64>) -> Result<DepositReceipt, StoreError> {
        // Sort before taking the lock; a rejected deposit just drops the work
        hashes.sort_unstable();

        let limits = self.inner.limits;
        let mut state = self.inner.state.lock();
        if state.uploads.contains_key(name) {
            return Err(StoreError::NameTaken);
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let deposited_at = Utc::now();
        let expires_at = chrono::Duration::from_std(limits.retention)
            .ok()
            .and_then(|retention| deposited_at.checked_add_signed(retention))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let stored = hashes.len();

        state.uploads.insert(
            name.to_string(),
            Upload {
                hashes: hashes.into(),
                match_query_count: 0,
                sequence,
                deposited_at,
                expires_at,
                expiry: None,
            },
        );
        state.ledger.insert(sequence, name.to_string());
        state.total_hashes += stored;

        let evicted = state.evict(limits.max_total_hashes);

        // Spawning does not block, so the timer is attached under the lock
        if let Some(upload) = state.uploads.get_mut(name) {
            upload.expiry = self.schedule_expiry(name.to_string(), sequence);
        }

        Ok(DepositReceipt {
            sequence,
            stored,
            expires_at,
            evicted,
        })
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// Match `needles` against the upload stored under `name`
    ///
    /// Charges `needles.len()` to the upload's query budget first. If that
    /// pushes it over the limit the upload is destroyed and the call fails
    /// with [`StoreError::QueryBudgetExceeded`].
    pub fn query(&self, name: &str, needles: &[u64]) -> Result<Vec<u8>, StoreError> {
        let max = self.inner.limits.max_queries_per_upload;

        let haystack = {
            let mut state = self.inner.state.lock();
            let (count, haystack) = {
                let upload = state.uploads.get_mut(name).ok_or(StoreError::NotFound)?;
                upload.match_query_count = upload.match_query_count.saturating_add(needles.len());
                (upload.match_query_count, Arc::clone(&upload.hashes))
            };

            if count > max {
                state.remove(name);
                tracing::warn!(
                    match_query_count = count,
                    max_queries = max,
                    "Query budget exceeded, upload destroyed"
                );
                return Err(StoreError::QueryBudgetExceeded { max });
            }

            haystack
        };

        Ok(match_mask(&haystack, needles))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Number of hashes stored under `name`, if it is live
    pub fn stored_len(&self, name: &str) -> Option<usize> {
        self.inner.state.lock().uploads.get(name).map(Upload::len)
    }

    /// Current occupancy
    pub fn stats(&self) -> StoreStats {
        let state = self.inner.state.lock();
        let oldest_deposited_at = state
            .ledger
            .first_key_value()
            .and_then(|(_, name)| state.uploads.get(name))
            .map(|upload| upload.deposited_at);

        StoreStats {
            uploads: state.uploads.len(),
            total_hashes: state.total_hashes,
            max_total_hashes: self.inner.limits.max_total_hashes,
            oldest_deposited_at,
            pending_expiries: self.inner.pending_expiries.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Remove `name` if it still refers to deposit `sequence`
    fn expire(&self, name: &str, sequence: u64) -> bool {
        let mut state = self.inner.state.lock();
        if state.uploads.get(name).map(|u| u.sequence) != Some(sequence) {
            return false;
        }
        state.remove(name).is_some()
    }

    /// Spawn the one-shot retention timer for a deposit
    fn schedule_expiry(&self, name: String, sequence: u64) -> Option<AbortHandle> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sequence, "No async runtime, upload will not expire");
            return None;
        };

        let store: Weak<UploadStoreInner> = Arc::downgrade(&self.inner);
        let retention = self.inner.limits.retention;
        let pending = PendingExpiry::new(&self.inner.pending_expiries);

        let task = runtime.spawn(async move {
            let _pending = pending;
            tokio::time::sleep(retention).await;

            let Some(inner) = store.upgrade() else {
                return;
            };
            if (UploadStore { inner }).expire(&name, sequence) {
                tracing::info!(sequence, "Upload expired");
            }
        });

        Some(task.abort_handle())
    }
}

impl Default for UploadStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn small_store(max_total_hashes: usize, max_queries_per_upload: usize) -> UploadStore {
        UploadStore::with_limits(StoreLimits {
            max_total_hashes,
            max_queries_per_upload,
            ..StoreLimits::default()
        })
    }

    #[tokio::test]
    async fn test_deposit_and_query() {
        let store = UploadStore::new();

        let receipt = store.deposit("list", vec![5, 1, 3]).unwrap();
        assert_eq!(receipt.stored, 3);
        assert_eq!(receipt.evicted, 0);

        let mask = store.query("list", &[1, 2, 3]).unwrap();
        assert_eq!(mask, vec![0b1010_0000]);
    }

    #[tokio::test]
    async fn test_name_taken_keeps_first_upload() {
        let store = UploadStore::new();
        store.deposit("list", vec![10, 20]).unwrap();

        let result = store.deposit("list", vec![30, 40, 50]);
        assert_eq!(result, Err(StoreError::NameTaken));

        assert_eq!(store.stored_len("list"), Some(2));
        assert_eq!(store.query("list", &[10, 30]).unwrap(), vec![0b1000_0000]);
        assert_eq!(store.stats().total_hashes, 2);
    }

    #[tokio::test]
    async fn test_query_unknown_name() {
        let store = UploadStore::new();
        assert_eq!(store.query("nobody", &[1]), Err(StoreError::NotFound));
        assert_eq!(store.stored_len("nobody"), None);
    }

    #[tokio::test]
    async fn test_eviction_removes_oldest_first() {
        let store = small_store(10, 1000);

        store.deposit("first", vec![1, 2, 3, 4]).unwrap();
        store.deposit("second", vec![5, 6, 7, 8]).unwrap();
        let receipt = store.deposit("third", vec![9, 10, 11, 12]).unwrap();

        assert_eq!(receipt.evicted, 1);
        assert_eq!(store.query("first", &[1]), Err(StoreError::NotFound));
        assert_eq!(store.query("second", &[5]).unwrap(), vec![0x80]);
        assert_eq!(store.query("third", &[12]).unwrap(), vec![0x80]);

        let stats = store.stats();
        assert_eq!(stats.uploads, 2);
        assert_eq!(stats.total_hashes, 8);
    }

    #[tokio::test]
    async fn test_eviction_tracks_sum_of_all_uploads() {
        let store = small_store(10, 1000);

        // A large upload followed by small ones: the total, not the size of any
        // single upload, must drive eviction.
        store.deposit("big", vec![1; 8]).unwrap();
        store.deposit("a", vec![2]).unwrap();
        store.deposit("b", vec![3]).unwrap();
        assert_eq!(store.stats().total_hashes, 10);

        let receipt = store.deposit("c", vec![4]).unwrap();
        assert_eq!(receipt.evicted, 1);
        assert_eq!(store.stored_len("big"), None);
        assert_eq!(store.stats().total_hashes, 3);
    }

    #[tokio::test]
    async fn test_oversized_upload_evicts_everything() {
        let store = small_store(4, 1000);
        store.deposit("small", vec![1, 2]).unwrap();

        let receipt = store.deposit("huge", vec![1, 2, 3, 4, 5]).unwrap();
        assert_eq!(receipt.evicted, 2);
        assert_eq!(store.stats().uploads, 0);
        assert_eq!(store.stats().total_hashes, 0);

        // The name is free again
        store.deposit("huge", vec![1]).unwrap();
    }

    #[tokio::test]
    async fn test_query_budget() {
        let store = small_store(1000, 10);
        store.deposit("list", vec![1, 2, 3]).unwrap();

        store.query("list", &[1; 6]).unwrap();
        store.query("list", &[1; 4]).unwrap();

        assert_eq!(
            store.query("list", &[1]),
            Err(StoreError::QueryBudgetExceeded { max: 10 })
        );
        assert_eq!(store.query("list", &[1]), Err(StoreError::NotFound));
        assert_eq!(store.stats().uploads, 0);
        assert_eq!(store.stats().total_hashes, 0);
    }

    #[tokio::test]
    async fn test_budget_removal_frees_ledger_slot() {
        let store = small_store(4, 1);
        store.deposit("old", vec![1, 2]).unwrap();
        assert!(store.query("old", &[1, 2]).is_err());

        store.deposit("old", vec![1, 2, 3]).unwrap();
        store.deposit("new", vec![4]).unwrap();
        assert_eq!(store.stored_len("old"), Some(3));
        assert_eq!(store.stored_len("new"), Some(1));
    }

    #[tokio::test]
    async fn test_stale_expiry_ignores_redeposit() {
        let store = small_store(1000, 1);
        let first = store.deposit("list", vec![1]).unwrap();
        assert!(store.query("list", &[1, 1]).is_err());

        let second = store.deposit("list", vec![2]).unwrap();
        assert!(!store.expire("list", first.sequence));
        assert_eq!(store.stored_len("list"), Some(1));

        assert!(store.expire("list", second.sequence));
        assert!(!store.expire("list", second.sequence));
        assert_eq!(store.stored_len("list"), None);
    }

    #[tokio::test]
    async fn test_early_removal_cancels_expiry_timers() {
        let store = small_store(4, 2);

        store.deposit("kept", vec![1]).unwrap();
        store.deposit("penalized", vec![2]).unwrap();
        assert_eq!(store.stats().pending_expiries, 2);

        // Budget penalty
        assert!(store.query("penalized", &[1, 2, 3]).is_err());
        // Evicts "kept", then itself; no timer is armed for it
        let receipt = store.deposit("oversized", vec![1, 2, 3, 4, 5]).unwrap();
        assert_eq!(receipt.evicted, 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.stats().uploads, 0);
        assert_eq!(store.stats().pending_expiries, 0);
    }

    #[tokio::test]
    async fn test_stats_report_oldest_deposit() {
        let store = small_store(3, 1000);
        assert_eq!(store.stats().oldest_deposited_at, None);

        store.deposit("first", vec![1, 2]).unwrap();
        let first_at = store.stats().oldest_deposited_at.unwrap();
        store.deposit("second", vec![3]).unwrap();
        assert_eq!(store.stats().oldest_deposited_at, Some(first_at));

        store.deposit("third", vec![4]).unwrap();
        let oldest = store.stats().oldest_deposited_at.unwrap();
        assert!(oldest >= first_at);
        assert_eq!(store.stored_len("first"), None);
    }

    #[tokio::test]
    async fn test_expiry_timer() {
        let store = UploadStore::with_limits(StoreLimits {
            retention: Duration::from_millis(20),
            ..StoreLimits::default()
        });
        store.deposit("list", vec![1, 2, 3]).unwrap();
        assert_eq!(store.stored_len("list"), Some(3));

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.query("list", &[1]), Err(StoreError::NotFound));
        assert_eq!(store.stats().total_hashes, 0);
        assert_eq!(store.stats().pending_expiries, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deposits_same_name() {
        let store = UploadStore::new();

        let tasks: Vec<_> = (0..16u64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.deposit("contested", vec![i]) })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.stats().uploads, 1);
        assert_eq!(store.stats().total_hashes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deposits_respect_cap() {
        let store = small_store(50, 1000);

        let tasks: Vec<_> = (0..40u64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.deposit(&format!("list-{}", i), vec![i; 5]) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.total_hashes, 50);
        assert_eq!(stats.uploads, 10);
    }
}
