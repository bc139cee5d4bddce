//! Upload store types

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::AbortHandle;

// ============================================================================
// Constants
// ============================================================================

/// Maximum hashes held across all live uploads
pub const MAX_TOTAL_HASHES: usize = 100_000_000;

/// Maximum cumulative query hashes per upload before it is destroyed
pub const MAX_QUERIES_PER_UPLOAD: usize = 100_000_000;

/// Upload retention: 24 hours
pub const UPLOAD_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Limits
// ============================================================================

/// Resource limits enforced by the upload store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Cap on the running sum of stored hashes; oldest uploads go first past it
    pub max_total_hashes: usize,

    /// Cap on needles submitted against one upload over its lifetime
    pub max_queries_per_upload: usize,

    /// Time an upload stays queryable after deposit
    pub retention: Duration,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_total_hashes: MAX_TOTAL_HASHES,
            max_queries_per_upload: MAX_QUERIES_PER_UPLOAD,
            retention: UPLOAD_RETENTION,
        }
    }
}

// ============================================================================
// Upload
// ============================================================================

/// A deposited hash set
#[derive(Debug)]
pub struct Upload {
    /// Sorted ascending, immutable once stored
    pub hashes: Arc<[u64]>,

    /// Needles submitted against this upload so far
    pub match_query_count: usize,

    /// Store-wide deposit number; orders the eviction ledger
    pub sequence: u64,

    pub deposited_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    /// Pending retention timer, aborted if the upload leaves early
    pub expiry: Option<AbortHandle>,
}

impl Upload {
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn cancel_expiry(&self) {
        if let Some(expiry) = &self.expiry {
            expiry.abort();
        }
    }
}

/// Result of a successful deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositReceipt {
    pub sequence: u64,
    pub stored: usize,
    pub expires_at: DateTime<Utc>,

    /// Uploads evicted to bring the store back under its cap
    pub evicted: usize,
}

/// Snapshot of store occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub uploads: usize,
    pub total_hashes: usize,
    pub max_total_hashes: usize,
    pub oldest_deposited_at: Option<DateTime<Utc>>,
    pub pending_expiries: usize,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("that name's taken")]
    NameTaken,

    #[error("upload missing")]
    NotFound,

    #[error("upload empty")]
    EmptyUpload,

    #[error("too many matches (max: {max} per upload)")]
    QueryBudgetExceeded { max: usize },
}
