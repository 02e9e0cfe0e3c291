//! Bounded, newest-first history of observed memory accesses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::window::{ranges_overlap, validate_range};

/// Default number of records kept before the oldest are evicted.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Direction of an observed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessKind {
    /// Value was read.
    Read,
    /// Value was written.
    Write,
}

/// One observed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AccessRecord {
    /// Start address of the access.
    pub address: u32,
    /// Width in bytes.
    pub size: u32,
    /// Value read or written.
    pub value: u32,
    /// Read or write.
    pub kind: AccessKind,
    /// Clock reading when the access was tracked.
    pub timestamp: u64,
}

impl AccessRecord {
    /// Returns `true` when this record touches `[address, address + size)`.
    #[must_use]
    pub const fn overlaps(&self, address: u32, size: u32) -> bool {
        ranges_overlap(self.address, self.size, address, size)
    }
}

/// Time source for access timestamps.
pub trait Clock: Send {
    /// Current time in the clock's unit.
    fn now(&self) -> u64;
}

/// Wall clock in whole seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }
}

/// Manually advanced clock; clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    /// Creates a clock reading `start`.
    #[must_use]
    pub fn starting_at(start: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start)))
    }

    /// Sets the current reading.
    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Moves the reading forward by `delta`.
    pub fn advance(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observer invoked with every newly tracked record.
pub type AccessCallback = Box<dyn FnMut(&AccessRecord) + Send>;

/// Capacity-bounded access history.
///
/// Records are stored newest-first with non-decreasing timestamps from back to
/// front, which lets recency queries stop at the first record that is too old.
pub struct AccessLedger {
    history: VecDeque<AccessRecord>,
    callbacks: Vec<AccessCallback>,
    limit: usize,
    tracking: bool,
    clock: Box<dyn Clock>,
}

impl Default for AccessLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AccessLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLedger")
            .field("records", &self.history.len())
            .field("callbacks", &self.callbacks.len())
            .field("limit", &self.limit)
            .field("tracking", &self.tracking)
            .finish_non_exhaustive()
    }
}

impl AccessLedger {
    /// Creates a ledger timestamped by the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    /// Creates a ledger timestamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            history: VecDeque::new(),
            callbacks: Vec::new(),
            limit: DEFAULT_HISTORY_LIMIT,
            tracking: true,
            clock,
        }
    }

    /// Records an access, evicts the oldest records beyond the limit, then
    /// notifies every callback.
    ///
    /// Ignored while tracking is disabled or when the range is invalid.
    pub fn track_access(&mut self, address: u32, size: u32, value: u32, kind: AccessKind) {
        if !self.tracking {
            return;
        }
        if let Err(fault) = validate_range(address, size) {
            tracing::warn!("access not tracked: {fault}");
            return;
        }

        let now = self.clock.now();
        let timestamp = self
            .history
            .front()
            .map_or(now, |newest| now.max(newest.timestamp));
        let record = AccessRecord {
            address,
            size,
            value,
            kind,
            timestamp,
        };

        self.history.push_front(record);
        self.trim();

        for callback in &mut self.callbacks {
            callback(&record);
        }

        tracing::trace!(
            "{kind:?} access at {address:#010x}, size {size}, value {value:#010x}"
        );
    }

    /// Drops every record.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Returns `true` when a record no older than `window` overlaps the range.
    #[must_use]
    pub fn has_recent_access(&self, address: u32, size: u32, window: u64) -> bool {
        let now = self.clock.now();
        for record in &self.history {
            if now.saturating_sub(record.timestamp) > window {
                break;
            }
            if record.overlaps(address, size) {
                return true;
            }
        }
        false
    }

    /// Counts records overlapping the range, regardless of age.
    #[must_use]
    pub fn access_count(&self, address: u32, size: u32) -> usize {
        self.history
            .iter()
            .filter(|record| record.overlaps(address, size))
            .count()
    }

    /// Registers an observer for new records.
    pub fn add_callback(&mut self, callback: AccessCallback) {
        self.callbacks.push(callback);
    }

    /// Removes every observer.
    pub fn remove_all_callbacks(&mut self) {
        self.callbacks.clear();
    }

    /// Changes the capacity and evicts immediately if over it.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.limit = limit;
        self.trim();
    }

    /// Current capacity.
    #[must_use]
    pub const fn history_limit(&self) -> usize {
        self.limit
    }

    /// Switches tracking on or off; switching off also clears the history.
    pub fn enable_tracking(&mut self, enable: bool) {
        self.tracking = enable;
        if !enable {
            self.clear_history();
        }
    }

    /// Returns `true` while accesses are being recorded.
    #[must_use]
    pub const fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Records newest-first.
    pub fn records(&self) -> impl Iterator<Item = &AccessRecord> + '_ {
        self.history.iter()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns `true` when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    fn trim(&mut self) {
        self.history.truncate(self.limit);
    }
}
