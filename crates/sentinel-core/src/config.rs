//! Engine configuration.

use crate::ledger::DEFAULT_HISTORY_LIMIT;

/// Default priority passed when installing intercept handlers.
pub const DEFAULT_INTERCEPT_PRIORITY: u32 = 0;

/// Default number of intercepted accesses held between drains.
pub const DEFAULT_PENDING_CAPACITY: usize = 4096;

/// Top-level configuration for an [`crate::Engine`] instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EngineConfig {
    /// Access-history capacity.
    pub history_limit: usize,
    /// Whether observed accesses are recorded from the start.
    pub tracking_enabled: bool,
    /// Hardcore mode applied by `initialize`.
    pub hardcore_on_start: bool,
    /// Priority for the installed read and write intercepts.
    pub intercept_priority: u32,
    /// Whether intercepted guest reads are queued and tracked in the ledger.
    ///
    /// Off by default; a frame's reads would otherwise evict every write
    /// record from the history.
    pub track_reads: bool,
    /// Capacity of the intercept queue. Accesses arriving while it is full
    /// are dropped; watches still catch the change on the next tick.
    pub pending_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            tracking_enabled: true,
            hardcore_on_start: false,
            intercept_priority: DEFAULT_INTERCEPT_PRIORITY,
            track_reads: false,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
        }
    }
}
