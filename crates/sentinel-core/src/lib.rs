//! Memory observation and protection engine for achievement runtimes.
//!
//! The engine watches an emulated machine's address space for value changes,
//! evaluates comparison conditions, keeps a bounded access history and gates
//! save states while hardcore mode is on. It owns nothing but its tables: the
//! backing store is supplied through [`MemoryBackend`].

/// Legal address windows and range validation.
pub mod window;
pub use window::{
    ranges_overlap, validate_range, window_of, AddressWindow, LEGAL_WINDOWS, RAM_SIZE, RAM_START,
    SCRATCH_SIZE, SCRATCH_START,
};

/// Fault taxonomy.
pub mod fault;
pub use fault::{BackendError, FaultClass, MonitorFault};

/// Fault and deactivation counters.
pub mod diag;
pub use diag::Diagnostics;

/// Save-state header record and archive-reader contract.
pub mod savestate;
pub use savestate::{
    ArchiveReader, MemoryArchive, SaveStateHeader, SaveStateRejection, SaveStateVersion,
    FEATURE_MAIN_RAM, FEATURE_SCRATCHPAD, SAVE_STATE_HEADER_BYTES, SAVE_STATE_HEADER_ENTRY,
    SAVE_STATE_MAGIC, SUPPORTED_FEATURES,
};

/// Contract consumed from the backing emulated-memory subsystem.
pub mod backend;
pub use backend::{AccessHandler, MemoryBackend};

/// Reference in-memory backing store.
pub mod ram;
pub use ram::RamBackend;

/// Bounds-checked read port.
pub mod port;
pub use port::MemoryPort;

/// Deferred follow-up commands.
pub mod command;
pub use command::{EngineCommand, Followups};

/// Watchpoints and change detection.
pub mod watch;
pub use watch::{TickReport, Watch, WatchCallback, WatchChange, WatchTable, WATCH_WIDTHS};

/// Comparison conditions.
pub mod validation;
pub use validation::{ConditionKind, ValidationCallback, ValidationCondition, ValidationEngine};

/// Bounded access history.
pub mod ledger;
pub use ledger::{
    AccessCallback, AccessKind, AccessLedger, AccessRecord, Clock, ManualClock, SystemClock,
    DEFAULT_HISTORY_LIMIT,
};

/// Protected address ranges.
pub mod protection;
pub use protection::{ProtectedRegion, ProtectionGuard};

/// Hardcore mode coordination and the save-state gate.
pub mod hardcore;
pub use hardcore::{HardcoreCoordinator, ModeObserver, StateOperation};

/// Engine configuration.
pub mod config;
pub use config::{EngineConfig, DEFAULT_INTERCEPT_PRIORITY, DEFAULT_PENDING_CAPACITY};

/// The owned engine.
pub mod engine;
pub use engine::{Engine, ObservedAccess};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
