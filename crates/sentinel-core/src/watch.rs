//! Address-keyed watchpoints with per-tick change detection.

use crate::ledger::{AccessKind, AccessLedger};
use crate::window::{ranges_overlap, validate_range};
use crate::{Followups, MemoryBackend, MemoryPort, MonitorFault};

/// Widths a watch may observe.
pub const WATCH_WIDTHS: [u32; 4] = [1, 2, 4, 8];

/// Value change reported to a watch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct WatchChange {
    /// Watched address.
    pub address: u32,
    /// Watched width in bytes.
    pub size: u32,
    /// Value seen on the previous observation.
    pub old_value: u32,
    /// Freshly read value.
    pub new_value: u32,
}

/// Callback fired when a watched value changes.
pub type WatchCallback = Box<dyn FnMut(WatchChange, &mut Followups) + Send>;

/// One registered watchpoint.
pub struct Watch {
    address: u32,
    size: u32,
    last_value: u32,
    active: bool,
    callback: Option<WatchCallback>,
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("address", &format_args!("{:#010x}", self.address))
            .field("size", &self.size)
            .field("last_value", &self.last_value)
            .field("active", &self.active)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Watch {
    /// Watched address.
    #[must_use]
    pub const fn address(&self) -> u32 {
        self.address
    }

    /// Watched width in bytes.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Last observed value.
    #[must_use]
    pub const fn last_value(&self) -> u32 {
        self.last_value
    }

    /// `false` once a read failure has deactivated the watch.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Re-reads the watched value and fires the callback on change.
    ///
    /// A read failure deactivates the watch and is returned to the caller.
    fn refresh<B: MemoryBackend + ?Sized>(
        &mut self,
        port: &mut MemoryPort<'_, B>,
        followups: &mut Followups,
    ) -> Result<Option<WatchChange>, MonitorFault> {
        let new_value = match port.try_read(self.address, self.size) {
            Ok(value) => value,
            Err(fault) => {
                self.deactivate(port, &fault);
                return Err(fault);
            }
        };

        if new_value == self.last_value {
            return Ok(None);
        }

        let change = WatchChange {
            address: self.address,
            size: self.size,
            old_value: self.last_value,
            new_value,
        };
        self.last_value = new_value;
        if let Some(callback) = self.callback.as_mut() {
            callback(change, followups);
        }
        Ok(Some(change))
    }

    fn deactivate<B: MemoryBackend + ?Sized>(
        &mut self,
        port: &mut MemoryPort<'_, B>,
        fault: &MonitorFault,
    ) {
        tracing::warn!("deactivating watch at {:#010x}: {fault}", self.address);
        self.active = false;
        port.record(fault);
        port.diagnostics().record_deactivation();
    }
}

/// Outcome of one [`WatchTable::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Inactive watches dropped before polling.
    pub pruned: usize,
    /// Callbacks fired.
    pub fired: usize,
    /// Watches deactivated during this tick.
    pub deactivated: usize,
}

/// Set of watchpoints keyed by address.
#[derive(Debug, Default)]
pub struct WatchTable {
    watches: Vec<Watch>,
}

impl WatchTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watch, replacing any existing watch at `address`.
    ///
    /// The value is read once up front and seeds the watch; if that read
    /// fails the watch is not added.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorFault::OutOfBounds`] for invalid ranges (no read is
    /// attempted), [`MonitorFault::Configuration`] for widths outside
    /// [`WATCH_WIDTHS`], and [`MonitorFault::ReadFailure`] when the seed read
    /// fails.
    pub fn add<B: MemoryBackend + ?Sized>(
        &mut self,
        port: &mut MemoryPort<'_, B>,
        address: u32,
        size: u32,
        callback: Option<WatchCallback>,
    ) -> Result<(), MonitorFault> {
        validate_range(address, size)?;
        if !WATCH_WIDTHS.contains(&size) {
            return Err(MonitorFault::Configuration {
                address,
                what: "watch width",
                value: size,
            });
        }

        let last_value = port.try_read(address, size)?;
        let watch = Watch {
            address,
            size,
            last_value,
            active: true,
            callback,
        };

        match self.watches.iter_mut().find(|w| w.address == address) {
            Some(existing) => *existing = watch,
            None => self.watches.push(watch),
        }
        Ok(())
    }

    /// Removes the watch at `address`; returns whether one existed.
    pub fn remove(&mut self, address: u32) -> bool {
        let before = self.watches.len();
        self.watches.retain(|w| w.address != address);
        self.watches.len() != before
    }

    /// Removes every watch.
    pub fn clear(&mut self) {
        self.watches.clear();
    }

    /// Number of registered watches, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Returns `true` when no watches are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Looks up the watch at `address`.
    #[must_use]
    pub fn get(&self, address: u32) -> Option<&Watch> {
        self.watches.iter().find(|w| w.address == address)
    }

    /// Iterates registered watches in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Watch> + '_ {
        self.watches.iter()
    }

    /// Re-evaluates every active watch overlapping a write to
    /// `[address, address + size)`.
    ///
    /// Each watch re-reads its own address and width; the written value is
    /// never trusted. Returns the number of callbacks fired.
    pub fn on_write_observed<B: MemoryBackend + ?Sized>(
        &mut self,
        port: &mut MemoryPort<'_, B>,
        address: u32,
        size: u32,
        followups: &mut Followups,
    ) -> usize {
        let mut fired = 0;
        for watch in &mut self.watches {
            if !watch.active || !ranges_overlap(watch.address, watch.size, address, size) {
                continue;
            }
            if let Ok(Some(_)) = watch.refresh(port, followups) {
                fired += 1;
            }
        }
        fired
    }

    /// Per-frame poll.
    ///
    /// Drops watches deactivated earlier, then re-validates and re-reads each
    /// remaining watch. Changes fire the callback and are tracked as writes in
    /// `ledger`. A failing watch is deactivated without affecting the others.
    pub fn tick<B: MemoryBackend + ?Sized>(
        &mut self,
        port: &mut MemoryPort<'_, B>,
        ledger: &mut AccessLedger,
        followups: &mut Followups,
    ) -> TickReport {
        let mut report = TickReport::default();

        let before = self.watches.len();
        self.watches.retain(|w| w.active);
        report.pruned = before - self.watches.len();
        if report.pruned > 0 {
            tracing::debug!("pruned {} inactive watch(es)", report.pruned);
        }

        for watch in &mut self.watches {
            if let Err(fault) = validate_range(watch.address, watch.size) {
                watch.deactivate(port, &fault);
                report.deactivated += 1;
                continue;
            }

            match watch.refresh(port, followups) {
                Ok(Some(change)) => {
                    report.fired += 1;
                    ledger.track_access(
                        change.address,
                        change.size,
                        change.new_value,
                        AccessKind::Write,
                    );
                }
                Ok(None) => {}
                Err(_) => report.deactivated += 1,
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{WatchCallback, WatchChange, WatchTable};
    use crate::ledger::{AccessLedger, ManualClock};
    use crate::{Diagnostics, Followups, MemoryPort, MonitorFault, RamBackend, SCRATCH_START};

    type Seen = Arc<Mutex<Vec<WatchChange>>>;

    fn recorder() -> (Seen, WatchCallback) {
        let seen: Seen = Arc::default();
        let sink = Arc::clone(&seen);
        let callback: WatchCallback = Box::new(move |change, _| {
            sink.lock().expect("watch sink").push(change);
        });
        (seen, callback)
    }

    fn ledger() -> AccessLedger {
        AccessLedger::with_clock(Box::new(ManualClock::starting_at(0)))
    }

    #[test]
    fn tick_fires_once_per_change() {
        let mut ram = RamBackend::new();
        let mut diag = Diagnostics::new();
        let mut table = WatchTable::new();
        let mut ledger = ledger();
        let mut followups = Followups::new();
        let (seen, callback) = recorder();

        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            assert!(table.add(&mut port, 0x1000, 4, Some(callback)).is_ok());
            assert_eq!(table.tick(&mut port, &mut ledger, &mut followups).fired, 0);
        }

        ram.set_word(0x1000, 0x1234_5678);
        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            let report = table.tick(&mut port, &mut ledger, &mut followups);
            assert_eq!(report.fired, 1);
            assert_eq!(table.tick(&mut port, &mut ledger, &mut followups).fired, 0);
        }

        let seen = seen.lock().expect("watch sink");
        assert_eq!(
            *seen,
            vec![WatchChange {
                address: 0x1000,
                size: 4,
                old_value: 0,
                new_value: 0x1234_5678,
            }]
        );
        assert_eq!(ledger.access_count(0x1000, 4), 1);
    }

    #[test]
    fn adding_at_same_address_replaces() {
        let mut ram = RamBackend::new();
        ram.set_word(0x1000, 0xAABB_CCDD);
        let mut diag = Diagnostics::new();
        let mut port = MemoryPort::new(&mut ram, &mut diag);
        let mut table = WatchTable::new();

        assert!(table.add(&mut port, 0x1000, 4, None).is_ok());
        assert!(table.add(&mut port, 0x1000, 1, None).is_ok());
        assert_eq!(table.len(), 1);
        let watch = table.get(0x1000).expect("watch present");
        assert_eq!(watch.size(), 1);
        assert_eq!(watch.last_value(), 0xDD);
    }

    #[test]
    fn wrapping_range_is_rejected_without_reading() {
        let mut ram = RamBackend::new();
        let mut diag = Diagnostics::new();
        let mut table = WatchTable::new();
        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            assert!(matches!(
                table.add(&mut port, 0xFFFF_FFF0, 0x20, None),
                Err(MonitorFault::OutOfBounds { .. })
            ));
            assert!(matches!(
                table.add(&mut port, 0x1000, 3, None),
                Err(MonitorFault::Configuration { value: 3, .. })
            ));
        }
        assert!(table.is_empty());
        assert_eq!(ram.raw_reads(), 0);
    }

    #[test]
    fn failing_seed_read_refuses_the_watch() {
        let mut ram = RamBackend::new();
        ram.fail_reads_at(SCRATCH_START);
        let mut diag = Diagnostics::new();
        let mut port = MemoryPort::new(&mut ram, &mut diag);
        let mut table = WatchTable::new();
        assert!(matches!(
            table.add(&mut port, SCRATCH_START, 4, None),
            Err(MonitorFault::ReadFailure { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn read_failure_deactivates_only_that_watch_and_is_pruned_next_tick() {
        let mut ram = RamBackend::new();
        let mut diag = Diagnostics::new();
        let mut table = WatchTable::new();
        let mut ledger = ledger();
        let mut followups = Followups::new();
        let (seen, callback) = recorder();

        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            assert!(table.add(&mut port, 0x100, 4, None).is_ok());
            assert!(table.add(&mut port, 0x200, 4, Some(callback)).is_ok());
        }
        ram.fail_reads_at(0x100);
        ram.set_word(0x200, 9);

        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            let report = table.tick(&mut port, &mut ledger, &mut followups);
            assert_eq!(report.deactivated, 1);
            assert_eq!(report.fired, 1);
            assert!(!table.get(0x100).expect("still listed").is_active());

            let report = table.tick(&mut port, &mut ledger, &mut followups);
            assert_eq!(report.pruned, 1);
        }

        assert_eq!(table.len(), 1);
        assert_eq!(seen.lock().expect("watch sink").len(), 1);
        assert_eq!(diag.deactivated_watches, 1);
        assert_eq!(diag.fault_count_read, 1);
    }

    #[test]
    fn write_notifications_reread_the_watch_width() {
        let mut ram = RamBackend::new();
        let mut diag = Diagnostics::new();
        let mut table = WatchTable::new();
        let mut followups = Followups::new();
        let (seen, callback) = recorder();

        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            assert!(table.add(&mut port, 0x3000, 2, Some(callback)).is_ok());
        }
        ram.set_word(0x3000, 0xDEAD_BEEF);
        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            assert_eq!(table.on_write_observed(&mut port, 0x3004, 4, &mut followups), 0);
            assert_eq!(table.on_write_observed(&mut port, 0x3001, 1, &mut followups), 1);
            assert_eq!(table.on_write_observed(&mut port, 0x3000, 4, &mut followups), 0);
        }

        let seen = seen.lock().expect("watch sink");
        assert_eq!(seen[0].new_value, 0xBEEF);
    }

    #[test]
    fn remove_and_clear() {
        let mut ram = RamBackend::new();
        let mut diag = Diagnostics::new();
        let mut port = MemoryPort::new(&mut ram, &mut diag);
        let mut table = WatchTable::new();
        assert!(table.add(&mut port, 0x10, 1, None).is_ok());
        assert!(table.add(&mut port, 0x20, 8, None).is_ok());

        assert!(table.remove(0x10));
        assert!(!table.remove(0x10));
        assert_eq!(table.iter().count(), 1);
        table.clear();
        assert!(table.is_empty());
    }
}
