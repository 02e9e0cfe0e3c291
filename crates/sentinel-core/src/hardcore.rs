//! Hardcore mode: protection state transitions, the save-state gate and
//! mode-change fan-out.

use crate::protection::{ProtectedRegion, ProtectionGuard};
use crate::savestate::{ArchiveReader, SaveStateHeader};
use crate::{Followups, MemoryBackend, MonitorFault};

/// Observer told about hardcore toggles and achievement disablement.
pub type ModeObserver = Box<dyn FnMut(bool, &mut Followups) + Send>;

/// Kind of save-state operation being gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StateOperation {
    /// Creating a save state; only the magic is checked.
    Save,
    /// Restoring a save state; version and features are checked as well.
    Load,
}

impl StateOperation {
    /// Lower-case name used in log lines.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Load => "load",
        }
    }
}

/// Owns the [`ProtectionGuard`] and decides what hardcore mode permits.
pub struct HardcoreCoordinator {
    guard: ProtectionGuard,
    observers: Vec<ModeObserver>,
    achievements_enabled: bool,
}

impl Default for HardcoreCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HardcoreCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardcoreCoordinator")
            .field("guard", &self.guard)
            .field("observers", &self.observers.len())
            .field("achievements_enabled", &self.achievements_enabled)
            .finish()
    }
}

impl HardcoreCoordinator {
    /// Starts with hardcore off and achievements on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            guard: ProtectionGuard::new(),
            observers: Vec::new(),
            achievements_enabled: true,
        }
    }

    /// Current hardcore flag.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.guard.is_enabled()
    }

    /// Switches hardcore mode.
    ///
    /// A no-op when the flag is unchanged. Otherwise pushes the new state into
    /// the backend's protection switch and notifies every observer. Returns
    /// whether the flag changed.
    pub fn set_enabled<B: MemoryBackend + ?Sized>(
        &mut self,
        enabled: bool,
        backend: &mut B,
        followups: &mut Followups,
    ) -> bool {
        if self.guard.is_enabled() == enabled {
            return false;
        }

        self.guard.set_enabled(enabled);
        backend.set_protection_enabled(enabled);
        tracing::info!(
            "hardcore mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.notify(enabled, followups);
        true
    }

    /// Registers a mode-change observer.
    pub fn add_observer(&mut self, observer: ModeObserver) {
        self.observers.push(observer);
    }

    /// Removes every observer.
    pub fn remove_all_observers(&mut self) {
        self.observers.clear();
    }

    /// Adds a protected region, evicting any it intersects.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorFault::OutOfBounds`] for ranges outside the legal
    /// windows.
    pub fn add_protected_region(&mut self, start: u32, size: u32) -> Result<(), MonitorFault> {
        let evicted = self.guard.add_region(start, size)?;
        tracing::debug!(
            "protected region {start:#010x}..{:#010x} added, {evicted} evicted",
            u64::from(start) + u64::from(size)
        );
        Ok(())
    }

    /// Removes every protected region.
    pub fn clear_protected_regions(&mut self) {
        self.guard.clear();
        tracing::debug!("cleared all protected regions");
    }

    /// `true` while hardcore is on and `address` lies in a protected region.
    #[must_use]
    pub fn is_address_protected(&self, address: u32) -> bool {
        self.guard.is_protected(address)
    }

    /// The underlying region set.
    #[must_use]
    pub const fn guard(&self) -> &ProtectionGuard {
        &self.guard
    }

    /// Permits `operation` only outside hardcore mode.
    #[must_use]
    pub fn validate_save_state_operation(&self, operation: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }
        tracing::warn!("save state {operation} blocked in hardcore mode");
        false
    }

    /// Inspects the archive header for `operation`.
    ///
    /// Always succeeds outside hardcore mode. In hardcore mode the header is
    /// read and its magic verified; loads additionally require a compatible
    /// version and feature set.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorFault::HeaderInvalid`] describing why the header was
    /// rejected.
    pub fn inspect_save_state<A: ArchiveReader + ?Sized>(
        &self,
        archive: &mut A,
        operation: StateOperation,
    ) -> Result<(), MonitorFault> {
        if !self.is_enabled() {
            return Ok(());
        }

        let header = SaveStateHeader::from_archive(archive)?;
        header.check_magic()?;
        if operation == StateOperation::Load {
            header.check_compatible()?;
        }
        Ok(())
    }

    /// Whether a save state may be created from `archive`; failures are
    /// logged and count as denial.
    pub fn check_save_state_allowed<A: ArchiveReader + ?Sized>(&self, archive: &mut A) -> bool {
        self.gate(archive, StateOperation::Save)
    }

    /// Whether the save state in `archive` may be loaded; failures are logged
    /// and count as denial.
    pub fn check_load_state_allowed<A: ArchiveReader + ?Sized>(&self, archive: &mut A) -> bool {
        self.gate(archive, StateOperation::Load)
    }

    fn gate<A: ArchiveReader + ?Sized>(&self, archive: &mut A, operation: StateOperation) -> bool {
        match self.inspect_save_state(archive, operation) {
            Ok(()) => true,
            Err(fault) => {
                tracing::warn!("save state {} denied: {fault}", operation.name());
                false
            }
        }
    }

    /// Asks the backend to validate every protected region, stopping at the
    /// first failure. Always `true` outside hardcore mode.
    pub fn validate_memory_state<B: MemoryBackend + ?Sized>(&self, backend: &mut B) -> bool {
        if !self.is_enabled() {
            return true;
        }
        self.guard.regions().iter().all(|region| {
            let ok = validate_region(backend, region);
            if !ok {
                tracing::warn!(
                    "protected region {:#010x}+{:#x} failed validation",
                    region.start,
                    region.size
                );
            }
            ok
        })
    }

    /// Memory validation plus any further system checks.
    pub fn validate_system_state<B: MemoryBackend + ?Sized>(&self, backend: &mut B) -> bool {
        if !self.is_enabled() {
            return true;
        }
        self.validate_memory_state(backend)
    }

    /// Save states are allowed exactly when hardcore is off.
    #[must_use]
    pub const fn save_state_allowed(&self) -> bool {
        !self.is_enabled()
    }

    /// Whether achievements may still unlock this session.
    #[must_use]
    pub const fn achievements_enabled(&self) -> bool {
        self.achievements_enabled
    }

    /// Called after a save state was written. In hardcore mode this disables
    /// achievements; returns whether it did.
    pub fn on_save_state_created(&mut self, followups: &mut Followups) -> bool {
        self.disable_if_hardcore(followups)
    }

    /// Called after a save state was restored. In hardcore mode this disables
    /// achievements; returns whether it did.
    pub fn on_save_state_loaded(&mut self, followups: &mut Followups) -> bool {
        self.disable_if_hardcore(followups)
    }

    /// Disables achievements and tells every observer.
    pub fn disable_achievements(&mut self, followups: &mut Followups) {
        self.achievements_enabled = false;
        tracing::info!("achievements disabled for this session");
        self.notify(false, followups);
    }

    /// Re-enables achievements; the hardcore flag is kept.
    pub fn reset(&mut self) {
        self.achievements_enabled = true;
    }

    fn disable_if_hardcore(&mut self, followups: &mut Followups) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.disable_achievements(followups);
        true
    }

    fn notify(&mut self, enabled: bool, followups: &mut Followups) {
        for observer in &mut self.observers {
            observer(enabled, followups);
        }
    }
}

fn validate_region<B: MemoryBackend + ?Sized>(backend: &mut B, region: &ProtectedRegion) -> bool {
    backend.validate_range(region.start, region.start.saturating_add(region.size))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;

    use super::{HardcoreCoordinator, StateOperation};
    use crate::savestate::{MemoryArchive, SaveStateHeader, SAVE_STATE_MAGIC};
    use crate::{EngineCommand, Followups, MonitorFault, RamBackend};

    const fn current() -> SaveStateHeader {
        SaveStateHeader::current()
    }

    fn enabled() -> (HardcoreCoordinator, RamBackend) {
        let mut coordinator = HardcoreCoordinator::new();
        let mut ram = RamBackend::new();
        assert!(coordinator.set_enabled(true, &mut ram, &mut Followups::new()));
        (coordinator, ram)
    }

    #[test]
    fn toggle_pushes_protection_and_notifies_once_per_change() {
        let mut coordinator = HardcoreCoordinator::new();
        let mut ram = RamBackend::new();
        let mut followups = Followups::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        coordinator.add_observer(Box::new(move |flag, followups| {
            sink.lock().expect("observer sink").push(flag);
            followups.push(EngineCommand::ClearWatches);
        }));

        assert!(coordinator.set_enabled(true, &mut ram, &mut followups));
        assert!(!coordinator.set_enabled(true, &mut ram, &mut followups));
        assert!(ram.protection_enabled());
        assert!(coordinator.set_enabled(false, &mut ram, &mut followups));
        assert!(!ram.protection_enabled());

        assert_eq!(*seen.lock().expect("observer sink"), vec![true, false]);
        assert_eq!(followups.len(), 2);
    }

    #[test]
    fn round_trip_restores_protected_predicate() {
        let (mut coordinator, mut ram) = enabled();
        let mut followups = Followups::new();
        assert!(coordinator.add_protected_region(0x2000, 0x100).is_ok());
        assert!(coordinator.is_address_protected(0x2050));
        assert!(!coordinator.is_address_protected(0x3050));

        coordinator.set_enabled(false, &mut ram, &mut followups);
        assert!(!coordinator.is_address_protected(0x2050));
        coordinator.set_enabled(true, &mut ram, &mut followups);
        assert!(coordinator.is_address_protected(0x2050));
    }

    #[test]
    fn save_state_operations_are_denied_only_in_hardcore() {
        let mut coordinator = HardcoreCoordinator::new();
        let mut empty = MemoryArchive::new();
        assert!(coordinator.validate_save_state_operation("save"));
        assert!(coordinator.check_save_state_allowed(&mut empty));
        assert!(coordinator.save_state_allowed());

        let mut ram = RamBackend::new();
        coordinator.set_enabled(true, &mut ram, &mut Followups::new());
        assert!(!coordinator.validate_save_state_operation("save"));
        assert!(!coordinator.check_save_state_allowed(&mut empty));
        assert!(!coordinator.save_state_allowed());
    }

    #[rstest]
    #[case::current(SaveStateHeader::current(), true, true)]
    #[case::bad_magic(SaveStateHeader { magic: 0, ..current() }, false, false)]
    #[case::future_version(SaveStateHeader { version: 9, ..current() }, true, false)]
    #[case::unknown_features(SaveStateHeader { features: 1 << 7, ..current() }, true, false)]
    fn header_gate_in_hardcore(
        #[case] header: SaveStateHeader,
        #[case] save_ok: bool,
        #[case] load_ok: bool,
    ) {
        let (coordinator, _ram) = enabled();
        let mut archive = MemoryArchive::with_header(header);
        assert_eq!(coordinator.check_save_state_allowed(&mut archive), save_ok);
        assert_eq!(coordinator.check_load_state_allowed(&mut archive), load_ok);
    }

    #[test]
    fn inspect_reports_header_fault() {
        let (coordinator, _ram) = enabled();
        let mut archive = MemoryArchive::with_header(SaveStateHeader {
            magic: SAVE_STATE_MAGIC ^ 1,
            ..SaveStateHeader::current()
        });
        assert!(matches!(
            coordinator.inspect_save_state(&mut archive, StateOperation::Save),
            Err(MonitorFault::HeaderInvalid(_))
        ));
    }

    #[test]
    fn memory_validation_is_fail_fast() {
        let (mut coordinator, mut ram) = enabled();
        assert!(coordinator.add_protected_region(0x1000, 0x10).is_ok());
        assert!(coordinator.add_protected_region(0x2000, 0x10).is_ok());
        assert!(coordinator.add_protected_region(0x3000, 0x10).is_ok());
        ram.reject_validation(0x2000, 0x2010);

        assert!(!coordinator.validate_memory_state(&mut ram));
        assert_eq!(ram.validated_ranges(), &[(0x1000, 0x1010), (0x2000, 0x2010)]);
        assert!(!coordinator.validate_system_state(&mut ram));
    }

    #[test]
    fn memory_validation_skipped_outside_hardcore() {
        let mut coordinator = HardcoreCoordinator::new();
        let mut ram = RamBackend::new();
        assert!(coordinator.add_protected_region(0x1000, 0x10).is_ok());
        ram.reject_validation(0x1000, 0x1010);
        assert!(coordinator.validate_system_state(&mut ram));
        assert!(ram.validated_ranges().is_empty());
    }

    #[test]
    fn save_state_events_disable_achievements_in_hardcore() {
        let mut coordinator = HardcoreCoordinator::new();
        let mut followups = Followups::new();
        assert!(!coordinator.on_save_state_loaded(&mut followups));
        assert!(coordinator.achievements_enabled());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        coordinator.add_observer(Box::new(move |flag, _| {
            sink.lock().expect("observer sink").push(flag);
        }));
        let mut ram = RamBackend::new();
        coordinator.set_enabled(true, &mut ram, &mut followups);
        assert!(coordinator.on_save_state_created(&mut followups));
        assert!(!coordinator.achievements_enabled());
        assert_eq!(*seen.lock().expect("observer sink"), vec![true, false]);

        coordinator.reset();
        assert!(coordinator.achievements_enabled());
        assert!(coordinator.is_enabled());
    }
}
