//! Owned engine wiring the watch, validation, ledger and hardcore components
//! to one backing store.

use crossbeam_channel as cbc;

use crate::command::{EngineCommand, Followups};
use crate::hardcore::{HardcoreCoordinator, ModeObserver, StateOperation};
use crate::ledger::{AccessCallback, AccessKind, AccessLedger, Clock, SystemClock};
use crate::savestate::ArchiveReader;
use crate::validation::{ValidationCallback, ValidationCondition, ValidationEngine};
use crate::watch::{TickReport, WatchCallback, WatchTable};
use crate::window::{AddressWindow, LEGAL_WINDOWS};
use crate::{Diagnostics, EngineConfig, MemoryBackend, MemoryPort};

/// One access reported by an installed intercept handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ObservedAccess {
    /// Accessed address.
    pub address: u32,
    /// Width in bytes, clipped to the end of the window.
    pub size: u32,
    /// Value passed through the handler.
    pub value: u32,
    /// Read or write.
    pub kind: AccessKind,
}

/// Memory observation and protection engine bound to one backing store.
///
/// All state is owned; callbacks that want to mutate the engine enqueue an
/// [`EngineCommand`] which runs once the current operation has finished.
pub struct Engine<B: MemoryBackend> {
    backend: B,
    config: EngineConfig,
    watches: WatchTable,
    validation: ValidationEngine,
    ledger: AccessLedger,
    hardcore: HardcoreCoordinator,
    diagnostics: Diagnostics,
    followups: Followups,
    sender: cbc::Sender<ObservedAccess>,
    receiver: cbc::Receiver<ObservedAccess>,
    initialized: bool,
    handlers_installed: bool,
    game: Option<String>,
}

impl<B: MemoryBackend + std::fmt::Debug> std::fmt::Debug for Engine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .field("watches", &self.watches.len())
            .field("hardcore", &self.hardcore)
            .field("initialized", &self.initialized)
            .field("handlers_installed", &self.handlers_installed)
            .field("game", &self.game)
            .finish_non_exhaustive()
    }
}

impl<B: MemoryBackend> Engine<B> {
    /// Creates an inactive engine timestamping accesses with the wall clock.
    #[must_use]
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self::with_clock(backend, config, Box::new(SystemClock))
    }

    /// Creates an inactive engine timestamping accesses with `clock`.
    #[must_use]
    pub fn with_clock(backend: B, config: EngineConfig, clock: Box<dyn Clock>) -> Self {
        let mut ledger = AccessLedger::with_clock(clock);
        ledger.set_history_limit(config.history_limit);
        ledger.enable_tracking(config.tracking_enabled);
        let (sender, receiver) = cbc::bounded(config.pending_capacity.max(1));

        Self {
            backend,
            config,
            watches: WatchTable::new(),
            validation: ValidationEngine::new(),
            ledger,
            hardcore: HardcoreCoordinator::new(),
            diagnostics: Diagnostics::new(),
            followups: Followups::new(),
            sender,
            receiver,
            initialized: false,
            handlers_installed: false,
            game: None,
        }
    }

    /// Activates the engine and applies the configured start-up hardcore
    /// mode. Intercepts are installed later, by the first [`Engine::tick`].
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        tracing::info!("memory engine initialized");
        if self.config.hardcore_on_start {
            self.set_hardcore(true);
        }
    }

    /// Removes the intercepts, clears every watch and deactivates the engine.
    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.remove_handlers();
        self.watches.clear();
        while self.receiver.try_recv().is_ok() {}
        self.initialized = false;
        tracing::info!("memory engine shut down");
    }

    /// Whether [`Engine::initialize`] has run without a later shutdown.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the intercept handlers are currently installed.
    #[must_use]
    pub const fn handlers_installed(&self) -> bool {
        self.handlers_installed
    }

    /// Sets the active game context used by the rules-runtime bridge.
    pub fn load_game(&mut self, id: impl Into<String>) {
        let id = id.into();
        tracing::info!("game context {id} loaded");
        self.game = Some(id);
    }

    /// Drops the game context and every watch.
    pub fn unload_game(&mut self) {
        if let Some(id) = self.game.take() {
            tracing::info!("game context {id} unloaded");
        }
        self.watches.clear();
    }

    /// Identifier of the loaded game, if any.
    #[must_use]
    pub fn game(&self) -> Option<&str> {
        self.game.as_deref()
    }

    /// Per-frame entry point.
    ///
    /// Installs the intercepts on first use, applies pending intercepted
    /// accesses, then polls every watch. Does nothing while inactive.
    pub fn tick(&mut self) -> TickReport {
        if !self.initialized {
            return TickReport::default();
        }
        self.install_handlers();
        self.process_pending_accesses();

        let mut port = MemoryPort::new(&mut self.backend, &mut self.diagnostics);
        let report = self
            .watches
            .tick(&mut port, &mut self.ledger, &mut self.followups);
        self.drain_followups();
        report
    }

    /// Applies every access queued by the intercept handlers.
    ///
    /// Each access is tracked in the ledger and writes re-evaluate the
    /// overlapping watches. Returns the number of accesses applied.
    ///
    /// The queued path coalesces: watches are re-read against memory as it
    /// is at drain time, so a value that changes and changes back between
    /// drains fires nothing. Hosts that need every transition call
    /// [`Engine::on_write_observed`] from their write path instead.
    pub fn process_pending_accesses(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(access) = self.receiver.try_recv() {
            if self.initialized {
                self.observe(access);
                applied += 1;
            }
        }
        self.drain_followups();
        applied
    }

    /// Re-evaluates the watches overlapping `[address, address + size)`
    /// right away, firing callbacks for changed values.
    ///
    /// Meant to be called from a host's write path after each store. Returns
    /// the number of callbacks fired; `0` while the engine is inactive.
    pub fn on_write_observed(&mut self, address: u32, size: u32) -> usize {
        if !self.initialized {
            return 0;
        }
        let mut port = MemoryPort::new(&mut self.backend, &mut self.diagnostics);
        let fired = self
            .watches
            .on_write_observed(&mut port, address, size, &mut self.followups);
        self.drain_followups();
        fired
    }

    /// Queues `command` and runs it together with anything it enqueues.
    pub fn apply_command(&mut self, command: EngineCommand) {
        self.followups.push(command);
        self.drain_followups();
    }

    /// Registers a watch; returns `false` when inactive or when the range,
    /// width or seed read is rejected.
    pub fn add_watch(&mut self, address: u32, size: u32, callback: Option<WatchCallback>) -> bool {
        if !self.initialized {
            return false;
        }
        let mut port = MemoryPort::new(&mut self.backend, &mut self.diagnostics);
        match self.watches.add(&mut port, address, size, callback) {
            Ok(()) => true,
            Err(fault) => {
                tracing::warn!("watch at {address:#010x} refused: {fault}");
                port.record(&fault);
                false
            }
        }
    }

    /// Removes the watch at `address`.
    pub fn remove_watch(&mut self, address: u32) -> bool {
        self.initialized && self.watches.remove(address)
    }

    /// Removes every watch.
    pub fn clear_watches(&mut self) {
        if self.initialized {
            self.watches.clear();
        }
    }

    /// Registered watches.
    #[must_use]
    pub const fn watches(&self) -> &WatchTable {
        &self.watches
    }

    /// Fail-closed read through the bounds-checked port.
    pub fn read_memory(&mut self, address: u32, size: u32) -> u32 {
        MemoryPort::new(&mut self.backend, &mut self.diagnostics).read(address, size)
    }

    /// Registers a condition; returns `false` when its range is rejected.
    pub fn add_condition(&mut self, condition: ValidationCondition) -> bool {
        match self.validation.add_condition(condition) {
            Ok(()) => true,
            Err(fault) => {
                tracing::warn!("validation condition refused: {fault}");
                self.diagnostics.record_fault(&fault);
                false
            }
        }
    }

    /// Registers a condition given its numeric kind code.
    ///
    /// `configure` fills in the operands. Unknown codes are logged and the
    /// condition is not added.
    pub fn add_condition_with_code(
        &mut self,
        address: u32,
        size: u32,
        code: u32,
        configure: impl FnOnce(ValidationCondition) -> ValidationCondition,
    ) -> bool {
        match ValidationCondition::from_raw(address, size, code) {
            Ok(condition) => self.add_condition(configure(condition)),
            Err(fault) => {
                tracing::warn!("validation condition refused: {fault}");
                self.diagnostics.record_fault(&fault);
                false
            }
        }
    }

    /// Removes the condition at `address`.
    pub fn remove_condition(&mut self, address: u32) -> bool {
        self.validation.remove_condition(address)
    }

    /// Removes every condition.
    pub fn clear_conditions(&mut self) {
        self.validation.clear_conditions();
    }

    /// Registers a per-condition outcome observer.
    pub fn add_validation_callback(&mut self, callback: ValidationCallback) {
        self.validation.add_callback(callback);
    }

    /// Checks a caller-supplied value against the conditions at `address`.
    pub fn validate_address(&mut self, address: u32, value: u32) -> bool {
        let passed = self
            .validation
            .validate_address(address, value, &mut self.followups);
        self.drain_followups();
        passed
    }

    /// Self-check of the conditions keyed inside `start..=end`.
    pub fn validate_range(&mut self, start: u32, end: u32) -> bool {
        let passed = self
            .validation
            .validate_range(start, end, &mut self.followups);
        self.drain_followups();
        passed
    }

    /// Self-check of every active condition.
    pub fn validate_all(&mut self) -> bool {
        let passed = self.validation.validate_all(&mut self.followups);
        self.drain_followups();
        passed
    }

    /// Registered conditions.
    #[must_use]
    pub const fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    /// Records an access directly.
    pub fn track_access(&mut self, address: u32, size: u32, value: u32, kind: AccessKind) {
        self.ledger.track_access(address, size, value, kind);
    }

    /// See [`AccessLedger::has_recent_access`].
    #[must_use]
    pub fn has_recent_access(&self, address: u32, size: u32, window: u64) -> bool {
        self.ledger.has_recent_access(address, size, window)
    }

    /// See [`AccessLedger::access_count`].
    #[must_use]
    pub fn access_count(&self, address: u32, size: u32) -> usize {
        self.ledger.access_count(address, size)
    }

    /// Changes the ledger capacity.
    pub fn set_history_limit(&mut self, limit: usize) {
        self.ledger.set_history_limit(limit);
    }

    /// Switches tracking; switching off clears the history.
    pub fn enable_tracking(&mut self, enable: bool) {
        self.ledger.enable_tracking(enable);
    }

    /// Drops every ledger record.
    pub fn clear_history(&mut self) {
        self.ledger.clear_history();
    }

    /// Registers an observer for new ledger records.
    pub fn add_access_callback(&mut self, callback: AccessCallback) {
        self.ledger.add_callback(callback);
    }

    /// The access history.
    #[must_use]
    pub const fn ledger(&self) -> &AccessLedger {
        &self.ledger
    }

    /// Switches hardcore mode; returns whether the flag changed.
    pub fn set_hardcore(&mut self, enabled: bool) -> bool {
        let changed = self
            .hardcore
            .set_enabled(enabled, &mut self.backend, &mut self.followups);
        self.drain_followups();
        changed
    }

    /// Current hardcore flag.
    #[must_use]
    pub const fn is_hardcore(&self) -> bool {
        self.hardcore.is_enabled()
    }

    /// Registers a mode-change observer.
    pub fn add_mode_observer(&mut self, observer: ModeObserver) {
        self.hardcore.add_observer(observer);
    }

    /// Adds a protected region; returns `false` when the range is rejected.
    pub fn add_protected_region(&mut self, start: u32, size: u32) -> bool {
        match self.hardcore.add_protected_region(start, size) {
            Ok(()) => true,
            Err(fault) => {
                tracing::warn!("protected region refused: {fault}");
                self.diagnostics.record_fault(&fault);
                false
            }
        }
    }

    /// Removes every protected region.
    pub fn clear_protected_regions(&mut self) {
        self.hardcore.clear_protected_regions();
    }

    /// Whether `address` is protected right now.
    #[must_use]
    pub fn is_address_protected(&self, address: u32) -> bool {
        self.hardcore.is_address_protected(address)
    }

    /// Permits a named save-state operation only outside hardcore mode.
    pub fn validate_save_state_operation(&mut self, operation: &str) -> bool {
        let allowed = self.hardcore.validate_save_state_operation(operation);
        if !allowed {
            self.diagnostics.record_denied_save_state();
        }
        allowed
    }

    /// Gates creating a save state on the archive header.
    pub fn check_save_state_allowed<A: ArchiveReader + ?Sized>(&mut self, archive: &mut A) -> bool {
        self.gate_save_state(archive, StateOperation::Save)
    }

    /// Gates loading a save state on the archive header.
    pub fn check_load_state_allowed<A: ArchiveReader + ?Sized>(&mut self, archive: &mut A) -> bool {
        self.gate_save_state(archive, StateOperation::Load)
    }

    /// Validates every protected region against the backend, fail-fast.
    pub fn validate_memory_state(&mut self) -> bool {
        self.hardcore.validate_memory_state(&mut self.backend)
    }

    /// Memory validation plus further system checks.
    pub fn validate_system_state(&mut self) -> bool {
        self.hardcore.validate_system_state(&mut self.backend)
    }

    /// Save states are allowed exactly when hardcore is off.
    #[must_use]
    pub const fn save_state_allowed(&self) -> bool {
        self.hardcore.save_state_allowed()
    }

    /// Whether achievements may still unlock this session.
    #[must_use]
    pub const fn achievements_enabled(&self) -> bool {
        self.hardcore.achievements_enabled()
    }

    /// Reports that a save state was written.
    pub fn on_save_state_created(&mut self) {
        if self.hardcore.on_save_state_created(&mut self.followups) {
            self.on_achievements_disabled();
        }
        self.drain_followups();
    }

    /// Reports that a save state was restored.
    pub fn on_save_state_loaded(&mut self) {
        if self.hardcore.on_save_state_loaded(&mut self.followups) {
            self.on_achievements_disabled();
        }
        self.drain_followups();
    }

    /// Re-enables achievements, keeping the hardcore flag.
    pub fn reset_achievements(&mut self) {
        self.hardcore.reset();
    }

    /// Hardcore state and protected regions.
    #[must_use]
    pub const fn hardcore(&self) -> &HardcoreCoordinator {
        &self.hardcore
    }

    /// Single-byte read for the rules runtime; `0` unless a game is active.
    pub fn peek_byte(&mut self, address: u32, _flags: u32) -> u8 {
        if !self.bridge_active() {
            return 0;
        }
        u8::try_from(self.read_memory(address, 1)).unwrap_or_default()
    }

    /// Fills `buffer` from consecutive [`Engine::peek_byte`] reads.
    ///
    /// Returns the number of bytes written, `0` unless a game is active.
    pub fn peek_bytes(&mut self, address: u32, buffer: &mut [u8]) -> usize {
        if !self.bridge_active() {
            return 0;
        }
        for (offset, byte) in (0_u32..).zip(buffer.iter_mut()) {
            *byte = self.peek_byte(address.wrapping_add(offset), 0);
        }
        buffer.len()
    }

    /// Single-byte write notification from the rules runtime.
    ///
    /// Memory is not modified: the byte is treated as an observed write.
    pub fn poke_byte(&mut self, address: u32, value: u8, _flags: u32) {
        if !self.bridge_active() {
            return;
        }
        self.observe(ObservedAccess {
            address,
            size: 1,
            value: u32::from(value),
            kind: AccessKind::Write,
        });
        self.drain_followups();
    }

    /// Fault and deactivation counters.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The backing store.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The backing store, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn bridge_active(&self) -> bool {
        self.initialized && self.game.is_some()
    }

    fn observe(&mut self, access: ObservedAccess) {
        self.ledger
            .track_access(access.address, access.size, access.value, access.kind);
        if access.kind == AccessKind::Write {
            let mut port = MemoryPort::new(&mut self.backend, &mut self.diagnostics);
            self.watches.on_write_observed(
                &mut port,
                access.address,
                access.size,
                &mut self.followups,
            );
        }
    }

    fn gate_save_state<A: ArchiveReader + ?Sized>(
        &mut self,
        archive: &mut A,
        operation: StateOperation,
    ) -> bool {
        match self.hardcore.inspect_save_state(archive, operation) {
            Ok(()) => true,
            Err(fault) => {
                tracing::warn!("save state {} denied: {fault}", operation.name());
                self.diagnostics.record_fault(&fault);
                self.diagnostics.record_denied_save_state();
                false
            }
        }
    }

    fn on_achievements_disabled(&mut self) {
        self.watches.clear();
        self.unload_game();
    }

    fn drain_followups(&mut self) {
        while let Some(command) = self.followups.pop() {
            tracing::debug!("applying follow-up {command:?}");
            match command {
                EngineCommand::ClearWatches => self.watches.clear(),
                EngineCommand::RemoveWatch(address) => {
                    self.watches.remove(address);
                }
                EngineCommand::ClearConditions => self.validation.clear_conditions(),
                EngineCommand::ClearProtectedRegions => self.hardcore.clear_protected_regions(),
                EngineCommand::SetHardcore(enabled) => {
                    self.hardcore
                        .set_enabled(enabled, &mut self.backend, &mut self.followups);
                }
                EngineCommand::EnableTracking(enabled) => self.ledger.enable_tracking(enabled),
                EngineCommand::UnloadGame => self.unload_game(),
                EngineCommand::DisableAchievements => {
                    self.hardcore.disable_achievements(&mut self.followups);
                    self.on_achievements_disabled();
                }
            }
        }
    }

    fn install_handlers(&mut self) {
        if self.handlers_installed {
            return;
        }
        let priority = self.config.intercept_priority;
        for window in LEGAL_WINDOWS {
            let (start, size) = (window.start(), window.size());
            let read_handler = if self.config.track_reads {
                intercept(self.sender.clone(), window, AccessKind::Read)
            } else {
                pass_through()
            };
            self.backend
                .insert_read_map(start, size, Some(read_handler), priority);
            self.backend.insert_write_map(
                start,
                size,
                Some(intercept(self.sender.clone(), window, AccessKind::Write)),
                priority,
            );
        }
        self.handlers_installed = true;
        tracing::info!("memory intercepts installed");
    }

    fn remove_handlers(&mut self) {
        if !self.handlers_installed {
            return;
        }
        let priority = self.config.intercept_priority;
        for window in LEGAL_WINDOWS {
            self.backend
                .insert_read_map(window.start(), window.size(), None, priority);
            self.backend
                .insert_write_map(window.start(), window.size(), None, priority);
        }
        self.handlers_installed = false;
        tracing::info!("memory intercepts removed");
    }
}

impl<B: MemoryBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn intercept(
    sender: cbc::Sender<ObservedAccess>,
    window: AddressWindow,
    kind: AccessKind,
) -> crate::AccessHandler {
    Box::new(move |address, value| {
        let remaining = window.end().saturating_sub(u64::from(address)).min(4);
        let access = ObservedAccess {
            address,
            size: u32::try_from(remaining).unwrap_or(4),
            value,
            kind,
        };
        if let Err(cbc::TrySendError::Full(access)) = sender.try_send(access) {
            tracing::trace!("intercept queue full, dropped {access:?}");
        }
        value
    })
}

fn pass_through() -> crate::AccessHandler {
    Box::new(|_, value| value)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::Engine;
    use crate::ledger::{AccessKind, ManualClock};
    use crate::watch::WatchChange;
    use crate::{EngineCommand, EngineConfig, RamBackend, RAM_SIZE, SCRATCH_SIZE, SCRATCH_START};

    fn engine() -> Engine<RamBackend> {
        let mut engine = Engine::with_clock(
            RamBackend::new(),
            EngineConfig::default(),
            Box::new(ManualClock::starting_at(0)),
        );
        engine.initialize();
        engine
    }

    #[test]
    fn inactive_engine_ignores_watch_operations() {
        let mut engine = Engine::new(RamBackend::new(), EngineConfig::default());
        assert!(!engine.add_watch(0x1000, 4, None));
        assert_eq!(engine.tick(), Default::default());
        assert!(!engine.handlers_installed());
    }

    #[test]
    fn first_tick_installs_intercepts_once_and_shutdown_removes_them() {
        let mut engine = engine();
        assert!(!engine.handlers_installed());
        engine.tick();
        engine.tick();
        assert!(engine.handlers_installed());
        assert_eq!(engine.backend().installed_read_maps(), 2);
        assert_eq!(engine.backend().installed_write_maps(), 2);

        assert!(engine.add_watch(0x10, 4, None));
        engine.shutdown();
        assert!(!engine.is_initialized());
        assert_eq!(engine.backend().installed_read_maps(), 0);
        assert_eq!(engine.backend().installed_write_maps(), 0);
        assert!(engine.watches().is_empty());
    }

    #[test]
    fn intercepted_write_reevaluates_watch_before_next_tick() {
        let mut engine = engine();
        let seen = Arc::new(Mutex::new(Vec::<WatchChange>::new()));
        let sink = Arc::clone(&seen);
        assert!(engine.add_watch(
            0x1000,
            4,
            Some(Box::new(move |change, _| {
                sink.lock().expect("watch sink").push(change);
            }))
        ));
        engine.tick();

        engine.backend_mut().store_word(0x1000, 0x1234_5678);
        assert_eq!(engine.process_pending_accesses(), 1);
        assert_eq!(seen.lock().expect("watch sink").len(), 1);
        assert_eq!(engine.tick().fired, 0);
        assert_eq!(engine.access_count(0x1000, 4), 1);
    }

    #[test]
    fn intercept_size_is_clipped_at_window_end() {
        let mut engine = engine();
        engine.tick();
        let last = SCRATCH_START + SCRATCH_SIZE - 2;
        engine.backend_mut().store_byte(last, 0xAA);
        engine.backend_mut().store_byte(RAM_SIZE - 1, 0xBB);
        engine.process_pending_accesses();

        let sizes: Vec<(u32, u32)> = engine
            .ledger()
            .records()
            .map(|r| (r.address, r.size))
            .collect();
        assert_eq!(sizes, vec![(RAM_SIZE - 1, 1), (last, 2)]);
    }

    #[test]
    fn observers_mutate_engine_through_followups() {
        let mut engine = engine();
        assert!(engine.add_watch(0x20, 4, None));
        engine.add_mode_observer(Box::new(|enabled, followups| {
            if enabled {
                followups.push(EngineCommand::ClearWatches);
                followups.push(EngineCommand::EnableTracking(false));
            }
        }));
        engine.track_access(0x20, 4, 0, AccessKind::Read);

        assert!(engine.set_hardcore(true));
        assert!(engine.watches().is_empty());
        assert!(engine.ledger().is_empty());
        assert!(engine.backend().protection_enabled());
    }

    #[test]
    fn watch_callback_can_remove_itself() {
        let mut engine = engine();
        assert!(engine.add_watch(
            0x40,
            1,
            Some(Box::new(|change, followups| {
                followups.push(EngineCommand::RemoveWatch(change.address));
            }))
        ));
        engine.backend_mut().set_word(0x40, 1);
        assert_eq!(engine.tick().fired, 1);
        assert!(engine.watches().get(0x40).is_none());
    }

    #[test]
    fn bridge_requires_an_active_game() {
        let mut engine = engine();
        engine.backend_mut().poke(0x300, &[7, 8, 9]);
        assert_eq!(engine.peek_byte(0x300, 0), 0);

        engine.load_game("SLUS-20312");
        assert_eq!(engine.peek_byte(0x300, 0), 7);
        let mut buffer = [0; 3];
        assert_eq!(engine.peek_bytes(0x300, &mut buffer), 3);
        assert_eq!(buffer, [7, 8, 9]);
        assert_eq!(engine.peek_byte(0xFFFF_FFFF, 0), 0);

        engine.unload_game();
        assert_eq!(engine.peek_bytes(0x300, &mut buffer), 0);
    }

    #[test]
    fn poke_is_an_observation_not_a_write() {
        let mut engine = engine();
        engine.load_game("game");
        assert!(engine.add_watch(0x500, 1, None));
        engine.poke_byte(0x500, 0x42, 0);
        assert_eq!(engine.read_memory(0x500, 1), 0);
        assert_eq!(engine.access_count(0x500, 1), 1);
    }

    #[test]
    fn hardcore_save_state_event_disables_achievements_and_unloads() {
        let mut engine = engine();
        engine.load_game("game");
        assert!(engine.add_watch(0x80, 4, None));

        engine.on_save_state_loaded();
        assert!(engine.achievements_enabled());
        assert!(engine.game().is_some());

        engine.set_hardcore(true);
        engine.on_save_state_created();
        assert!(!engine.achievements_enabled());
        assert!(engine.game().is_none());
        assert!(engine.watches().is_empty());

        engine.reset_achievements();
        assert!(engine.achievements_enabled());
        assert!(!engine.save_state_allowed());
    }

    #[test]
    fn hardcore_on_start_is_applied_at_initialize() {
        let config = EngineConfig {
            hardcore_on_start: true,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(RamBackend::new(), config);
        assert!(!engine.is_hardcore());
        engine.initialize();
        assert!(engine.is_hardcore());
        assert!(!engine.validate_save_state_operation("save"));
        assert_eq!(engine.diagnostics().denied_save_states, 1);
    }

    #[test]
    fn unknown_condition_code_is_refused_and_counted() {
        let mut engine = engine();
        assert!(!engine.add_condition_with_code(0x10, 4, 42, |c| c));
        assert!(engine.add_condition_with_code(0x10, 4, 0, |c| c.with_value(3)));
        assert!(engine.validate_address(0x10, 3));
        assert_eq!(engine.diagnostics().fault_count_configuration, 1);
    }
}
