//! Engine diagnostics counters.

use crate::{FaultClass, MonitorFault};

/// Saturating fault counters recorded by fail-closed engine paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Diagnostics {
    /// Class of the most recent fault, if any.
    pub last_fault_class: Option<FaultClass>,
    /// Address of the most recent fault, when it had one.
    pub last_fault_address: Option<u32>,
    /// Saturating counter for bounds-class faults.
    pub fault_count_bounds: u32,
    /// Saturating counter for read-class faults.
    pub fault_count_read: u32,
    /// Saturating counter for header-class faults.
    pub fault_count_header: u32,
    /// Saturating counter for configuration-class faults.
    pub fault_count_configuration: u32,
    /// Saturating counter for watches deactivated by a failed read or bounds check.
    pub deactivated_watches: u32,
    /// Saturating counter for refused save-state create/load operations.
    pub denied_save_states: u32,
}

impl Diagnostics {
    /// Creates an empty set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fault occurrence, updating the last-fault fields and the
    /// matching class counter.
    pub fn record_fault(&mut self, fault: &MonitorFault) {
        let class = fault.class();
        self.last_fault_class = Some(class);
        self.last_fault_address = fault.address();
        let counter = match class {
            FaultClass::Bounds => &mut self.fault_count_bounds,
            FaultClass::Read => &mut self.fault_count_read,
            FaultClass::Header => &mut self.fault_count_header,
            FaultClass::Configuration => &mut self.fault_count_configuration,
        };
        *counter = counter.saturating_add(1);
    }

    #[allow(clippy::missing_const_for_fn)]
    pub(crate) fn record_deactivation(&mut self) {
        self.deactivated_watches = self.deactivated_watches.saturating_add(1);
    }

    #[allow(clippy::missing_const_for_fn)]
    pub(crate) fn record_denied_save_state(&mut self) {
        self.denied_save_states = self.denied_save_states.saturating_add(1);
    }

    /// Total number of recorded faults across all classes.
    #[must_use]
    pub const fn total_faults(&self) -> u32 {
        self.fault_count_bounds
            .saturating_add(self.fault_count_read)
            .saturating_add(self.fault_count_header)
            .saturating_add(self.fault_count_configuration)
    }

    /// Resets all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
