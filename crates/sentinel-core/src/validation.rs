//! Address-keyed comparison conditions evaluated on demand.

use crate::window::validate_range;
use crate::{Followups, MonitorFault};

/// Comparator applied by a [`ValidationCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ConditionKind {
    /// `observed == value`
    Equal,
    /// `observed != value`
    NotEqual,
    /// `observed < value`
    LessThan,
    /// `observed > value`
    GreaterThan,
    /// `observed <= value`
    LessEqual,
    /// `observed >= value`
    GreaterEqual,
    /// Every mask bit is set.
    BitAllSet,
    /// At least one mask bit is set.
    BitAnySet,
    /// No mask bit is set.
    BitNoneSet,
    /// `min_value <= observed <= max_value`
    RangeInside,
    /// `observed < min_value || observed > max_value`
    RangeOutside,
}

impl ConditionKind {
    /// Every kind, in wire-code order.
    pub const ALL: [Self; 11] = [
        Self::Equal,
        Self::NotEqual,
        Self::LessThan,
        Self::GreaterThan,
        Self::LessEqual,
        Self::GreaterEqual,
        Self::BitAllSet,
        Self::BitAnySet,
        Self::BitNoneSet,
        Self::RangeInside,
        Self::RangeOutside,
    ];

    /// Decodes the numeric kind code used by rule tables.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Equal),
            1 => Some(Self::NotEqual),
            2 => Some(Self::LessThan),
            3 => Some(Self::GreaterThan),
            4 => Some(Self::LessEqual),
            5 => Some(Self::GreaterEqual),
            6 => Some(Self::BitAllSet),
            7 => Some(Self::BitAnySet),
            8 => Some(Self::BitNoneSet),
            9 => Some(Self::RangeInside),
            10 => Some(Self::RangeOutside),
            _ => None,
        }
    }

    /// Numeric kind code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Stored comparator rule for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ValidationCondition {
    /// Address the condition is keyed by.
    pub address: u32,
    /// Width of the checked value in bytes.
    pub size: u32,
    /// Operand for the ordering and equality kinds.
    pub value: u32,
    /// Operand for the bit kinds.
    pub mask: u32,
    /// Lower bound for the range kinds.
    pub min_value: u32,
    /// Upper bound for the range kinds.
    pub max_value: u32,
    /// Comparator.
    pub kind: ConditionKind,
    /// Inactive conditions are skipped by every entry point.
    pub active: bool,
}

impl ValidationCondition {
    /// Active condition with zeroed operands.
    #[must_use]
    pub const fn new(address: u32, size: u32, kind: ConditionKind) -> Self {
        Self {
            address,
            size,
            value: 0,
            mask: 0,
            min_value: 0,
            max_value: 0,
            kind,
            active: true,
        }
    }

    /// Sets the comparison operand.
    #[must_use]
    pub const fn with_value(mut self, value: u32) -> Self {
        self.value = value;
        self
    }

    /// Sets the bit mask.
    #[must_use]
    pub const fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    /// Sets the inclusive bounds.
    #[must_use]
    pub const fn with_range(mut self, min_value: u32, max_value: u32) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Builds a condition from a raw kind code.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorFault::Configuration`] when `code` names no kind.
    pub const fn from_raw(address: u32, size: u32, code: u32) -> Result<Self, MonitorFault> {
        match ConditionKind::from_code(code) {
            Some(kind) => Ok(Self::new(address, size, kind)),
            None => Err(MonitorFault::Configuration {
                address,
                what: "condition kind",
                value: code,
            }),
        }
    }

    /// Applies the comparator to `observed`.
    #[must_use]
    pub const fn evaluate(&self, observed: u32) -> bool {
        match self.kind {
            ConditionKind::Equal => observed == self.value,
            ConditionKind::NotEqual => observed != self.value,
            ConditionKind::LessThan => observed < self.value,
            ConditionKind::GreaterThan => observed > self.value,
            ConditionKind::LessEqual => observed <= self.value,
            ConditionKind::GreaterEqual => observed >= self.value,
            ConditionKind::BitAllSet => observed & self.mask == self.mask,
            ConditionKind::BitAnySet => observed & self.mask != 0,
            ConditionKind::BitNoneSet => observed & self.mask == 0,
            ConditionKind::RangeInside => {
                observed >= self.min_value && observed <= self.max_value
            }
            ConditionKind::RangeOutside => observed < self.min_value || observed > self.max_value,
        }
    }
}

/// Observer told the individual outcome of each evaluated condition.
pub type ValidationCallback = Box<dyn FnMut(&ValidationCondition, bool, &mut Followups) + Send>;

/// Set of conditions keyed by address.
#[derive(Default)]
pub struct ValidationEngine {
    conditions: Vec<ValidationCondition>,
    callbacks: Vec<ValidationCallback>,
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("conditions", &self.conditions)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl ValidationEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `condition`, replacing any condition at the same address.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorFault::OutOfBounds`] when the condition's range lies
    /// outside the legal windows; nothing is changed in that case.
    pub fn add_condition(&mut self, condition: ValidationCondition) -> Result<(), MonitorFault> {
        validate_range(condition.address, condition.size)?;
        self.conditions.retain(|c| c.address != condition.address);
        self.conditions.push(condition);
        tracing::debug!("added validation condition at {:#010x}", condition.address);
        Ok(())
    }

    /// Removes the condition at `address`; returns whether one existed.
    pub fn remove_condition(&mut self, address: u32) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.address != address);
        let removed = self.conditions.len() != before;
        if removed {
            tracing::debug!("removed validation condition at {address:#010x}");
        }
        removed
    }

    /// Removes every condition.
    pub fn clear_conditions(&mut self) {
        self.conditions.clear();
        tracing::debug!("cleared all validation conditions");
    }

    /// Registered conditions in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[ValidationCondition] {
        &self.conditions
    }

    /// Registers an outcome observer.
    pub fn add_callback(&mut self, callback: ValidationCallback) {
        self.callbacks.push(callback);
    }

    /// Removes every outcome observer.
    pub fn remove_all_callbacks(&mut self) {
        self.callbacks.clear();
    }

    /// Checks `value` against every active condition at `address`.
    ///
    /// Returns the conjunction of all results; `true` when none apply.
    pub fn validate_address(
        &mut self,
        address: u32,
        value: u32,
        followups: &mut Followups,
    ) -> bool {
        self.run(|c| c.address == address, |_| value, followups)
    }

    /// Self-check of every active condition with `start <= address <= end`.
    ///
    /// Each condition is evaluated against its own stored `value`, not live
    /// memory.
    pub fn validate_range(&mut self, start: u32, end: u32, followups: &mut Followups) -> bool {
        self.run(
            |c| c.address >= start && c.address <= end,
            |c| c.value,
            followups,
        )
    }

    /// Self-check of every active condition against its own stored `value`.
    pub fn validate_all(&mut self, followups: &mut Followups) -> bool {
        self.run(|_| true, |c| c.value, followups)
    }

    fn run(
        &mut self,
        selects: impl Fn(&ValidationCondition) -> bool,
        observed: impl Fn(&ValidationCondition) -> u32,
        followups: &mut Followups,
    ) -> bool {
        let mut all_pass = true;
        for condition in self.conditions.iter().filter(|c| c.active && selects(c)) {
            let passed = condition.evaluate(observed(condition));
            all_pass &= passed;
            for callback in &mut self.callbacks {
                callback(condition, passed, followups);
            }
        }
        all_pass
    }
}
