//! Protected address ranges and the enable flag gating them.

use crate::window::{ranges_overlap, validate_range};
use crate::MonitorFault;

/// Half-open protected range `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ProtectedRegion {
    /// First protected address.
    pub start: u32,
    /// Length in bytes.
    pub size: u32,
}

impl ProtectedRegion {
    /// Returns `true` when `address` lies inside the region.
    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        ranges_overlap(self.start, self.size, address, 1)
    }

    /// Exclusive end address, widened so regions at the top of the address
    /// space do not wrap.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start as u64 + self.size as u64
    }
}

/// Non-overlapping set of protected regions.
///
/// Inserting a region evicts every region it intersects, so at most one
/// region ever covers a given address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionGuard {
    regions: Vec<ProtectedRegion>,
    enabled: bool,
}

impl ProtectionGuard {
    /// Creates an empty, disabled guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `[start, start + size)`, evicting intersecting regions first.
    ///
    /// Returns the number of evicted regions.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorFault::OutOfBounds`] when the range lies outside the
    /// legal windows; the set is left unchanged.
    pub fn add_region(&mut self, start: u32, size: u32) -> Result<usize, MonitorFault> {
        validate_range(start, size)?;
        let before = self.regions.len();
        self.regions
            .retain(|r| !ranges_overlap(r.start, r.size, start, size));
        let evicted = before - self.regions.len();
        self.regions.push(ProtectedRegion { start, size });
        Ok(evicted)
    }

    /// Removes every region.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// `true` only while enabled and `address` lies in a stored region.
    #[must_use]
    pub fn is_protected(&self, address: u32) -> bool {
        self.enabled && self.regions.iter().any(|r| r.contains(address))
    }

    /// Stored regions in insertion order.
    #[must_use]
    pub fn regions(&self) -> &[ProtectedRegion] {
        &self.regions
    }

    /// Current enable flag.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
