//! Legal emulated address windows and range validation helpers.

use crate::MonitorFault;

/// Inclusive start address of the primary RAM window.
pub const RAM_START: u32 = 0x0000_0000;
/// Size in bytes of the primary RAM window (32 MiB).
pub const RAM_SIZE: u32 = 0x0200_0000;
/// Inclusive start address of the scratchpad window.
pub const SCRATCH_START: u32 = 0x7000_0000;
/// Size in bytes of the scratchpad window (16 KiB).
pub const SCRATCH_SIZE: u32 = 0x4000;

/// Address windows the engine is allowed to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AddressWindow {
    /// Primary RAM window (`0x0000_0000..0x0200_0000`).
    Ram,
    /// Scratchpad window (`0x7000_0000..0x7000_4000`).
    Scratchpad,
}

impl AddressWindow {
    /// Returns `(start, size)` for this window.
    #[must_use]
    pub const fn bounds(self) -> (u32, u32) {
        match self {
            Self::Ram => (RAM_START, RAM_SIZE),
            Self::Scratchpad => (SCRATCH_START, SCRATCH_SIZE),
        }
    }

    /// Inclusive start address.
    #[must_use]
    pub const fn start(self) -> u32 {
        self.bounds().0
    }

    /// Window length in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        self.bounds().1
    }

    /// Exclusive end address, widened so the scratchpad end never wraps.
    #[must_use]
    pub const fn end(self) -> u64 {
        let (start, size) = self.bounds();
        start as u64 + size as u64
    }

    /// Returns `true` when `address` belongs to this window.
    #[must_use]
    pub const fn contains(self, address: u32) -> bool {
        let address = address as u64;
        address >= self.start() as u64 && address < self.end()
    }

    /// Returns `true` when `[address, address + size)` lies fully inside this window.
    #[must_use]
    pub const fn contains_range(self, address: u32, size: u32) -> bool {
        let start = address as u64;
        start >= self.start() as u64 && start + size as u64 <= self.end()
    }
}

/// Legal windows in ascending address order.
pub const LEGAL_WINDOWS: [AddressWindow; 2] = [AddressWindow::Ram, AddressWindow::Scratchpad];

const _: () = assert_window_layout();

const fn assert_window_layout() {
    assert!(RAM_SIZE > 0 && SCRATCH_SIZE > 0, "windows cannot be empty");
    assert!(
        AddressWindow::Ram.end() <= SCRATCH_START as u64,
        "windows must be disjoint and ordered"
    );
    assert!(
        AddressWindow::Scratchpad.end() <= u32::MAX as u64,
        "scratchpad must not touch the top of the address space"
    );
}

/// Decodes the window that owns `address`, if any.
#[must_use]
pub const fn window_of(address: u32) -> Option<AddressWindow> {
    if AddressWindow::Ram.contains(address) {
        Some(AddressWindow::Ram)
    } else if AddressWindow::Scratchpad.contains(address) {
        Some(AddressWindow::Scratchpad)
    } else {
        None
    }
}

/// Validates that `[address, address + size)` is non-empty, does not wrap past
/// `u32::MAX`, and lies fully inside one legal window.
///
/// # Errors
///
/// Returns [`MonitorFault::OutOfBounds`] when any of those conditions fail.
pub fn validate_range(address: u32, size: u32) -> Result<AddressWindow, MonitorFault> {
    let out_of_bounds = MonitorFault::OutOfBounds { address, size };

    if size == 0 || address.checked_add(size).is_none() {
        return Err(out_of_bounds);
    }

    match window_of(address) {
        Some(window) if window.contains_range(address, size) => Ok(window),
        _ => Err(out_of_bounds),
    }
}

/// Returns `true` when the two half-open ranges intersect.
///
/// Arithmetic is widened to `u64` so ranges ending at the top of the address
/// space compare correctly.
#[must_use]
pub const fn ranges_overlap(a_start: u32, a_size: u32, b_start: u32, b_size: u32) -> bool {
    let a_start = a_start as u64;
    let b_start = b_start as u64;
    a_start < b_start + b_size as u64 && b_start < a_start + a_size as u64
}
