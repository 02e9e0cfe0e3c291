//! Flat in-memory backing store covering both legal windows.
//!
//! [`RamBackend`] is the reference [`MemoryBackend`]: hosts without their own
//! memory map can embed it directly, and the crate's tests, example and fuzz
//! target drive the engine through it. Besides the raw accessors it models
//! the emulated machine's side of the contract: guest stores fire installed
//! write intercepts, and failures can be injected per address.

use crate::window::{window_of, AddressWindow};
use crate::{AccessHandler, BackendError, MemoryBackend, RAM_SIZE, SCRATCH_SIZE};

struct InterceptSlot {
    start: u32,
    size: u32,
    priority: u32,
    handler: Option<AccessHandler>,
}

impl InterceptSlot {
    const fn covers(&self, address: u32) -> bool {
        let address = address as u64;
        address >= self.start as u64 && address < self.start as u64 + self.size as u64
    }
}

/// Reference backing store with a 32 MiB RAM window and a 16 KiB scratchpad.
pub struct RamBackend {
    ram: Box<[u8]>,
    scratch: Box<[u8]>,
    read_maps: Vec<InterceptSlot>,
    write_maps: Vec<InterceptSlot>,
    failing: Vec<u32>,
    invalid_ranges: Vec<(u32, u32)>,
    validated: Vec<(u32, u32)>,
    protection_enabled: bool,
    raw_reads: u64,
}

impl Default for RamBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RamBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RamBackend")
            .field("read_maps", &self.installed_read_maps())
            .field("write_maps", &self.installed_write_maps())
            .field("protection_enabled", &self.protection_enabled)
            .field("raw_reads", &self.raw_reads)
            .finish_non_exhaustive()
    }
}

impl RamBackend {
    /// Allocates zeroed storage for both windows.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ram: vec![0; RAM_SIZE as usize].into_boxed_slice(),
            scratch: vec![0; SCRATCH_SIZE as usize].into_boxed_slice(),
            read_maps: Vec::new(),
            write_maps: Vec::new(),
            failing: Vec::new(),
            invalid_ranges: Vec::new(),
            validated: Vec::new(),
            protection_enabled: false,
            raw_reads: 0,
        }
    }

    fn cell(&self, address: u32) -> Result<u8, BackendError> {
        match window_of(address) {
            Some(AddressWindow::Ram) => Ok(self.ram[address as usize]),
            Some(AddressWindow::Scratchpad) => {
                Ok(self.scratch[(address - AddressWindow::Scratchpad.start()) as usize])
            }
            None => Err(BackendError::Unmapped { address }),
        }
    }

    fn cell_mut(&mut self, address: u32) -> Option<&mut u8> {
        match window_of(address)? {
            AddressWindow::Ram => self.ram.get_mut(address as usize),
            AddressWindow::Scratchpad => self
                .scratch
                .get_mut((address - AddressWindow::Scratchpad.start()) as usize),
        }
    }

    fn load(&mut self, address: u32) -> Result<u8, BackendError> {
        if self.failing.contains(&address) {
            return Err(BackendError::DeviceFault { address });
        }
        self.cell(address)
    }

    /// Stores bytes directly without firing any intercept.
    ///
    /// Bytes falling outside both windows are dropped.
    pub fn poke(&mut self, address: u32, bytes: &[u8]) {
        for (offset, byte) in (0_u32..).zip(bytes) {
            if let Some(cell) = address.checked_add(offset).and_then(|a| self.cell_mut(a)) {
                *cell = *byte;
            }
        }
    }

    /// Stores a little-endian word directly without firing any intercept.
    ///
    /// Models memory changing behind the engine's back (DMA, state restore);
    /// the engine only notices on its next poll.
    pub fn set_word(&mut self, address: u32, value: u32) {
        self.poke(address, &value.to_le_bytes());
    }

    /// Guest byte store: writes memory, then fires the covering write intercept.
    pub fn store_byte(&mut self, address: u32, value: u8) {
        self.poke(address, &[value]);
        Self::fire(&mut self.write_maps, address, u32::from(value));
    }

    /// Guest word store: writes memory, then fires the covering write intercept.
    pub fn store_word(&mut self, address: u32, value: u32) {
        self.set_word(address, value);
        Self::fire(&mut self.write_maps, address, value);
    }

    /// Guest word load: reads memory and passes it through the read intercept.
    ///
    /// Returns `None` when the address is unmapped or its read is failing.
    pub fn load_word(&mut self, address: u32) -> Option<u32> {
        let value = self.get_word(address).ok()?;
        Some(Self::fire(&mut self.read_maps, address, value))
    }

    fn fire(slots: &mut [InterceptSlot], address: u32, value: u32) -> u32 {
        slots
            .iter_mut()
            .filter(|slot| slot.covers(address))
            .max_by_key(|slot| slot.priority)
            .and_then(|slot| slot.handler.as_mut())
            .map_or(value, |handler| handler(address, value))
    }

    fn install(slots: &mut Vec<InterceptSlot>, slot: InterceptSlot) {
        if let Some(existing) = slots
            .iter_mut()
            .find(|s| s.start == slot.start && s.size == slot.size)
        {
            *existing = slot;
        } else {
            slots.push(slot);
        }
    }

    /// Makes every raw read touching `address` fail with a device fault.
    pub fn fail_reads_at(&mut self, address: u32) {
        if !self.failing.contains(&address) {
            self.failing.push(address);
        }
    }

    /// Clears all injected read failures.
    pub fn clear_read_failures(&mut self) {
        self.failing.clear();
    }

    /// Makes [`MemoryBackend::validate_range`] fail for exactly `[start, end)`.
    pub fn reject_validation(&mut self, start: u32, end: u32) {
        self.invalid_ranges.push((start, end));
    }

    /// Ranges passed to [`MemoryBackend::validate_range`], in call order.
    #[must_use]
    pub fn validated_ranges(&self) -> &[(u32, u32)] {
        &self.validated
    }

    /// Current state of the hardware protection switch.
    #[must_use]
    pub const fn protection_enabled(&self) -> bool {
        self.protection_enabled
    }

    /// Number of raw accessor calls served so far.
    #[must_use]
    pub const fn raw_reads(&self) -> u64 {
        self.raw_reads
    }

    /// Number of windows with a non-null read intercept.
    #[must_use]
    pub fn installed_read_maps(&self) -> usize {
        self.read_maps.iter().filter(|s| s.handler.is_some()).count()
    }

    /// Number of windows with a non-null write intercept.
    #[must_use]
    pub fn installed_write_maps(&self) -> usize {
        self.write_maps.iter().filter(|s| s.handler.is_some()).count()
    }
}

impl MemoryBackend for RamBackend {
    fn get_byte(&mut self, address: u32) -> Result<u8, BackendError> {
        self.raw_reads += 1;
        self.load(address)
    }

    fn get_half(&mut self, address: u32) -> Result<u16, BackendError> {
        self.raw_reads += 1;
        let next = address.wrapping_add(1);
        Ok(u16::from_le_bytes([self.load(address)?, self.load(next)?]))
    }

    fn get_word(&mut self, address: u32) -> Result<u32, BackendError> {
        self.raw_reads += 1;
        let mut bytes = [0; 4];
        for (offset, byte) in (0_u32..).zip(bytes.iter_mut()) {
            *byte = self.load(address.wrapping_add(offset))?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    fn insert_read_map(
        &mut self,
        start: u32,
        size: u32,
        handler: Option<AccessHandler>,
        priority: u32,
    ) {
        Self::install(
            &mut self.read_maps,
            InterceptSlot {
                start,
                size,
                priority,
                handler,
            },
        );
    }

    fn insert_write_map(
        &mut self,
        start: u32,
        size: u32,
        handler: Option<AccessHandler>,
        priority: u32,
    ) {
        Self::install(
            &mut self.write_maps,
            InterceptSlot {
                start,
                size,
                priority,
                handler,
            },
        );
    }

    fn validate_range(&mut self, start: u32, end: u32) -> bool {
        self.validated.push((start, end));
        !self.invalid_ranges.contains(&(start, end))
    }

    fn set_protection_enabled(&mut self, enabled: bool) {
        self.protection_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::RamBackend;
    use crate::{BackendError, MemoryBackend, SCRATCH_START};

    #[test]
    fn raw_accessors_are_little_endian_in_both_windows() {
        let mut ram = RamBackend::new();
        ram.set_word(0x1000, 0x1234_5678);
        ram.set_word(SCRATCH_START + 0x10, 0xCAFE_BABE);

        assert_eq!(ram.get_byte(0x1000), Ok(0x78));
        assert_eq!(ram.get_half(0x1002), Ok(0x1234));
        assert_eq!(ram.get_word(0x1000), Ok(0x1234_5678));
        assert_eq!(ram.get_word(SCRATCH_START + 0x10), Ok(0xCAFE_BABE));
        assert_eq!(
            ram.get_byte(0x6000_0000),
            Err(BackendError::Unmapped {
                address: 0x6000_0000
            })
        );
    }

    #[test]
    fn injected_failures_hit_any_read_touching_the_address() {
        let mut ram = RamBackend::new();
        ram.fail_reads_at(0x2003);
        assert!(ram.get_byte(0x2002).is_ok());
        assert_eq!(
            ram.get_word(0x2000),
            Err(BackendError::DeviceFault { address: 0x2003 })
        );
        ram.clear_read_failures();
        assert_eq!(ram.get_word(0x2000), Ok(0));
    }

    #[test]
    fn guest_stores_fire_write_intercepts_until_nulled() {
        let seen = Arc::new(AtomicU32::new(0));
        let mut ram = RamBackend::new();
        let sink = Arc::clone(&seen);
        ram.insert_write_map(
            0,
            0x1_0000,
            Some(Box::new(move |_, value| {
                sink.store(value, Ordering::SeqCst);
                value
            })),
            0,
        );
        assert_eq!(ram.installed_write_maps(), 1);

        ram.store_word(0x40, 0xABCD);
        assert_eq!(seen.load(Ordering::SeqCst), 0xABCD);
        assert_eq!(ram.get_word(0x40), Ok(0xABCD));

        ram.insert_write_map(0, 0x1_0000, None, 0);
        assert_eq!(ram.installed_write_maps(), 0);
        ram.store_word(0x40, 0x1);
        assert_eq!(seen.load(Ordering::SeqCst), 0xABCD);
    }

    #[test]
    fn validate_range_records_calls_and_honours_rejections() {
        let mut ram = RamBackend::new();
        ram.reject_validation(0x3000, 0x3010);
        assert!(ram.validate_range(0x2000, 0x2100));
        assert!(!ram.validate_range(0x3000, 0x3010));
        assert_eq!(ram.validated_ranges(), &[(0x2000, 0x2100), (0x3000, 0x3010)]);
    }
}
