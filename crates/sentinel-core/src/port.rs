//! Bounds-checked, width-dispatching reads into the legal windows.

use crate::window::validate_range;
use crate::{Diagnostics, MemoryBackend, MonitorFault};

/// Read-only view over a [`MemoryBackend`] restricted to the legal windows.
///
/// The port never writes: the engine observes writes, it does not originate
/// them.
pub struct MemoryPort<'a, B: MemoryBackend + ?Sized> {
    backend: &'a mut B,
    diagnostics: &'a mut Diagnostics,
}

impl<'a, B: MemoryBackend + ?Sized> MemoryPort<'a, B> {
    /// Borrows `backend` for reads, recording fail-closed faults into `diagnostics`.
    pub fn new(backend: &'a mut B, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            backend,
            diagnostics,
        }
    }

    /// Reads `size` bytes at `address`, failing closed.
    ///
    /// Invalid ranges and backend failures return `0`, log a warning and bump
    /// the matching diagnostics counter.
    pub fn read(&mut self, address: u32, size: u32) -> u32 {
        match self.try_read(address, size) {
            Ok(value) => value,
            Err(fault) => {
                tracing::warn!("memory read at {address:#010x} (size {size}) failed: {fault}");
                self.record(&fault);
                0
            }
        }
    }

    /// Reads `size` bytes at `address`.
    ///
    /// Widths 1, 2 and 4 use the direct accessor when naturally aligned and
    /// compose little-endian bytes otherwise. Width 8 composes two word reads
    /// and yields only the low 32 bits. Any other width falls back to a word
    /// read.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorFault::OutOfBounds`] for ranges outside the legal
    /// windows and [`MonitorFault::ReadFailure`] when the backend fails.
    pub fn try_read(&mut self, address: u32, size: u32) -> Result<u32, MonitorFault> {
        validate_range(address, size)?;

        match size {
            1 => self.byte(address).map(u32::from),
            2 => self.half(address).map(u32::from),
            4 => self.word(address),
            8 => self.double(address).map(low_half),
            other => {
                tracing::warn!(
                    "unsupported read width {other} at {address:#010x}, falling back to a word read"
                );
                validate_range(address, 4)?;
                self.word(address)
            }
        }
    }

    /// Reads the full 64-bit value at `address` from two word reads.
    ///
    /// # Errors
    ///
    /// Same as [`MemoryPort::try_read`].
    pub fn try_read_double(&mut self, address: u32) -> Result<u64, MonitorFault> {
        validate_range(address, 8)?;
        self.double(address)
    }

    pub(crate) fn record(&mut self, fault: &MonitorFault) {
        self.diagnostics.record_fault(fault);
    }

    pub(crate) fn diagnostics(&mut self) -> &mut Diagnostics {
        self.diagnostics
    }

    fn byte(&mut self, address: u32) -> Result<u8, MonitorFault> {
        self.backend
            .get_byte(address)
            .map_err(|source| MonitorFault::read_failure(address, 1, source))
    }

    fn half(&mut self, address: u32) -> Result<u16, MonitorFault> {
        if address & 1 == 0 {
            return self
                .backend
                .get_half(address)
                .map_err(|source| MonitorFault::read_failure(address, 2, source));
        }
        Ok(u16::from_le_bytes([self.byte(address)?, self.byte(address + 1)?]))
    }

    fn word(&mut self, address: u32) -> Result<u32, MonitorFault> {
        if address & 3 == 0 {
            return self
                .backend
                .get_word(address)
                .map_err(|source| MonitorFault::read_failure(address, 4, source));
        }
        let mut bytes = [0; 4];
        for (offset, byte) in (0_u32..).zip(bytes.iter_mut()) {
            *byte = self.byte(address + offset)?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    fn double(&mut self, address: u32) -> Result<u64, MonitorFault> {
        let low = self.word(address)?;
        let high = self.word(address + 4)?;
        Ok(u64::from(low) | (u64::from(high) << 32))
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn low_half(value: u64) -> u32 {
    value as u32
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::MemoryPort;
    use crate::{Diagnostics, MonitorFault, RamBackend, RAM_SIZE, SCRATCH_START};

    fn backend_with(address: u32, bytes: &[u8]) -> RamBackend {
        let mut ram = RamBackend::new();
        ram.poke(address, bytes);
        ram
    }

    #[rstest]
    #[case::byte(0x1000, 1, 0x11)]
    #[case::aligned_half(0x1000, 2, 0x2211)]
    #[case::unaligned_half(0x1001, 2, 0x3322)]
    #[case::aligned_word(0x1000, 4, 0x4433_2211)]
    #[case::unaligned_word(0x1001, 4, 0x5544_3322)]
    #[case::double_keeps_low_word(0x1000, 8, 0x4433_2211)]
    #[case::unaligned_double(0x1002, 8, 0x6655_4433)]
    #[case::odd_width_falls_back_to_word(0x1000, 3, 0x4433_2211)]
    fn width_dispatch_composes_little_endian(
        #[case] address: u32,
        #[case] size: u32,
        #[case] expected: u32,
    ) {
        let mut ram = backend_with(
            0x1000,
            &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA],
        );
        let mut diag = Diagnostics::new();
        let mut port = MemoryPort::new(&mut ram, &mut diag);
        assert_eq!(port.try_read(address, size).ok(), Some(expected));
    }

    #[test]
    fn double_read_exposes_high_half_separately() {
        let mut ram = backend_with(0x2000, &[1, 0, 0, 0, 2, 0, 0, 0]);
        let mut diag = Diagnostics::new();
        let mut port = MemoryPort::new(&mut ram, &mut diag);
        assert_eq!(port.try_read_double(0x2000).ok(), Some(0x0000_0002_0000_0001));
        assert_eq!(port.try_read(0x2000, 8).ok(), Some(1));
    }

    #[test]
    fn invalid_range_fails_closed_without_touching_the_backend() {
        let mut ram = RamBackend::new();
        let mut diag = Diagnostics::new();
        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            assert_eq!(port.read(RAM_SIZE - 2, 4), 0);
            assert_eq!(port.read(0xFFFF_FFF0, 0x20), 0);
        }
        assert_eq!(ram.raw_reads(), 0);
        assert_eq!(diag.fault_count_bounds, 2);
    }

    #[test]
    fn fallback_width_is_rechecked_against_the_window_end() {
        let mut ram = RamBackend::new();
        let mut diag = Diagnostics::new();
        let mut port = MemoryPort::new(&mut ram, &mut diag);
        assert!(matches!(
            port.try_read(RAM_SIZE - 3, 3),
            Err(MonitorFault::OutOfBounds { size: 4, .. })
        ));
    }

    #[test]
    fn backend_failure_is_reported_as_read_failure() {
        let mut ram = RamBackend::new();
        ram.fail_reads_at(SCRATCH_START + 1);
        let mut diag = Diagnostics::new();
        {
            let mut port = MemoryPort::new(&mut ram, &mut diag);
            assert!(matches!(
                port.try_read(SCRATCH_START, 2),
                Err(MonitorFault::ReadFailure { size: 2, .. })
            ));
            assert_eq!(port.read(SCRATCH_START, 4), 0);
        }
        assert_eq!(diag.fault_count_read, 1);
    }
}
