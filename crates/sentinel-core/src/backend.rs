//! Contract consumed from the backing emulated-memory subsystem.

use crate::BackendError;

/// Intercept callback installed into the backing store for one window.
///
/// Called as `handler(address, value)` whenever the emulated machine touches
/// an address in the registered window; returns the value the access should
/// observe.
pub type AccessHandler = Box<dyn FnMut(u32, u32) -> u32 + Send>;

/// Backing emulated-memory subsystem.
///
/// Raw accessors are little-endian and must not trigger installed intercepts:
/// the engine uses them for its own polling reads.
pub trait MemoryBackend {
    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the store cannot service the read.
    fn get_byte(&mut self, address: u32) -> Result<u8, BackendError>;

    /// Reads a naturally aligned half-word.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the store cannot service the read.
    fn get_half(&mut self, address: u32) -> Result<u16, BackendError>;

    /// Reads a naturally aligned word.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the store cannot service the read.
    fn get_word(&mut self, address: u32) -> Result<u32, BackendError>;

    /// Registers a read intercept over `[start, start + size)`.
    ///
    /// Passing `None` installs a null handler, unregistering any previous one.
    fn insert_read_map(
        &mut self,
        start: u32,
        size: u32,
        handler: Option<AccessHandler>,
        priority: u32,
    );

    /// Registers a write intercept over `[start, start + size)`.
    ///
    /// Passing `None` installs a null handler, unregistering any previous one.
    fn insert_write_map(
        &mut self,
        start: u32,
        size: u32,
        handler: Option<AccessHandler>,
        priority: u32,
    );

    /// Checks the current contents of `[start, end)` against the store's own
    /// integrity invariant.
    fn validate_range(&mut self, start: u32, end: u32) -> bool;

    /// Switches hardware-level write protection callbacks on or off.
    fn set_protection_enabled(&mut self, enabled: bool);
}
