//! Save-state header record and the archive-reader capability used to fetch it.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};

use thiserror::Error;

/// Archive entry holding the fixed-size header record.
pub const SAVE_STATE_HEADER_ENTRY: &str = "header";

/// Expected magic number (`"PSAV"` read as a little-endian `u32`).
pub const SAVE_STATE_MAGIC: u32 = u32::from_le_bytes(*b"PSAV");

/// Encoded header length in bytes.
pub const SAVE_STATE_HEADER_BYTES: usize = 12;

/// Feature bit: archive carries the scratchpad window.
pub const FEATURE_SCRATCHPAD: u32 = 1 << 0;
/// Feature bit: archive carries the primary RAM window.
pub const FEATURE_MAIN_RAM: u32 = 1 << 1;
/// Every feature bit this engine knows how to honour.
pub const SUPPORTED_FEATURES: u32 = FEATURE_SCRATCHPAD | FEATURE_MAIN_RAM;

/// Stable save-state header versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u32)]
pub enum SaveStateVersion {
    /// Initial header revision.
    V1 = 1,
}

impl SaveStateVersion {
    /// Latest version written by this engine.
    pub const CURRENT: Self = Self::V1;

    /// Converts a wire value to a known version.
    #[must_use]
    pub const fn from_u32(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            _ => None,
        }
    }
}

/// Reason a save-state header was refused.
#[derive(Debug, Error)]
pub enum SaveStateRejection {
    /// The header entry could not be opened or was truncated.
    #[error("header unreadable: {0}")]
    Io(#[from] io::Error),
    /// Magic field did not match [`SAVE_STATE_MAGIC`].
    #[error("bad magic {found:#010x}")]
    BadMagic {
        /// Magic value found in the archive.
        found: u32,
    },
    /// Version field is not a known [`SaveStateVersion`].
    #[error("unsupported version {found}")]
    UnsupportedVersion {
        /// Version value found in the archive.
        found: u32,
    },
    /// Feature bits outside [`SUPPORTED_FEATURES`] are set.
    #[error("unsupported feature bits {found:#x}")]
    UnsupportedFeatures {
        /// Unknown feature bits found in the archive.
        found: u32,
    },
}

/// Fixed-size record stored in the archive's `"header"` entry.
///
/// Layout is three little-endian `u32` fields: magic, version, feature bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SaveStateHeader {
    /// Magic number identifying the archive format.
    pub magic: u32,
    /// Header revision.
    pub version: u32,
    /// Feature bits describing archive contents.
    pub features: u32,
}

impl SaveStateHeader {
    /// Header this engine would write for a fresh archive.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            magic: SAVE_STATE_MAGIC,
            version: SaveStateVersion::CURRENT as u32,
            features: SUPPORTED_FEATURES,
        }
    }

    /// Encodes the header into its wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SAVE_STATE_HEADER_BYTES] {
        let mut bytes = [0; SAVE_STATE_HEADER_BYTES];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.features.to_le_bytes());
        bytes
    }

    /// Decodes a header from its wire layout.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SAVE_STATE_HEADER_BYTES]) -> Self {
        Self {
            magic: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            version: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            features: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        }
    }

    /// Reads exactly one header record from `stream`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, including `UnexpectedEof` when the
    /// stream is shorter than [`SAVE_STATE_HEADER_BYTES`].
    pub fn read_from<R: Read + ?Sized>(stream: &mut R) -> io::Result<Self> {
        let mut bytes = [0; SAVE_STATE_HEADER_BYTES];
        stream.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Opens the archive's header entry and decodes it.
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateRejection::Io`] when the entry is missing or short.
    pub fn from_archive<A: ArchiveReader + ?Sized>(
        archive: &mut A,
    ) -> Result<Self, SaveStateRejection> {
        let mut stream = archive.begin_read_file(SAVE_STATE_HEADER_ENTRY)?;
        Ok(Self::read_from(&mut stream)?)
    }

    /// Verifies the magic field.
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateRejection::BadMagic`] on mismatch.
    pub const fn check_magic(&self) -> Result<(), SaveStateRejection> {
        if self.magic == SAVE_STATE_MAGIC {
            Ok(())
        } else {
            Err(SaveStateRejection::BadMagic { found: self.magic })
        }
    }

    /// Verifies the version and feature bits are understood by this engine.
    ///
    /// # Errors
    ///
    /// Returns [`SaveStateRejection::UnsupportedVersion`] or
    /// [`SaveStateRejection::UnsupportedFeatures`].
    pub const fn check_compatible(&self) -> Result<SaveStateVersion, SaveStateRejection> {
        let Some(version) = SaveStateVersion::from_u32(self.version) else {
            return Err(SaveStateRejection::UnsupportedVersion {
                found: self.version,
            });
        };
        let unknown = self.features & !SUPPORTED_FEATURES;
        if unknown != 0 {
            return Err(SaveStateRejection::UnsupportedFeatures { found: unknown });
        }
        Ok(version)
    }
}

impl Default for SaveStateHeader {
    fn default() -> Self {
        Self::current()
    }
}

/// Read capability over a save-state archive.
pub trait ArchiveReader {
    /// Stream type returned for an opened entry.
    type Stream: Read;

    /// Opens the named entry for reading.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the entry does not exist or cannot be opened.
    fn begin_read_file(&mut self, name: &str) -> io::Result<Self::Stream>;
}

/// In-memory archive keyed by entry name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryArchive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryArchive {
    /// Creates an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an archive holding only `header` under the header entry.
    #[must_use]
    pub fn with_header(header: SaveStateHeader) -> Self {
        let mut archive = Self::new();
        archive.insert(SAVE_STATE_HEADER_ENTRY, header.to_bytes().to_vec());
        archive
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(name.into(), bytes);
    }
}

impl ArchiveReader for MemoryArchive {
    type Stream = Cursor<Vec<u8>>;

    fn begin_read_file(&mut self, name: &str) -> io::Result<Self::Stream> {
        self.entries.get(name).cloned().map(Cursor::new).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry named {name}"))
        })
    }
}
