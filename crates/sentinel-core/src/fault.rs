use thiserror::Error;

use crate::SaveStateRejection;

/// Fault classes used for diagnostics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Address range outside the legal windows or wrapping past `u32::MAX`.
    Bounds,
    /// Backing store failed to service a read.
    Read,
    /// Save-state header missing, unreadable, or incompatible.
    Header,
    /// Caller supplied an unsupported width or condition kind.
    Configuration,
}

/// Failure reported by a backing memory subsystem accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BackendError {
    /// No storage is mapped at the requested address.
    #[error("no storage mapped at {address:#010x}")]
    Unmapped {
        /// Address that missed every mapping.
        address: u32,
    },
    /// The device behind the address refused or failed the access.
    #[error("device fault at {address:#010x}")]
    DeviceFault {
        /// Address of the failed access.
        address: u32,
    },
}

/// Engine fault taxonomy.
///
/// None of these are fatal: every entry point that encounters one logs it and
/// degrades to "disabled for this one watch, condition, or operation".
#[derive(Debug, Error)]
pub enum MonitorFault {
    /// Range lies outside both legal windows, is empty, or overflows 32 bits.
    #[error("range {address:#010x}+{size:#x} is outside the observable windows")]
    OutOfBounds {
        /// Start of the rejected range.
        address: u32,
        /// Length of the rejected range in bytes.
        size: u32,
    },
    /// Backing store failed while servicing a read.
    #[error("read of {size} byte(s) at {address:#010x} failed")]
    ReadFailure {
        /// Address of the failed read.
        address: u32,
        /// Width of the failed read in bytes.
        size: u32,
        /// Backend-reported cause.
        #[source]
        source: BackendError,
    },
    /// Save-state header was rejected.
    #[error("save-state header rejected: {0}")]
    HeaderInvalid(#[from] SaveStateRejection),
    /// Unsupported watch width or condition kind code.
    #[error("unsupported {what} {value} at {address:#010x}")]
    Configuration {
        /// Address the configuration applied to.
        address: u32,
        /// Name of the rejected setting.
        what: &'static str,
        /// Raw rejected value.
        value: u32,
    },
}

impl MonitorFault {
    /// Returns the diagnostics class for this fault.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::OutOfBounds { .. } => FaultClass::Bounds,
            Self::ReadFailure { .. } => FaultClass::Read,
            Self::HeaderInvalid(_) => FaultClass::Header,
            Self::Configuration { .. } => FaultClass::Configuration,
        }
    }

    /// Returns the address the fault refers to, when it has one.
    #[must_use]
    pub const fn address(&self) -> Option<u32> {
        match self {
            Self::OutOfBounds { address, .. }
            | Self::ReadFailure { address, .. }
            | Self::Configuration { address, .. } => Some(*address),
            Self::HeaderInvalid(_) => None,
        }
    }

    pub(crate) const fn read_failure(address: u32, size: u32, source: BackendError) -> Self {
        Self::ReadFailure {
            address,
            size,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendError, FaultClass, MonitorFault};
    use crate::SaveStateRejection;

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(
            MonitorFault::OutOfBounds {
                address: 0,
                size: 0
            }
            .class(),
            FaultClass::Bounds
        );
        assert_eq!(
            MonitorFault::read_failure(0x10, 4, BackendError::Unmapped { address: 0x10 }).class(),
            FaultClass::Read
        );
        assert_eq!(
            MonitorFault::from(SaveStateRejection::BadMagic { found: 0 }).class(),
            FaultClass::Header
        );
        assert_eq!(
            MonitorFault::Configuration {
                address: 0,
                what: "watch width",
                value: 3
            }
            .class(),
            FaultClass::Configuration
        );
    }

    #[test]
    fn display_uses_hex_addresses() {
        let fault = MonitorFault::OutOfBounds {
            address: 0xFFFF_FFF0,
            size: 0x20,
        };
        assert_eq!(
            fault.to_string(),
            "range 0xfffffff0+0x20 is outside the observable windows"
        );

        let fault =
            MonitorFault::read_failure(0x1000, 4, BackendError::DeviceFault { address: 0x1002 });
        assert_eq!(fault.to_string(), "read of 4 byte(s) at 0x00001000 failed");
        assert_eq!(fault.address(), Some(0x1000));
    }

    #[test]
    fn header_faults_have_no_address() {
        let fault = MonitorFault::from(SaveStateRejection::UnsupportedVersion { found: 9 });
        assert_eq!(fault.address(), None);
        assert!(fault.to_string().contains("version 9"));
    }
}
