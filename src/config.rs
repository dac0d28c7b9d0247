//! Version, update mode, and runtime configuration flags.

use bitflags::bitflags;

use crate::consts::{SECTOR_SIZE_V3, SECTOR_SIZE_V4};

/// CFB major format version. Controls sector size and shrink/compact eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// 512-byte sectors.
    V3,
    /// 4096-byte sectors.
    V4,
}

impl Version {
    /// Regular sector size for this version.
    pub fn sector_size(self) -> usize {
        match self {
            Version::V3 => SECTOR_SIZE_V3,
            Version::V4 => SECTOR_SIZE_V4,
        }
    }

    /// `SectorShift` header field for this version.
    pub fn sector_shift(self) -> u16 {
        match self {
            Version::V3 => 9,
            Version::V4 => 12,
        }
    }

    /// Reconstructs a version from a header's major version field.
    pub fn from_major(major: u16) -> Option<Version> {
        match major {
            3 => Some(Version::V3),
            4 => Some(Version::V4),
            _ => None,
        }
    }

    /// `DllVersion` major number stored back into the header.
    pub fn major(self) -> u16 {
        match self {
            Version::V3 => 3,
            Version::V4 => 4,
        }
    }
}

/// Whether an open engine may persist mutations in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Mutations are kept in memory; `Commit` is unavailable, only `Save` to a new destination.
    ReadOnly,
    /// Mutations may be flushed back into the backing stream via `Commit`.
    Update,
}

bitflags! {
    /// Runtime behaviour flags. All-off equals the legacy default.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CfbConfiguration: u32 {
        /// Reuse freed sectors from the recycle queue before appending new ones.
        const SECTOR_RECYCLE = 0b0001;
        /// Zero freed sector bodies instead of leaving stale bytes behind.
        const ERASE_FREE_SECTORS = 0b0010;
        /// Downgrade select corruption findings to a best-effort skip instead of failing.
        const NO_VALIDATION_EXCEPTION = 0b0100;
        /// Do not close the backing stream when the engine closes.
        const LEAVE_OPEN = 0b1000;
    }
}

impl Default for CfbConfiguration {
    fn default() -> Self {
        CfbConfiguration::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_sector_sizes_match_format() {
        assert_eq!(Version::V3.sector_size(), 512);
        assert_eq!(Version::V4.sector_size(), 4096);
        assert_eq!(Version::V3.sector_shift(), 9);
        assert_eq!(Version::V4.sector_shift(), 12);
    }

    #[test]
    fn from_major_rejects_unknown_versions() {
        assert_eq!(Version::from_major(3), Some(Version::V3));
        assert_eq!(Version::from_major(4), Some(Version::V4));
        assert_eq!(Version::from_major(5), None);
    }

    #[test]
    fn default_configuration_is_empty() {
        assert_eq!(CfbConfiguration::default(), CfbConfiguration::empty());
        assert!(!CfbConfiguration::default().contains(CfbConfiguration::SECTOR_RECYCLE));
    }
}
