//! LVM (Logical Volume Manager) types
//!
//! Snapshot types for volume groups, logical volumes and physical volumes,
//! plus the open mode and activation state enums used by the handles.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access mode a volume group is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    /// Shared read access; every mutation is refused
    Read,
    /// Exclusive write access
    Write,
}

impl OpenMode {
    /// Mode string understood by `lvm_vg_open`
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, OpenMode::Write)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => f.write_str("read"),
            OpenMode::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid open mode '{0}': expected 'r' or 'w'")]
pub struct ParseOpenModeError(pub String);

impl FromStr for OpenMode {
    type Err = ParseOpenModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            other => Err(ParseOpenModeError(other.to_string())),
        }
    }
}

/// Lifecycle state of a logical volume handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    Active,
    Inactive,
    /// Terminal: the volume no longer exists
    Removed,
}

impl ActivationState {
    pub fn from_active(active: bool) -> Self {
        if active {
            ActivationState::Active
        } else {
            ActivationState::Inactive
        }
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivationState::Active => "active",
            ActivationState::Inactive => "inactive",
            ActivationState::Removed => "removed",
        };
        f.write_str(label)
    }
}

/// Volume group information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroupInfo {
    /// Volume group name
    pub name: String,

    /// Volume group UUID
    pub uuid: String,

    /// Mode the handle was opened with
    pub mode: OpenMode,

    /// Metadata sequence number
    pub seqno: u64,

    /// Total size in bytes
    pub size: u64,

    /// Free space in bytes
    pub free: u64,

    /// Extent size in bytes
    pub extent_size: u64,

    /// Total number of extents
    pub extent_count: u64,

    /// Number of unallocated extents
    pub free_extent_count: u64,

    /// Number of physical volumes
    pub pv_count: u64,

    /// Number of logical volumes
    pub lv_count: u64,

    /// Volume group tags
    pub tags: BTreeSet<String>,
}

impl VolumeGroupInfo {
    /// Get used space in bytes
    pub fn used(&self) -> u64 {
        self.size.saturating_sub(self.free)
    }

    /// Get usage percentage (0-100)
    pub fn usage_percent(&self) -> u32 {
        if self.size == 0 {
            0
        } else {
            ((self.used() as f64 / self.size as f64) * 100.0) as u32
        }
    }
}

/// Logical volume information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolumeInfo {
    /// Logical volume name
    pub name: String,

    /// Parent volume group name
    pub vg_name: String,

    /// Logical volume UUID
    pub uuid: String,

    /// Size in bytes
    pub size: u64,

    /// Activation state
    pub state: ActivationState,

    /// Whether the device-mapper table is suspended
    pub suspended: bool,

    /// Logical volume tags
    pub tags: BTreeSet<String>,
}

impl LogicalVolumeInfo {
    /// Get a display name for this logical volume
    pub fn display_name(&self) -> String {
        // Prefer short form: vg/lv
        if !self.vg_name.is_empty() {
            format!("{}/{}", self.vg_name, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Device node path as created by udev (e.g., "/dev/vg0/lv0")
    pub fn device_path(&self) -> String {
        format!("/dev/{}/{}", self.vg_name, self.name)
    }
}

/// Physical volume information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalVolumeInfo {
    /// Device path (e.g., "/dev/sda1")
    pub device: String,

    /// Volume group name
    pub vg_name: String,

    /// Physical volume UUID
    pub uuid: String,

    /// Usable size in bytes
    pub size: u64,

    /// Size of the underlying device in bytes
    pub dev_size: u64,

    /// Free space in bytes
    pub free: u64,

    /// Number of metadata areas
    pub mda_count: u64,
}

impl PhysicalVolumeInfo {
    /// Get used space in bytes
    pub fn used(&self) -> u64 {
        self.size.saturating_sub(self.free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_mode_parses_short_and_long_forms() {
        assert_eq!("r".parse::<OpenMode>(), Ok(OpenMode::Read));
        assert_eq!("w".parse::<OpenMode>(), Ok(OpenMode::Write));
        assert_eq!("write".parse::<OpenMode>(), Ok(OpenMode::Write));
        assert!("rw".parse::<OpenMode>().is_err());
        assert_eq!(OpenMode::Write.as_str(), "w");
        assert!(!OpenMode::Read.is_writable());
    }

    #[test]
    fn vg_usage_is_computed_from_free_space() {
        let info = VolumeGroupInfo {
            name: "vg0".to_string(),
            uuid: "abc".to_string(),
            mode: OpenMode::Read,
            seqno: 3,
            size: 400,
            free: 100,
            extent_size: 4,
            extent_count: 100,
            free_extent_count: 25,
            pv_count: 1,
            lv_count: 2,
            tags: BTreeSet::new(),
        };

        assert_eq!(info.used(), 300);
        assert_eq!(info.usage_percent(), 75);
    }

    #[test]
    fn lv_info_serializes_state_in_lowercase() {
        let info = LogicalVolumeInfo {
            name: "lv_foobar".to_string(),
            vg_name: "myvg".to_string(),
            uuid: "u".to_string(),
            size: 4096,
            state: ActivationState::Inactive,
            suspended: false,
            tags: BTreeSet::from(["my_tag".to_string()]),
        };

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"state\":\"inactive\""));
        assert_eq!(info.display_name(), "myvg/lv_foobar");
        assert_eq!(info.device_path(), "/dev/myvg/lv_foobar");
    }
}
