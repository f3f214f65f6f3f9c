use thiserror::Error;

/// Errors raised while arranging a lab, before any binding call is made
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabError {
    #[error("device not found in lab: {device}")]
    DeviceNotFound { device: String },
    #[error("device {device} already belongs to volume group '{vg}'")]
    DeviceInUse { device: String, vg: String },
    #[error("device {device} is too small for a physical volume")]
    DeviceTooSmall { device: String },
    #[error("volume group not found in lab: {name}")]
    VgNotFound { name: String },
    #[error("logical volume not found in lab: {vg}/{name}")]
    LvNotFound { vg: String, name: String },
    #[error("'{name}' already exists")]
    AlreadyExists { name: String },
    #[error("insufficient space in '{vg}': {needed} extents needed, {free} free")]
    InsufficientSpace { vg: String, needed: u64, free: u64 },
}

pub type Result<T> = std::result::Result<T, LabError>;
