// SPDX-License-Identifier: GPL-3.0-only

//! Safe bindings to LVM2's application library
//!
//! The library is driven through four handle types:
//!
//! - [`Lvm`] owns the library instance and opens volume groups
//! - [`VolumeGroup`] is an open volume group, read-only or writable
//! - [`LogicalVolume`] and [`PhysicalVolume`] are borrowed from an open
//!   volume group and become invalid when it is closed
//!
//! Every failure is an [`LvmError`] tagged with an [`ErrorKind`], so callers
//! can tell a retryable `Busy` or `Lock` apart from a programming error such
//! as `Capability` or `UseAfterClose`. The handles never retry on their own;
//! [`retry::deactivate_with_retry`] is there for callers that want to.
//!
//! The handles are generic over a [`Backend`]. The `native` feature provides
//! `NativeBackend`, which links against the system `liblvm2app`.

pub mod backend;
pub mod config;
pub mod error;
mod library;
mod lv;
pub mod names;
#[cfg(feature = "native")]
pub mod native;
mod pv;
pub mod retry;
mod session;
mod vg;

// Re-export commonly used types
pub use backend::{Backend, PvCounter, VgCounter, VgFlag};
pub use config::{ConfigError, LvmConfig};
pub use error::{ErrorKind, Failure, LvmError, NativeError, NativeResult, Operation, Result};
pub use library::Lvm;
pub use lv::LogicalVolume;
pub use pv::PhysicalVolume;
pub use vg::{MIN_EXTENT_SIZE, VolumeGroup};

#[cfg(feature = "native")]
pub use native::NativeBackend;

// Re-export the snapshot models
pub use lvm_types;
pub use lvm_types::{
    ActivationState, LogicalVolumeInfo, OpenMode, PhysicalVolumeInfo, VolumeGroupInfo,
};
