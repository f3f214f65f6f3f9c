// SPDX-License-Identifier: GPL-3.0-only

//! Data models shared by the liblvm binding and its consumers
//!
//! The handle types in `liblvm` are live views onto the native library and
//! cannot leave the thread that opened them. The types in this crate are
//! plain snapshots of the same objects, suitable for printing, serializing
//! and sending across threads:
//!
//! - `VolumeGroupInfo` → an open volume group
//! - `LogicalVolumeInfo` → a logical volume inside it
//! - `PhysicalVolumeInfo` → a physical volume inside it
//!
//! `OpenMode` and `ActivationState` are the two small enums the handles
//! expose directly.

pub mod lvm;
pub mod size;

pub use lvm::{
    ActivationState, LogicalVolumeInfo, OpenMode, ParseOpenModeError, PhysicalVolumeInfo,
    VolumeGroupInfo,
};
pub use size::{bytes_to_pretty, parse_size};
