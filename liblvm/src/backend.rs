// SPDX-License-Identifier: GPL-3.0-only

//! The seam between the safe handles and an LVM implementation
//!
//! `Backend` mirrors the handle-based `lvm2app` C API one call at a time.
//! Implementations do no validation and keep no binding state; they only
//! perform the call and report `NativeError` the way the library does.
//! Lifetime tracking, mode checks and error classification live in the
//! handle types built on top.

use std::fmt::Debug;

use lvm_types::OpenMode;

use crate::error::{NativeError, NativeResult};

/// Boolean volume group attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VgFlag {
    Clustered,
    Exported,
    Partial,
}

/// Numeric volume group attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VgCounter {
    Seqno,
    Size,
    FreeSize,
    ExtentSize,
    ExtentCount,
    FreeExtentCount,
    PvCount,
    MaxPv,
    MaxLv,
}

/// Numeric physical volume attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvCounter {
    MdaCount,
    DevSize,
    Size,
    Free,
}

/// An initialized LVM library instance.
///
/// Dropping the backend releases the library (`lvm_quit`). Handles of the
/// associated types are only meaningful while the volume group they came
/// from is open; callers guarantee that.
pub trait Backend {
    type Vg: Copy + Debug;
    type Lv: Copy + Debug;
    type Pv: Copy + Debug;

    // Library
    fn library_version(&self) -> String;
    fn last_error(&self) -> NativeError;
    fn config_reload(&self) -> NativeResult<()>;
    fn config_override(&self, config: &str) -> NativeResult<()>;
    fn scan(&self) -> NativeResult<()>;
    fn list_vg_names(&self) -> NativeResult<Vec<String>>;
    fn list_vg_uuids(&self) -> NativeResult<Vec<String>>;
    fn vgname_from_pvid(&self, pvid: &str) -> NativeResult<String>;
    fn vgname_from_device(&self, device: &str) -> NativeResult<String>;

    // Volume groups
    fn vg_open(&self, name: &str, mode: OpenMode) -> NativeResult<Self::Vg>;
    fn vg_create(&self, name: &str) -> NativeResult<Self::Vg>;
    fn vg_close(&self, vg: Self::Vg) -> NativeResult<()>;
    fn vg_write(&self, vg: Self::Vg) -> NativeResult<()>;
    fn vg_remove(&self, vg: Self::Vg) -> NativeResult<()>;
    fn vg_extend(&self, vg: Self::Vg, device: &str) -> NativeResult<()>;
    fn vg_reduce(&self, vg: Self::Vg, device: &str) -> NativeResult<()>;
    fn vg_add_tag(&self, vg: Self::Vg, tag: &str) -> NativeResult<()>;
    fn vg_remove_tag(&self, vg: Self::Vg, tag: &str) -> NativeResult<()>;
    fn vg_tags(&self, vg: Self::Vg) -> NativeResult<Vec<String>>;
    fn vg_set_extent_size(&self, vg: Self::Vg, extent_size: u32) -> NativeResult<()>;
    fn vg_name(&self, vg: Self::Vg) -> String;
    fn vg_uuid(&self, vg: Self::Vg) -> String;
    fn vg_flag(&self, vg: Self::Vg, flag: VgFlag) -> bool;
    fn vg_counter(&self, vg: Self::Vg, counter: VgCounter) -> u64;
    fn vg_list_lvs(&self, vg: Self::Vg) -> NativeResult<Vec<Self::Lv>>;
    fn vg_list_pvs(&self, vg: Self::Vg) -> NativeResult<Vec<Self::Pv>>;
    fn vg_create_lv_linear(&self, vg: Self::Vg, name: &str, size: u64) -> NativeResult<Self::Lv>;
    fn lv_from_name(&self, vg: Self::Vg, name: &str) -> NativeResult<Self::Lv>;
    fn lv_from_uuid(&self, vg: Self::Vg, uuid: &str) -> NativeResult<Self::Lv>;
    fn pv_from_name(&self, vg: Self::Vg, name: &str) -> NativeResult<Self::Pv>;

    // Logical volumes
    fn lv_name(&self, lv: Self::Lv) -> String;
    fn lv_uuid(&self, lv: Self::Lv) -> String;
    fn lv_size(&self, lv: Self::Lv) -> u64;
    fn lv_is_active(&self, lv: Self::Lv) -> bool;
    fn lv_is_suspended(&self, lv: Self::Lv) -> bool;
    fn lv_tags(&self, lv: Self::Lv) -> NativeResult<Vec<String>>;
    fn lv_add_tag(&self, lv: Self::Lv, tag: &str) -> NativeResult<()>;
    fn lv_remove_tag(&self, lv: Self::Lv, tag: &str) -> NativeResult<()>;
    fn lv_activate(&self, lv: Self::Lv) -> NativeResult<()>;
    fn lv_deactivate(&self, lv: Self::Lv) -> NativeResult<()>;
    fn lv_remove(&self, lv: Self::Lv) -> NativeResult<()>;
    fn lv_resize(&self, lv: Self::Lv, new_size: u64) -> NativeResult<()>;

    // Physical volumes
    fn pv_name(&self, pv: Self::Pv) -> String;
    fn pv_uuid(&self, pv: Self::Pv) -> String;
    fn pv_counter(&self, pv: Self::Pv, counter: PvCounter) -> u64;
    fn pv_resize(&self, pv: Self::Pv, new_size: u64) -> NativeResult<()>;
}
