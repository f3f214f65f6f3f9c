// SPDX-License-Identifier: GPL-3.0-only

//! Raw bindings to LVM2's application library (`lvm2app.h`)
//!
//! Every object is represented by an opaque handle. A library handle
//! (`lvm_t`) is obtained with `lvm_init` and released with `lvm_quit`; volume
//! group handles (`vg_t`) are opened through it and closed with
//! `lvm_vg_close`; logical and physical volume handles (`lv_t`, `pv_t`) are
//! borrowed from an open volume group and die with it.
//!
//! Functions returning `c_int` report failure as `-1`; functions returning a
//! pointer report failure as NULL. In both cases `lvm_errno` and
//! `lvm_errmsg` on the library handle describe the failure.
//!
//! Strings returned by the `*_get_name` / `*_get_uuid` getters are
//! allocated from the volume group's memory pool and must be copied before
//! the volume group is closed.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int};

/// Opaque library context
#[repr(C)]
pub struct lvm {
    _private: [u8; 0],
}

/// Opaque volume group
#[repr(C)]
pub struct volume_group {
    _private: [u8; 0],
}

/// Opaque logical volume
#[repr(C)]
pub struct logical_volume {
    _private: [u8; 0],
}

/// Opaque physical volume
#[repr(C)]
pub struct physical_volume {
    _private: [u8; 0],
}

pub type lvm_t = *mut lvm;
pub type vg_t = *mut volume_group;
pub type lv_t = *mut logical_volume;
pub type pv_t = *mut physical_volume;

/// Intrusive circular doubly linked list head from libdevmapper
#[repr(C)]
#[derive(Debug)]
pub struct dm_list {
    pub n: *mut dm_list,
    pub p: *mut dm_list,
}

/// List node carrying a string (names, UUIDs, tags)
#[repr(C)]
pub struct lvm_str_list {
    pub list: dm_list,
    pub str_: *const c_char,
}

/// List node carrying a logical volume handle
#[repr(C)]
pub struct lvm_lv_list {
    pub list: dm_list,
    pub lv: lv_t,
}

/// List node carrying a physical volume handle
#[repr(C)]
pub struct lvm_pv_list {
    pub list: dm_list,
    pub pv: pv_t,
}

/// Marker for list node types whose first field is the embedded `dm_list`.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a `dm_list` as their first field,
/// so that a `*const dm_list` pointing at a node can be cast to the node.
pub unsafe trait DmListNode {}

unsafe impl DmListNode for lvm_str_list {}
unsafe impl DmListNode for lvm_lv_list {}
unsafe impl DmListNode for lvm_pv_list {}

/// Iterator over the nodes of a `dm_list`, yielding raw node pointers.
pub struct DmListIter<T> {
    head: *const dm_list,
    cursor: *const dm_list,
    _node: std::marker::PhantomData<*const T>,
}

impl<T: DmListNode> Iterator for DmListIter<T> {
    type Item = *const T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_null() || self.cursor == self.head {
            return None;
        }
        let node = self.cursor as *const T;
        // SAFETY: the caller of `dm_list_iter` guaranteed a well-formed list.
        self.cursor = unsafe { (*self.cursor).n };
        Some(node)
    }
}

/// Iterate the nodes of the list headed by `head`.
///
/// A NULL head yields nothing.
///
/// # Safety
///
/// `head` must be NULL or point to a well-formed circular `dm_list` whose
/// nodes are all of type `T`, and the list must outlive the iterator.
pub unsafe fn dm_list_iter<T: DmListNode>(head: *const dm_list) -> DmListIter<T> {
    let cursor = if head.is_null() {
        std::ptr::null()
    } else {
        unsafe { (*head).n }
    };
    DmListIter {
        head,
        cursor,
        _node: std::marker::PhantomData,
    }
}

unsafe extern "C" {
    // Library
    pub fn lvm_init(system_dir: *const c_char) -> lvm_t;
    pub fn lvm_quit(libh: lvm_t);
    pub fn lvm_config_reload(libh: lvm_t) -> c_int;
    pub fn lvm_config_override(libh: lvm_t, config_string: *const c_char) -> c_int;
    pub fn lvm_errno(libh: lvm_t) -> c_int;
    pub fn lvm_errmsg(libh: lvm_t) -> *const c_char;
    pub fn lvm_scan(libh: lvm_t) -> c_int;
    pub fn lvm_library_get_version() -> *const c_char;
    pub fn lvm_list_vg_names(libh: lvm_t) -> *mut dm_list;
    pub fn lvm_list_vg_uuids(libh: lvm_t) -> *mut dm_list;
    pub fn lvm_vgname_from_pvid(libh: lvm_t, pvid: *const c_char) -> *const c_char;
    pub fn lvm_vgname_from_device(libh: lvm_t, device: *const c_char) -> *const c_char;

    // Volume groups
    pub fn lvm_vg_open(
        libh: lvm_t,
        vgname: *const c_char,
        mode: *const c_char,
        flags: u32,
    ) -> vg_t;
    pub fn lvm_vg_create(libh: lvm_t, vg_name: *const c_char) -> vg_t;
    pub fn lvm_vg_write(vg: vg_t) -> c_int;
    pub fn lvm_vg_remove(vg: vg_t) -> c_int;
    pub fn lvm_vg_close(vg: vg_t) -> c_int;
    pub fn lvm_vg_extend(vg: vg_t, device: *const c_char) -> c_int;
    pub fn lvm_vg_reduce(vg: vg_t, device: *const c_char) -> c_int;
    pub fn lvm_vg_add_tag(vg: vg_t, tag: *const c_char) -> c_int;
    pub fn lvm_vg_remove_tag(vg: vg_t, tag: *const c_char) -> c_int;
    pub fn lvm_vg_set_extent_size(vg: vg_t, new_size: u32) -> c_int;
    pub fn lvm_vg_is_clustered(vg: vg_t) -> u64;
    pub fn lvm_vg_is_exported(vg: vg_t) -> u64;
    pub fn lvm_vg_is_partial(vg: vg_t) -> u64;
    pub fn lvm_vg_get_seqno(vg: vg_t) -> u64;
    pub fn lvm_vg_get_uuid(vg: vg_t) -> *const c_char;
    pub fn lvm_vg_get_name(vg: vg_t) -> *const c_char;
    pub fn lvm_vg_get_size(vg: vg_t) -> u64;
    pub fn lvm_vg_get_free_size(vg: vg_t) -> u64;
    pub fn lvm_vg_get_extent_size(vg: vg_t) -> u64;
    pub fn lvm_vg_get_extent_count(vg: vg_t) -> u64;
    pub fn lvm_vg_get_free_extent_count(vg: vg_t) -> u64;
    pub fn lvm_vg_get_pv_count(vg: vg_t) -> u64;
    pub fn lvm_vg_get_max_pv(vg: vg_t) -> u64;
    pub fn lvm_vg_get_max_lv(vg: vg_t) -> u64;
    pub fn lvm_vg_get_tags(vg: vg_t) -> *mut dm_list;
    pub fn lvm_vg_list_lvs(vg: vg_t) -> *mut dm_list;
    pub fn lvm_vg_list_pvs(vg: vg_t) -> *mut dm_list;
    pub fn lvm_vg_create_lv_linear(vg: vg_t, name: *const c_char, size: u64) -> lv_t;
    pub fn lvm_lv_from_name(vg: vg_t, name: *const c_char) -> lv_t;
    pub fn lvm_lv_from_uuid(vg: vg_t, uuid: *const c_char) -> lv_t;
    pub fn lvm_pv_from_name(vg: vg_t, name: *const c_char) -> pv_t;

    // Logical volumes
    pub fn lvm_vg_remove_lv(lv: lv_t) -> c_int;
    pub fn lvm_lv_activate(lv: lv_t) -> c_int;
    pub fn lvm_lv_deactivate(lv: lv_t) -> c_int;
    pub fn lvm_lv_get_uuid(lv: lv_t) -> *const c_char;
    pub fn lvm_lv_get_name(lv: lv_t) -> *const c_char;
    pub fn lvm_lv_get_size(lv: lv_t) -> u64;
    pub fn lvm_lv_is_active(lv: lv_t) -> u64;
    pub fn lvm_lv_is_suspended(lv: lv_t) -> u64;
    pub fn lvm_lv_add_tag(lv: lv_t, tag: *const c_char) -> c_int;
    pub fn lvm_lv_remove_tag(lv: lv_t, tag: *const c_char) -> c_int;
    pub fn lvm_lv_get_tags(lv: lv_t) -> *mut dm_list;
    pub fn lvm_lv_resize(lv: lv_t, new_size: u64) -> c_int;

    // Physical volumes
    pub fn lvm_pv_get_uuid(pv: pv_t) -> *const c_char;
    pub fn lvm_pv_get_name(pv: pv_t) -> *const c_char;
    pub fn lvm_pv_get_mda_count(pv: pv_t) -> u64;
    pub fn lvm_pv_get_dev_size(pv: pv_t) -> u64;
    pub fn lvm_pv_get_size(pv: pv_t) -> u64;
    pub fn lvm_pv_get_free(pv: pv_t) -> u64;
    pub fn lvm_pv_resize(pv: pv_t, new_size: u64) -> c_int;
}
