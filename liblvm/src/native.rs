// SPDX-License-Identifier: GPL-3.0-only

//! `Backend` implementation over the system `liblvm2app`

use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use libc::{c_char, c_int};
use liblvm_sys as sys;
use lvm_types::OpenMode;

use crate::backend::{Backend, PvCounter, VgCounter, VgFlag};
use crate::error::{ErrorKind, LvmError, NativeError, NativeResult, Operation, Result};

/// Set while a `NativeBackend` is alive. lvm2app keeps global state
/// (locking, device cache) that does not survive two concurrent handles.
static LIVE: AtomicBool = AtomicBool::new(false);

fn copy_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: lvm2app returns NUL-terminated strings that stay valid at
    // least until the owning volume group is closed; we copy right away.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

fn to_cstring(value: &str) -> NativeResult<CString> {
    CString::new(value)
        .map_err(|_| NativeError::new(libc::EINVAL, format!("'{value}' contains a NUL byte")))
}

/// An initialized `lvm_t`
pub struct NativeBackend {
    handle: sys::lvm_t,
}

impl NativeBackend {
    /// Initialize the library, reading `lvm.conf` from `system_dir` when given.
    pub fn init(system_dir: Option<&Path>) -> Result<Self> {
        let init_error = |detail: String| {
            LvmError::binding(ErrorKind::Initialization, Operation::Init, "lvm2app", detail)
        };

        if LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(init_error(
                "another library handle is already open in this process".to_string(),
            ));
        }

        let system_dir = match system_dir {
            Some(dir) => match CString::new(dir.as_os_str().as_encoded_bytes()) {
                Ok(dir) => Some(dir),
                Err(_) => {
                    LIVE.store(false, Ordering::Release);
                    return Err(init_error(format!("invalid system dir {dir:?}")));
                }
            },
            None => None,
        };
        let dir_ptr = system_dir.as_ref().map_or(std::ptr::null(), |dir| dir.as_ptr());

        // SAFETY: dir_ptr is NULL or a valid C string that outlives the call.
        let handle = unsafe { sys::lvm_init(dir_ptr) };
        if handle.is_null() {
            LIVE.store(false, Ordering::Release);
            return Err(init_error("lvm_init returned no handle".to_string()));
        }

        let backend = Self { handle };
        let status = backend.last_error();
        if status.errno != 0 {
            // Dropping the backend quits the library and clears LIVE.
            drop(backend);
            return Err(crate::error::classify(Operation::Init, "lvm2app", status));
        }

        tracing::debug!(?system_dir, "lvm2app initialized");
        Ok(backend)
    }

    fn check(&self, rc: c_int) -> NativeResult<()> {
        if rc == 0 { Ok(()) } else { Err(self.last_error()) }
    }

    /// Error for a NULL return, substituting `fallback` when lvm2app left
    /// no errno behind.
    fn null_error(&self, fallback: c_int, message: impl Into<String>) -> NativeError {
        let err = self.last_error();
        if err.errno != 0 {
            err
        } else {
            NativeError::new(fallback, message)
        }
    }

    fn str_list(&self, head: *mut sys::dm_list, what: &str) -> NativeResult<Vec<String>> {
        // String lists come back as an allocated (possibly empty) head;
        // NULL only on failure.
        if head.is_null() {
            return Err(self.null_error(libc::ENOMEM, format!("cannot list {what}")));
        }
        // SAFETY: lvm2app string lists are well-formed lvm_str_list rings.
        let nodes = unsafe { sys::dm_list_iter::<sys::lvm_str_list>(head) };
        Ok(nodes
            .filter_map(|node| copy_str(unsafe { (*node).str_ }))
            .collect())
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        // SAFETY: handle came from lvm_init and is released exactly once.
        unsafe { sys::lvm_quit(self.handle) };
        LIVE.store(false, Ordering::Release);
        tracing::debug!("lvm2app released");
    }
}

impl Backend for NativeBackend {
    type Vg = sys::vg_t;
    type Lv = sys::lv_t;
    type Pv = sys::pv_t;

    fn library_version(&self) -> String {
        copy_str(unsafe { sys::lvm_library_get_version() }).unwrap_or_default()
    }

    fn last_error(&self) -> NativeError {
        let errno = unsafe { sys::lvm_errno(self.handle) };
        let message = copy_str(unsafe { sys::lvm_errmsg(self.handle) }).unwrap_or_default();
        NativeError::new(errno, message)
    }

    fn config_reload(&self) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_config_reload(self.handle) })
    }

    fn config_override(&self, config: &str) -> NativeResult<()> {
        let config = to_cstring(config)?;
        self.check(unsafe { sys::lvm_config_override(self.handle, config.as_ptr()) })
    }

    fn scan(&self) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_scan(self.handle) })
    }

    fn list_vg_names(&self) -> NativeResult<Vec<String>> {
        self.str_list(unsafe { sys::lvm_list_vg_names(self.handle) }, "vg names")
    }

    fn list_vg_uuids(&self) -> NativeResult<Vec<String>> {
        self.str_list(unsafe { sys::lvm_list_vg_uuids(self.handle) }, "vg uuids")
    }

    fn vgname_from_pvid(&self, pvid: &str) -> NativeResult<String> {
        let pvid_c = to_cstring(pvid)?;
        copy_str(unsafe { sys::lvm_vgname_from_pvid(self.handle, pvid_c.as_ptr()) }).ok_or_else(
            || self.null_error(libc::ENOENT, format!("no volume group owns pvid {pvid}")),
        )
    }

    fn vgname_from_device(&self, device: &str) -> NativeResult<String> {
        let device_c = to_cstring(device)?;
        copy_str(unsafe { sys::lvm_vgname_from_device(self.handle, device_c.as_ptr()) })
            .ok_or_else(|| {
                self.null_error(libc::ENOENT, format!("no volume group on device {device}"))
            })
    }

    fn vg_open(&self, name: &str, mode: OpenMode) -> NativeResult<Self::Vg> {
        let name_c = to_cstring(name)?;
        let mode_c = to_cstring(mode.as_str())?;
        let vg = unsafe { sys::lvm_vg_open(self.handle, name_c.as_ptr(), mode_c.as_ptr(), 0) };
        if vg.is_null() {
            Err(self.null_error(libc::ENOENT, format!("volume group {name} not found")))
        } else {
            Ok(vg)
        }
    }

    fn vg_create(&self, name: &str) -> NativeResult<Self::Vg> {
        let name_c = to_cstring(name)?;
        let vg = unsafe { sys::lvm_vg_create(self.handle, name_c.as_ptr()) };
        if vg.is_null() {
            Err(self.null_error(libc::EINVAL, format!("cannot create volume group {name}")))
        } else {
            Ok(vg)
        }
    }

    fn vg_close(&self, vg: Self::Vg) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_vg_close(vg) })
    }

    fn vg_write(&self, vg: Self::Vg) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_vg_write(vg) })
    }

    fn vg_remove(&self, vg: Self::Vg) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_vg_remove(vg) })
    }

    fn vg_extend(&self, vg: Self::Vg, device: &str) -> NativeResult<()> {
        let device = to_cstring(device)?;
        self.check(unsafe { sys::lvm_vg_extend(vg, device.as_ptr()) })
    }

    fn vg_reduce(&self, vg: Self::Vg, device: &str) -> NativeResult<()> {
        let device = to_cstring(device)?;
        self.check(unsafe { sys::lvm_vg_reduce(vg, device.as_ptr()) })
    }

    fn vg_add_tag(&self, vg: Self::Vg, tag: &str) -> NativeResult<()> {
        let tag = to_cstring(tag)?;
        self.check(unsafe { sys::lvm_vg_add_tag(vg, tag.as_ptr()) })
    }

    fn vg_remove_tag(&self, vg: Self::Vg, tag: &str) -> NativeResult<()> {
        let tag = to_cstring(tag)?;
        self.check(unsafe { sys::lvm_vg_remove_tag(vg, tag.as_ptr()) })
    }

    fn vg_tags(&self, vg: Self::Vg) -> NativeResult<Vec<String>> {
        self.str_list(unsafe { sys::lvm_vg_get_tags(vg) }, "vg tags")
    }

    fn vg_set_extent_size(&self, vg: Self::Vg, extent_size: u32) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_vg_set_extent_size(vg, extent_size) })
    }

    fn vg_name(&self, vg: Self::Vg) -> String {
        copy_str(unsafe { sys::lvm_vg_get_name(vg) }).unwrap_or_default()
    }

    fn vg_uuid(&self, vg: Self::Vg) -> String {
        copy_str(unsafe { sys::lvm_vg_get_uuid(vg) }).unwrap_or_default()
    }

    fn vg_flag(&self, vg: Self::Vg, flag: VgFlag) -> bool {
        let value = unsafe {
            match flag {
                VgFlag::Clustered => sys::lvm_vg_is_clustered(vg),
                VgFlag::Exported => sys::lvm_vg_is_exported(vg),
                VgFlag::Partial => sys::lvm_vg_is_partial(vg),
            }
        };
        value != 0
    }

    fn vg_counter(&self, vg: Self::Vg, counter: VgCounter) -> u64 {
        unsafe {
            match counter {
                VgCounter::Seqno => sys::lvm_vg_get_seqno(vg),
                VgCounter::Size => sys::lvm_vg_get_size(vg),
                VgCounter::FreeSize => sys::lvm_vg_get_free_size(vg),
                VgCounter::ExtentSize => sys::lvm_vg_get_extent_size(vg),
                VgCounter::ExtentCount => sys::lvm_vg_get_extent_count(vg),
                VgCounter::FreeExtentCount => sys::lvm_vg_get_free_extent_count(vg),
                VgCounter::PvCount => sys::lvm_vg_get_pv_count(vg),
                VgCounter::MaxPv => sys::lvm_vg_get_max_pv(vg),
                VgCounter::MaxLv => sys::lvm_vg_get_max_lv(vg),
            }
        }
    }

    fn vg_list_lvs(&self, vg: Self::Vg) -> NativeResult<Vec<Self::Lv>> {
        // lvm2app returns NULL for an empty group. Its errno is sticky and
        // may still hold an earlier failure, so it is not consulted here.
        let head = unsafe { sys::lvm_vg_list_lvs(vg) };
        if head.is_null() {
            tracing::trace!("vg_list_lvs: no logical volumes");
            return Ok(Vec::new());
        }
        let nodes = unsafe { sys::dm_list_iter::<sys::lvm_lv_list>(head) };
        Ok(nodes.map(|node| unsafe { (*node).lv }).collect())
    }

    fn vg_list_pvs(&self, vg: Self::Vg) -> NativeResult<Vec<Self::Pv>> {
        let head = unsafe { sys::lvm_vg_list_pvs(vg) };
        if head.is_null() {
            tracing::trace!("vg_list_pvs: no physical volumes");
            return Ok(Vec::new());
        }
        let nodes = unsafe { sys::dm_list_iter::<sys::lvm_pv_list>(head) };
        Ok(nodes.map(|node| unsafe { (*node).pv }).collect())
    }

    fn vg_create_lv_linear(&self, vg: Self::Vg, name: &str, size: u64) -> NativeResult<Self::Lv> {
        let name_c = to_cstring(name)?;
        let lv = unsafe { sys::lvm_vg_create_lv_linear(vg, name_c.as_ptr(), size) };
        if lv.is_null() {
            Err(self.null_error(libc::EINVAL, format!("cannot create logical volume {name}")))
        } else {
            Ok(lv)
        }
    }

    fn lv_from_name(&self, vg: Self::Vg, name: &str) -> NativeResult<Self::Lv> {
        let name_c = to_cstring(name)?;
        let lv = unsafe { sys::lvm_lv_from_name(vg, name_c.as_ptr()) };
        if lv.is_null() {
            Err(self.null_error(libc::ENOENT, format!("logical volume {name} not found")))
        } else {
            Ok(lv)
        }
    }

    fn lv_from_uuid(&self, vg: Self::Vg, uuid: &str) -> NativeResult<Self::Lv> {
        let uuid_c = to_cstring(uuid)?;
        let lv = unsafe { sys::lvm_lv_from_uuid(vg, uuid_c.as_ptr()) };
        if lv.is_null() {
            Err(self.null_error(libc::ENOENT, format!("logical volume {uuid} not found")))
        } else {
            Ok(lv)
        }
    }

    fn pv_from_name(&self, vg: Self::Vg, name: &str) -> NativeResult<Self::Pv> {
        let name_c = to_cstring(name)?;
        let pv = unsafe { sys::lvm_pv_from_name(vg, name_c.as_ptr()) };
        if pv.is_null() {
            Err(self.null_error(libc::ENOENT, format!("physical volume {name} not found")))
        } else {
            Ok(pv)
        }
    }

    fn lv_name(&self, lv: Self::Lv) -> String {
        copy_str(unsafe { sys::lvm_lv_get_name(lv) }).unwrap_or_default()
    }

    fn lv_uuid(&self, lv: Self::Lv) -> String {
        copy_str(unsafe { sys::lvm_lv_get_uuid(lv) }).unwrap_or_default()
    }

    fn lv_size(&self, lv: Self::Lv) -> u64 {
        unsafe { sys::lvm_lv_get_size(lv) }
    }

    fn lv_is_active(&self, lv: Self::Lv) -> bool {
        unsafe { sys::lvm_lv_is_active(lv) != 0 }
    }

    fn lv_is_suspended(&self, lv: Self::Lv) -> bool {
        unsafe { sys::lvm_lv_is_suspended(lv) != 0 }
    }

    fn lv_tags(&self, lv: Self::Lv) -> NativeResult<Vec<String>> {
        self.str_list(unsafe { sys::lvm_lv_get_tags(lv) }, "lv tags")
    }

    fn lv_add_tag(&self, lv: Self::Lv, tag: &str) -> NativeResult<()> {
        let tag = to_cstring(tag)?;
        self.check(unsafe { sys::lvm_lv_add_tag(lv, tag.as_ptr()) })
    }

    fn lv_remove_tag(&self, lv: Self::Lv, tag: &str) -> NativeResult<()> {
        let tag = to_cstring(tag)?;
        self.check(unsafe { sys::lvm_lv_remove_tag(lv, tag.as_ptr()) })
    }

    fn lv_activate(&self, lv: Self::Lv) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_lv_activate(lv) })
    }

    fn lv_deactivate(&self, lv: Self::Lv) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_lv_deactivate(lv) })
    }

    fn lv_remove(&self, lv: Self::Lv) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_vg_remove_lv(lv) })
    }

    fn lv_resize(&self, lv: Self::Lv, new_size: u64) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_lv_resize(lv, new_size) })
    }

    fn pv_name(&self, pv: Self::Pv) -> String {
        copy_str(unsafe { sys::lvm_pv_get_name(pv) }).unwrap_or_default()
    }

    fn pv_uuid(&self, pv: Self::Pv) -> String {
        copy_str(unsafe { sys::lvm_pv_get_uuid(pv) }).unwrap_or_default()
    }

    fn pv_counter(&self, pv: Self::Pv, counter: PvCounter) -> u64 {
        unsafe {
            match counter {
                PvCounter::MdaCount => sys::lvm_pv_get_mda_count(pv),
                PvCounter::DevSize => sys::lvm_pv_get_dev_size(pv),
                PvCounter::Size => sys::lvm_pv_get_size(pv),
                PvCounter::Free => sys::lvm_pv_get_free(pv),
            }
        }
    }

    fn pv_resize(&self, pv: Self::Pv, new_size: u64) -> NativeResult<()> {
        self.check(unsafe { sys::lvm_pv_resize(pv, new_size) })
    }
}
