// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::rc::Rc;

use lvm_types::{OpenMode, VolumeGroupInfo};

use crate::backend::{Backend, VgCounter, VgFlag};
use crate::error::{ErrorKind, LvmError, Operation, Result};
use crate::lv::LogicalVolume;
use crate::names::{validate_device, validate_lv_name, validate_tag};
use crate::pv::PhysicalVolume;
use crate::session::{Session, VgState};

/// Smallest extent size LVM accepts, in bytes
pub const MIN_EXTENT_SIZE: u32 = 1024;

/// An open volume group.
///
/// Logical and physical volume handles obtained from it stay valid until
/// [`VolumeGroup::close`] is called, the group is dropped, or the owning
/// library handle is closed.
pub struct VolumeGroup<B: Backend> {
    session: Rc<Session<B>>,
    handle: B::Vg,
    state: Rc<VgState>,
}

impl<B: Backend> std::fmt::Debug for VolumeGroup<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeGroup")
            .field("name", &self.state.name)
            .field("mode", &self.state.mode)
            .field("open", &self.is_open())
            .finish()
    }
}

impl<B: Backend> VolumeGroup<B> {
    pub(crate) fn new(session: Rc<Session<B>>, handle: B::Vg, state: Rc<VgState>) -> Self {
        Self {
            session,
            handle,
            state,
        }
    }

    fn live(&self, operation: Operation) -> Result<()> {
        if self.state.is_open() && self.session.is_open() {
            Ok(())
        } else {
            Err(LvmError::closed(operation, &self.state.name, "volume group handle"))
        }
    }

    fn writable(&self, operation: Operation) -> Result<()> {
        self.live(operation)?;
        if self.state.mode.is_writable() {
            Ok(())
        } else {
            Err(LvmError::read_only(operation, &self.state.name))
        }
    }

    fn query<T>(&self, f: impl FnOnce(&B, B::Vg) -> T) -> Result<T> {
        self.live(Operation::VgQuery)?;
        let handle = self.handle;
        self.session
            .query(Operation::VgQuery, &self.state.name, |backend| f(backend, handle))
    }

    fn counter(&self, counter: VgCounter) -> Result<u64> {
        self.query(|backend, vg| backend.vg_counter(vg, counter))
    }

    fn flag(&self, flag: VgFlag) -> Result<bool> {
        self.query(|backend, vg| backend.vg_flag(vg, flag))
    }

    /// Commit the in-memory metadata of this volume group to disk
    pub fn write(&self) -> Result<()> {
        self.writable(Operation::VgWrite)?;
        let handle = self.handle;
        self.session
            .call(Operation::VgWrite, &self.state.name, |backend| backend.vg_write(handle))
    }

    /// Release the handle and its lock. Idempotent.
    ///
    /// Every logical and physical volume handle obtained from this group
    /// reports `UseAfterClose` afterwards.
    pub fn close(&self) -> Result<()> {
        self.session.release_vg(&self.state, self.handle)
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open() && self.session.is_open()
    }

    pub fn mode(&self) -> OpenMode {
        self.state.mode
    }

    pub fn name(&self) -> Result<String> {
        self.query(|backend, vg| backend.vg_name(vg))
    }

    pub fn uuid(&self) -> Result<String> {
        self.query(|backend, vg| backend.vg_uuid(vg))
    }

    /// Remove the volume group from disk and close the handle
    pub fn remove(&self) -> Result<()> {
        self.writable(Operation::VgRemove)?;
        let handle = self.handle;
        self.session
            .call(Operation::VgRemove, &self.state.name, |backend| backend.vg_remove(handle))?;
        self.session
            .call(Operation::VgWrite, &self.state.name, |backend| backend.vg_write(handle))?;
        tracing::info!(vg = %self.state.name, "Removed volume group");
        self.close()
    }

    /// Add a physical volume (initializing it if needed) and commit
    pub fn extend(&self, device: &str) -> Result<()> {
        self.writable(Operation::VgExtend)?;
        validate_device(Operation::VgExtend, device)?;
        let handle = self.handle;
        let target = format!("{}:{}", self.state.name, device);
        self.session
            .call(Operation::VgExtend, &target, |backend| backend.vg_extend(handle, device))?;
        self.write()?;
        tracing::info!(vg = %self.state.name, device, "Extended volume group");
        Ok(())
    }

    /// Remove an unused physical volume and commit
    pub fn reduce(&self, device: &str) -> Result<()> {
        self.writable(Operation::VgReduce)?;
        validate_device(Operation::VgReduce, device)?;
        let handle = self.handle;
        let target = format!("{}:{}", self.state.name, device);
        self.session
            .call(Operation::VgReduce, &target, |backend| backend.vg_reduce(handle, device))?;
        self.write()?;
        tracing::info!(vg = %self.state.name, device, "Reduced volume group");
        Ok(())
    }

    pub fn tags(&self) -> Result<BTreeSet<String>> {
        self.live(Operation::VgTags)?;
        let handle = self.handle;
        let tags = self
            .session
            .call(Operation::VgTags, &self.state.name, |backend| backend.vg_tags(handle))?;
        Ok(tags.into_iter().collect())
    }

    /// Add a tag and commit. Adding a tag that is already present is a no-op.
    pub fn add_tag(&self, tag: &str) -> Result<()> {
        self.writable(Operation::VgAddTag)?;
        validate_tag(Operation::VgAddTag, tag)?;
        if self.tags()?.contains(tag) {
            tracing::debug!(vg = %self.state.name, tag, "Tag already present");
            return Ok(());
        }
        let handle = self.handle;
        self.session
            .call(Operation::VgAddTag, tag, |backend| backend.vg_add_tag(handle, tag))?;
        self.write()
    }

    /// Remove a tag and commit. Removing an absent tag is a no-op.
    pub fn remove_tag(&self, tag: &str) -> Result<()> {
        self.writable(Operation::VgRemoveTag)?;
        validate_tag(Operation::VgRemoveTag, tag)?;
        if !self.tags()?.contains(tag) {
            tracing::debug!(vg = %self.state.name, tag, "Tag not present");
            return Ok(());
        }
        let handle = self.handle;
        self.session
            .call(Operation::VgRemoveTag, tag, |backend| backend.vg_remove_tag(handle, tag))?;
        self.write()
    }

    /// Change the extent size. Call [`VolumeGroup::write`] to commit.
    pub fn set_extent_size(&self, extent_size: u32) -> Result<()> {
        self.writable(Operation::VgSetExtentSize)?;
        if extent_size < MIN_EXTENT_SIZE || !extent_size.is_power_of_two() {
            return Err(LvmError::binding(
                ErrorKind::InvalidArgument,
                Operation::VgSetExtentSize,
                &self.state.name,
                format!(
                    "extent size {extent_size} must be a power of two of at least {MIN_EXTENT_SIZE} bytes"
                ),
            ));
        }
        let handle = self.handle;
        self.session.call(Operation::VgSetExtentSize, &self.state.name, |backend| {
            backend.vg_set_extent_size(handle, extent_size)
        })
    }

    pub fn is_clustered(&self) -> Result<bool> {
        self.flag(VgFlag::Clustered)
    }

    pub fn is_exported(&self) -> Result<bool> {
        self.flag(VgFlag::Exported)
    }

    pub fn is_partial(&self) -> Result<bool> {
        self.flag(VgFlag::Partial)
    }

    /// Metadata sequence number, bumped on every committed change
    pub fn seqno(&self) -> Result<u64> {
        self.counter(VgCounter::Seqno)
    }

    /// Total size in bytes
    pub fn size(&self) -> Result<u64> {
        self.counter(VgCounter::Size)
    }

    /// Unallocated space in bytes
    pub fn free_size(&self) -> Result<u64> {
        self.counter(VgCounter::FreeSize)
    }

    /// Extent size in bytes
    pub fn extent_size(&self) -> Result<u64> {
        self.counter(VgCounter::ExtentSize)
    }

    pub fn extent_count(&self) -> Result<u64> {
        self.counter(VgCounter::ExtentCount)
    }

    pub fn free_extent_count(&self) -> Result<u64> {
        self.counter(VgCounter::FreeExtentCount)
    }

    pub fn pv_count(&self) -> Result<u64> {
        self.counter(VgCounter::PvCount)
    }

    pub fn max_pv(&self) -> Result<u64> {
        self.counter(VgCounter::MaxPv)
    }

    pub fn max_lv(&self) -> Result<u64> {
        self.counter(VgCounter::MaxLv)
    }

    pub fn list_lvs(&self) -> Result<Vec<LogicalVolume<B>>> {
        self.live(Operation::ListLvs)?;
        let handle = self.handle;
        let lvs = self
            .session
            .call(Operation::ListLvs, &self.state.name, |backend| backend.vg_list_lvs(handle))?;
        lvs.into_iter().map(|lv| self.wrap_lv(lv)).collect()
    }

    pub fn list_pvs(&self) -> Result<Vec<PhysicalVolume<B>>> {
        self.live(Operation::ListPvs)?;
        let handle = self.handle;
        let pvs = self
            .session
            .call(Operation::ListPvs, &self.state.name, |backend| backend.vg_list_pvs(handle))?;
        pvs.into_iter().map(|pv| self.wrap_pv(pv)).collect()
    }

    pub fn lv_from_name(&self, name: &str) -> Result<LogicalVolume<B>> {
        self.live(Operation::LvLookup)?;
        validate_lv_name(Operation::LvLookup, name)?;
        let handle = self.handle;
        let lv = self
            .session
            .call(Operation::LvLookup, name, |backend| backend.lv_from_name(handle, name))?;
        self.wrap_lv(lv)
    }

    pub fn lv_from_uuid(&self, uuid: &str) -> Result<LogicalVolume<B>> {
        self.live(Operation::LvLookup)?;
        let handle = self.handle;
        let lv = self
            .session
            .call(Operation::LvLookup, uuid, |backend| backend.lv_from_uuid(handle, uuid))?;
        self.wrap_lv(lv)
    }

    pub fn pv_from_name(&self, device: &str) -> Result<PhysicalVolume<B>> {
        self.live(Operation::PvLookup)?;
        validate_device(Operation::PvLookup, device)?;
        let handle = self.handle;
        let pv = self
            .session
            .call(Operation::PvLookup, device, |backend| backend.pv_from_name(handle, device))?;
        self.wrap_pv(pv)
    }

    /// Create a linear logical volume of at least `size` bytes.
    ///
    /// The library rounds the size up to whole extents. The request is
    /// checked against the open mode, the name rules and the free extents
    /// before the library is asked to allocate anything.
    pub fn create_lv_linear(&self, name: &str, size: u64) -> Result<LogicalVolume<B>> {
        self.writable(Operation::CreateLvLinear)?;
        validate_lv_name(Operation::CreateLvLinear, name)?;
        if size == 0 {
            return Err(LvmError::binding(
                ErrorKind::InvalidArgument,
                Operation::CreateLvLinear,
                name,
                "size must be greater than zero",
            ));
        }

        let extent_size = self.extent_size()?;
        if extent_size > 0 {
            let needed = size.div_ceil(extent_size);
            let free = self.free_extent_count()?;
            if needed > free {
                return Err(LvmError::binding(
                    ErrorKind::InsufficientSpace,
                    Operation::CreateLvLinear,
                    name,
                    format!("{needed} extents needed, only {free} free"),
                ));
            }
        }

        let handle = self.handle;
        let lv = self.session.call(Operation::CreateLvLinear, name, |backend| {
            backend.vg_create_lv_linear(handle, name, size)
        })?;
        tracing::info!(vg = %self.state.name, lv = name, size, "Created linear logical volume");
        self.wrap_lv(lv)
    }

    /// Snapshot of the volume group's attributes
    pub fn info(&self) -> Result<VolumeGroupInfo> {
        Ok(VolumeGroupInfo {
            name: self.name()?,
            uuid: self.uuid()?,
            mode: self.mode(),
            seqno: self.seqno()?,
            size: self.size()?,
            free: self.free_size()?,
            extent_size: self.extent_size()?,
            extent_count: self.extent_count()?,
            free_extent_count: self.free_extent_count()?,
            pv_count: self.pv_count()?,
            lv_count: self.list_lvs()?.len() as u64,
            tags: self.tags()?,
        })
    }

    fn wrap_lv(&self, lv: B::Lv) -> Result<LogicalVolume<B>> {
        LogicalVolume::new(Rc::clone(&self.session), Rc::clone(&self.state), self.handle, lv)
    }

    fn wrap_pv(&self, pv: B::Pv) -> Result<PhysicalVolume<B>> {
        PhysicalVolume::new(Rc::clone(&self.session), Rc::clone(&self.state), pv)
    }
}

impl<B: Backend> Drop for VolumeGroup<B> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("Failed to close volume group {}: {err}", self.state.name);
        }
    }
}
