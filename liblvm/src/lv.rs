// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::rc::Rc;

use lvm_types::{ActivationState, LogicalVolumeInfo};

use crate::backend::Backend;
use crate::error::{ErrorKind, LvmError, Operation, Result};
use crate::names::validate_tag;
use crate::session::{Session, VgState};

/// A logical volume inside an open volume group.
///
/// The handle follows the `Active`/`Inactive`/`Removed` lifecycle. Once
/// removed (through this handle or any other handle to the same volume)
/// only [`LogicalVolume::state`] and [`LogicalVolume::remove`] still answer;
/// everything else reports `UseAfterClose`.
pub struct LogicalVolume<B: Backend> {
    session: Rc<Session<B>>,
    vg: Rc<VgState>,
    vg_handle: B::Vg,
    handle: B::Lv,
    uuid: String,
    target: String,
}

impl<B: Backend> std::fmt::Debug for LogicalVolume<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalVolume")
            .field("target", &self.target)
            .field("uuid", &self.uuid)
            .finish()
    }
}

impl<B: Backend> LogicalVolume<B> {
    pub(crate) fn new(
        session: Rc<Session<B>>,
        vg: Rc<VgState>,
        vg_handle: B::Vg,
        handle: B::Lv,
    ) -> Result<Self> {
        let (uuid, name) = session.query(Operation::LvQuery, &vg.name, |backend| {
            (backend.lv_uuid(handle), backend.lv_name(handle))
        })?;
        let target = format!("{}/{}", vg.name, name);
        Ok(Self {
            session,
            vg,
            vg_handle,
            handle,
            uuid,
            target,
        })
    }

    fn vg_live(&self, operation: Operation) -> Result<()> {
        if self.vg.is_open() && self.session.is_open() {
            Ok(())
        } else {
            Err(LvmError::closed(operation, &self.target, "logical volume handle"))
        }
    }

    fn live(&self, operation: Operation) -> Result<()> {
        self.vg_live(operation)?;
        if self.vg.is_removed(&self.uuid) {
            return Err(LvmError::closed(
                operation,
                &self.target,
                "removed logical volume",
            ));
        }
        Ok(())
    }

    fn writable(&self, operation: Operation) -> Result<()> {
        self.live(operation)?;
        if self.vg.mode.is_writable() {
            Ok(())
        } else {
            Err(LvmError::read_only(operation, &self.target))
        }
    }

    fn query<T>(&self, f: impl FnOnce(&B, B::Lv) -> T) -> Result<T> {
        self.live(Operation::LvQuery)?;
        let handle = self.handle;
        self.session
            .query(Operation::LvQuery, &self.target, |backend| f(backend, handle))
    }

    fn commit(&self) -> Result<()> {
        let vg = self.vg_handle;
        self.session
            .call(Operation::VgWrite, &self.vg.name, |backend| backend.vg_write(vg))
    }

    /// The UUID never changes, but it is still only reported while the
    /// handle is valid.
    pub fn uuid(&self) -> Result<String> {
        self.live(Operation::LvQuery)?;
        Ok(self.uuid.clone())
    }

    pub fn name(&self) -> Result<String> {
        self.query(|backend, lv| backend.lv_name(lv))
    }

    /// Allocated size in bytes, always a whole number of extents
    pub fn size(&self) -> Result<u64> {
        self.query(|backend, lv| backend.lv_size(lv))
    }

    pub fn is_active(&self) -> Result<bool> {
        self.query(|backend, lv| backend.lv_is_active(lv))
    }

    pub fn is_suspended(&self) -> Result<bool> {
        self.query(|backend, lv| backend.lv_is_suspended(lv))
    }

    pub fn state(&self) -> Result<ActivationState> {
        self.vg_live(Operation::LvQuery)?;
        if self.vg.is_removed(&self.uuid) {
            return Ok(ActivationState::Removed);
        }
        self.is_active().map(ActivationState::from_active)
    }

    pub fn tags(&self) -> Result<BTreeSet<String>> {
        self.live(Operation::LvTags)?;
        let handle = self.handle;
        let tags = self
            .session
            .call(Operation::LvTags, &self.target, |backend| backend.lv_tags(handle))?;
        Ok(tags.into_iter().collect())
    }

    /// Add a tag and commit. Adding a tag that is already present is a no-op.
    pub fn add_tag(&self, tag: &str) -> Result<()> {
        self.writable(Operation::LvAddTag)?;
        validate_tag(Operation::LvAddTag, tag)?;
        if self.tags()?.contains(tag) {
            tracing::debug!(lv = %self.target, tag, "Tag already present");
            return Ok(());
        }
        let handle = self.handle;
        self.session
            .call(Operation::LvAddTag, tag, |backend| backend.lv_add_tag(handle, tag))?;
        self.commit()?;
        tracing::debug!(lv = %self.target, tag, "Added tag");
        Ok(())
    }

    /// Remove a tag and commit. Removing an absent tag is a no-op.
    pub fn remove_tag(&self, tag: &str) -> Result<()> {
        self.writable(Operation::LvRemoveTag)?;
        validate_tag(Operation::LvRemoveTag, tag)?;
        if !self.tags()?.contains(tag) {
            tracing::debug!(lv = %self.target, tag, "Tag not present");
            return Ok(());
        }
        let handle = self.handle;
        self.session.call(Operation::LvRemoveTag, tag, |backend| {
            backend.lv_remove_tag(handle, tag)
        })?;
        self.commit()?;
        tracing::debug!(lv = %self.target, tag, "Removed tag");
        Ok(())
    }

    pub fn activate(&self) -> Result<()> {
        self.writable(Operation::LvActivate)?;
        let handle = self.handle;
        self.session
            .call(Operation::LvActivate, &self.target, |backend| backend.lv_activate(handle))?;
        tracing::info!(lv = %self.target, "Activated logical volume");
        Ok(())
    }

    /// Deactivate the volume.
    ///
    /// A volume that is mounted or held open fails with `Busy`; the caller
    /// may retry once the holder is gone.
    pub fn deactivate(&self) -> Result<()> {
        self.writable(Operation::LvDeactivate)?;
        let handle = self.handle;
        self.session.call(Operation::LvDeactivate, &self.target, |backend| {
            backend.lv_deactivate(handle)
        })?;
        tracing::info!(lv = %self.target, "Deactivated logical volume");
        Ok(())
    }

    /// Remove the volume from its group.
    ///
    /// Fails with `NotFound` if the volume was already removed.
    pub fn remove(&self) -> Result<()> {
        self.vg_live(Operation::LvRemove)?;
        if self.vg.is_removed(&self.uuid) {
            return Err(LvmError::binding(
                ErrorKind::NotFound,
                Operation::LvRemove,
                &self.target,
                "logical volume was already removed",
            ));
        }
        self.writable(Operation::LvRemove)?;
        let handle = self.handle;
        self.session
            .call(Operation::LvRemove, &self.target, |backend| backend.lv_remove(handle))?;
        self.vg.mark_removed(&self.uuid);
        tracing::info!(lv = %self.target, "Removed logical volume");
        Ok(())
    }

    /// Resize to at least `new_size` bytes, rounded up to whole extents
    pub fn resize(&self, new_size: u64) -> Result<()> {
        self.writable(Operation::LvResize)?;
        if new_size == 0 {
            return Err(LvmError::binding(
                ErrorKind::InvalidArgument,
                Operation::LvResize,
                &self.target,
                "size must be greater than zero",
            ));
        }
        let handle = self.handle;
        self.session.call(Operation::LvResize, &self.target, |backend| {
            backend.lv_resize(handle, new_size)
        })?;
        tracing::info!(lv = %self.target, new_size, "Resized logical volume");
        Ok(())
    }

    pub fn info(&self) -> Result<LogicalVolumeInfo> {
        Ok(LogicalVolumeInfo {
            name: self.name()?,
            vg_name: self.vg.name.clone(),
            uuid: self.uuid()?,
            size: self.size()?,
            state: self.state()?,
            suspended: self.is_suspended()?,
            tags: self.tags()?,
        })
    }
}
