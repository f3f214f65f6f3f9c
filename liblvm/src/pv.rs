// SPDX-License-Identifier: GPL-3.0-only

use std::rc::Rc;

use lvm_types::PhysicalVolumeInfo;

use crate::backend::{Backend, PvCounter};
use crate::error::{ErrorKind, LvmError, Operation, Result};
use crate::session::{Session, VgState};

/// A physical volume belonging to an open volume group
pub struct PhysicalVolume<B: Backend> {
    session: Rc<Session<B>>,
    vg: Rc<VgState>,
    handle: B::Pv,
    device: String,
}

impl<B: Backend> std::fmt::Debug for PhysicalVolume<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalVolume")
            .field("vg", &self.vg.name)
            .field("device", &self.device)
            .finish()
    }
}

impl<B: Backend> PhysicalVolume<B> {
    pub(crate) fn new(session: Rc<Session<B>>, vg: Rc<VgState>, handle: B::Pv) -> Result<Self> {
        let device = session.query(Operation::PvQuery, &vg.name, |backend| {
            backend.pv_name(handle)
        })?;
        Ok(Self {
            session,
            vg,
            handle,
            device,
        })
    }

    fn live(&self, operation: Operation) -> Result<()> {
        if self.vg.is_open() && self.session.is_open() {
            Ok(())
        } else {
            Err(LvmError::closed(operation, &self.device, "physical volume handle"))
        }
    }

    fn query<T>(&self, f: impl FnOnce(&B, B::Pv) -> T) -> Result<T> {
        self.live(Operation::PvQuery)?;
        let handle = self.handle;
        self.session
            .query(Operation::PvQuery, &self.device, |backend| f(backend, handle))
    }

    fn counter(&self, counter: PvCounter) -> Result<u64> {
        self.query(|backend, pv| backend.pv_counter(pv, counter))
    }

    /// Device path, e.g. `/dev/sdb1`
    pub fn name(&self) -> Result<String> {
        self.query(|backend, pv| backend.pv_name(pv))
    }

    pub fn uuid(&self) -> Result<String> {
        self.query(|backend, pv| backend.pv_uuid(pv))
    }

    pub fn mda_count(&self) -> Result<u64> {
        self.counter(PvCounter::MdaCount)
    }

    /// Size of the underlying block device in bytes
    pub fn dev_size(&self) -> Result<u64> {
        self.counter(PvCounter::DevSize)
    }

    /// Size usable by LVM in bytes
    pub fn size(&self) -> Result<u64> {
        self.counter(PvCounter::Size)
    }

    pub fn free(&self) -> Result<u64> {
        self.counter(PvCounter::Free)
    }

    /// Resize the physical volume. Only allowed through a write-mode group.
    pub fn resize(&self, new_size: u64) -> Result<()> {
        self.live(Operation::PvResize)?;
        if !self.vg.mode.is_writable() {
            return Err(LvmError::read_only(Operation::PvResize, &self.device));
        }
        if new_size == 0 {
            return Err(LvmError::binding(
                ErrorKind::InvalidArgument,
                Operation::PvResize,
                &self.device,
                "size must be greater than zero",
            ));
        }
        let handle = self.handle;
        self.session.call(Operation::PvResize, &self.device, |backend| {
            backend.pv_resize(handle, new_size)
        })?;
        tracing::info!(pv = %self.device, new_size, "Resized physical volume");
        Ok(())
    }

    pub fn info(&self) -> Result<PhysicalVolumeInfo> {
        Ok(PhysicalVolumeInfo {
            device: self.name()?,
            vg_name: self.vg.name.clone(),
            uuid: self.uuid()?,
            size: self.size()?,
            dev_size: self.dev_size()?,
            free: self.free()?,
            mda_count: self.mda_count()?,
        })
    }
}
