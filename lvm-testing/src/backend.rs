//! `Backend` over a `SimLab`, following lvm2app's errno conventions

use std::cell::RefCell;

use libc::{EAGAIN, EBUSY, EEXIST, EINVAL, ENODEV, ENOENT, ENOSPC, EPERM};
use liblvm::{Backend, NativeError, NativeResult, OpenMode, PvCounter, VgCounter, VgFlag};

use crate::lab::{
    OpenHandle, SIM_VERSION, SimLab, SimLv, SimVg, World, valid_object_name, valid_tag,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimVgHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimLvHandle {
    vg: SimVgHandle,
    serial: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPvHandle {
    vg: SimVgHandle,
    serial: u64,
}

fn fail<T>(errno: i32, message: impl Into<String>) -> NativeResult<T> {
    Err(NativeError::new(errno, message))
}

impl World {
    fn open_handle(&self, vg: SimVgHandle) -> NativeResult<&OpenHandle> {
        self.handles
            .get(&vg.0)
            .ok_or_else(|| NativeError::new(EINVAL, "invalid volume group handle"))
    }

    fn vg(&self, vg: SimVgHandle) -> NativeResult<&SimVg> {
        let name = &self.open_handle(vg)?.vg;
        self.vgs
            .get(name)
            .ok_or_else(|| NativeError::new(ENOENT, format!("Volume group \"{name}\" not found")))
    }

    fn vg_mut(&mut self, vg: SimVgHandle) -> NativeResult<&mut SimVg> {
        let name = self.open_handle(vg)?.vg.clone();
        match self.vgs.get_mut(&name) {
            Some(group) => Ok(group),
            None => fail(ENOENT, format!("Volume group \"{name}\" not found")),
        }
    }

    /// Volume group open for writing
    fn vg_write_mut(&mut self, vg: SimVgHandle) -> NativeResult<&mut SimVg> {
        let handle = self.open_handle(vg)?;
        if !handle.mode.is_writable() {
            return fail(EPERM, format!("Volume group {} is read-only", handle.vg));
        }
        self.vg_mut(vg)
    }

    fn lv(&self, lv: SimLvHandle) -> NativeResult<&SimLv> {
        self.vg(lv.vg)?
            .lv(lv.serial)
            .ok_or_else(|| NativeError::new(ENOENT, "Logical volume not found"))
    }

    fn is_busy(&self, vg: &str, lv: &str) -> bool {
        self.busy.contains(&(vg.to_string(), lv.to_string()))
    }

    fn release_handle(&mut self, id: u64) {
        let Some(handle) = self.handles.remove(&id) else {
            return;
        };
        // A group that was created but never written disappears with its handle.
        if self.vgs.get(&handle.vg).is_some_and(|vg| !vg.committed) {
            self.vgs.remove(&handle.vg);
        }
    }
}

/// One simulated library instance.
///
/// Several instances may share a lab, which is how tests provoke lock
/// contention between two library handles.
pub struct SimBackend {
    lab: SimLab,
    id: u64,
    last_error: RefCell<NativeError>,
}

impl SimBackend {
    pub(crate) fn init(lab: SimLab) -> NativeResult<Self> {
        let id = {
            let mut world = lab.world.borrow_mut();
            if let Some(err) = world.fail_init.clone() {
                return Err(err);
            }
            world.live_backends += 1;
            world.next_serial()
        };
        tracing::debug!(backend = id, "simulated library initialized");
        Ok(Self {
            lab,
            id,
            last_error: RefCell::new(NativeError::new(0, "")),
        })
    }

    /// Run a fallible call against the world, recording its failure
    fn run<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut World) -> NativeResult<T>,
    ) -> NativeResult<T> {
        let result = {
            let mut world = self.lab.world.borrow_mut();
            world.take_fault(operation).and_then(|()| f(&mut *world))
        };
        if let Err(err) = &result {
            tracing::trace!(operation, %err, "simulated failure");
            *self.last_error.borrow_mut() = err.clone();
        }
        result
    }

    fn read<T: Default>(&self, f: impl FnOnce(&World) -> Option<T>) -> T {
        f(&*self.lab.world.borrow()).unwrap_or_default()
    }

    fn open_vg(&self, world: &mut World, name: &str, mode: OpenMode) -> SimVgHandle {
        let id = world.next_serial();
        world.handles.insert(
            id,
            OpenHandle {
                vg: name.to_string(),
                mode,
                owner: self.id,
            },
        );
        SimVgHandle(id)
    }
}

impl Drop for SimBackend {
    fn drop(&mut self) {
        let mut world = self.lab.world.borrow_mut();
        let owned: Vec<u64> = world
            .handles
            .iter()
            .filter(|(_, handle)| handle.owner == self.id)
            .map(|(id, _)| *id)
            .collect();
        for id in owned {
            world.release_handle(id);
        }
        world.live_backends = world.live_backends.saturating_sub(1);
    }
}

impl Backend for SimBackend {
    type Vg = SimVgHandle;
    type Lv = SimLvHandle;
    type Pv = SimPvHandle;

    fn library_version(&self) -> String {
        SIM_VERSION.to_string()
    }

    fn last_error(&self) -> NativeError {
        self.last_error.borrow().clone()
    }

    fn config_reload(&self) -> NativeResult<()> {
        self.run("config_reload", |world| {
            world.reloads += 1;
            Ok(())
        })
    }

    fn config_override(&self, config: &str) -> NativeResult<()> {
        self.run("config_override", |world| {
            if config.trim().is_empty() {
                return fail(EINVAL, "Empty configuration string");
            }
            world.overrides.push(config.to_string());
            Ok(())
        })
    }

    fn scan(&self) -> NativeResult<()> {
        self.run("scan", |world| {
            world.scans += 1;
            Ok(())
        })
    }

    fn list_vg_names(&self) -> NativeResult<Vec<String>> {
        self.run("list_vg_names", |world| {
            Ok(world
                .vgs
                .values()
                .filter(|vg| vg.committed)
                .map(|vg| vg.name.clone())
                .collect())
        })
    }

    fn list_vg_uuids(&self) -> NativeResult<Vec<String>> {
        self.run("list_vg_uuids", |world| {
            Ok(world
                .vgs
                .values()
                .filter(|vg| vg.committed)
                .map(|vg| vg.uuid.clone())
                .collect())
        })
    }

    fn vgname_from_pvid(&self, pvid: &str) -> NativeResult<String> {
        self.run("vgname_from_pvid", |world| {
            let wanted = pvid.replace('-', "");
            world
                .vgs
                .values()
                .find(|vg| vg.pvs.iter().any(|pv| pv.uuid.replace('-', "") == wanted))
                .map(|vg| vg.name.clone())
                .ok_or_else(|| NativeError::new(ENOENT, format!("No volume group owns PV {pvid}")))
        })
    }

    fn vgname_from_device(&self, device: &str) -> NativeResult<String> {
        self.run("vgname_from_device", |world| {
            world
                .device_owner(device)
                .map(str::to_string)
                .ok_or_else(|| {
                    NativeError::new(ENOENT, format!("No volume group found for device {device}"))
                })
        })
    }

    fn vg_open(&self, name: &str, mode: OpenMode) -> NativeResult<Self::Vg> {
        self.run("vg_open", |world| {
            if !world.vgs.get(name).is_some_and(|vg| vg.committed) {
                return fail(ENOENT, format!("Volume group \"{name}\" not found"));
            }
            let contended = world.handles.values().any(|handle| {
                handle.vg == name && (mode.is_writable() || handle.mode.is_writable())
            });
            if contended || world.external_locks.contains(name) {
                return fail(EAGAIN, format!("Can't get lock for {name}"));
            }
            Ok(self.open_vg(world, name, mode))
        })
    }

    fn vg_create(&self, name: &str) -> NativeResult<Self::Vg> {
        self.run("vg_create", |world| {
            if !valid_object_name(name) {
                return fail(EINVAL, format!("New volume group name \"{name}\" is invalid"));
            }
            if world.vgs.contains_key(name) {
                return fail(EEXIST, format!("A volume group called {name} already exists."));
            }
            let mut vg = SimVg::new(name);
            vg.dirty = true;
            world.vgs.insert(name.to_string(), vg);
            Ok(self.open_vg(world, name, OpenMode::Write))
        })
    }

    fn vg_close(&self, vg: Self::Vg) -> NativeResult<()> {
        self.run("vg_close", |world| {
            world.open_handle(vg)?;
            world.release_handle(vg.0);
            Ok(())
        })
    }

    fn vg_write(&self, vg: Self::Vg) -> NativeResult<()> {
        self.run("vg_write", |world| {
            let group = world.vg_write_mut(vg)?;
            if group.pending_remove {
                let name = group.name.clone();
                world.vgs.remove(&name);
                return Ok(());
            }
            if group.pvs.is_empty() {
                return fail(
                    EINVAL,
                    format!("Volume group {} has no physical volumes", group.name),
                );
            }
            group.commit();
            Ok(())
        })
    }

    fn vg_remove(&self, vg: Self::Vg) -> NativeResult<()> {
        self.run("vg_remove", |world| {
            let group = world.vg_write_mut(vg)?;
            if !group.lvs.is_empty() {
                return fail(
                    EBUSY,
                    format!(
                        "Volume group \"{}\" still contains {} logical volume(s)",
                        group.name,
                        group.lvs.len()
                    ),
                );
            }
            group.pending_remove = true;
            group.dirty = true;
            Ok(())
        })
    }

    fn vg_extend(&self, vg: Self::Vg, device: &str) -> NativeResult<()> {
        self.run("vg_extend", |world| {
            world.vg_write_mut(vg)?;
            if !world.devices.contains_key(device) {
                return fail(ENODEV, format!("Device {device} not found."));
            }
            if let Some(owner) = world.device_owner(device) {
                return fail(
                    EINVAL,
                    format!("Physical volume '{device}' is already in volume group '{owner}'"),
                );
            }
            let Some(pv) = world.new_pv(device) else {
                return fail(EINVAL, format!("Device {device} is too small"));
            };
            let group = world.vg_mut(vg)?;
            group.pvs.push(pv);
            group.dirty = true;
            Ok(())
        })
    }

    fn vg_reduce(&self, vg: Self::Vg, device: &str) -> NativeResult<()> {
        self.run("vg_reduce", |world| {
            let group = world.vg_write_mut(vg)?;
            let Some(index) = group.pvs.iter().position(|pv| pv.device == device) else {
                return fail(
                    ENOENT,
                    format!("Physical volume {device} not in volume group {}", group.name),
                );
            };
            if group.pvs.len() == 1 {
                return fail(EINVAL, "Can't remove final physical volume");
            }
            let remaining = group.extent_count() - group.pvs[index].extents(group.extent_size);
            if remaining < group.used_extents() {
                return fail(EBUSY, format!("Physical volume {device} still in use"));
            }
            group.pvs.remove(index);
            group.dirty = true;
            Ok(())
        })
    }

    fn vg_add_tag(&self, vg: Self::Vg, tag: &str) -> NativeResult<()> {
        self.run("vg_add_tag", |world| {
            let group = world.vg_write_mut(vg)?;
            if !valid_tag(tag) {
                return fail(EINVAL, format!("Invalid tag {tag}"));
            }
            group.tags.insert(tag.to_string());
            group.dirty = true;
            Ok(())
        })
    }

    fn vg_remove_tag(&self, vg: Self::Vg, tag: &str) -> NativeResult<()> {
        self.run("vg_remove_tag", |world| {
            let group = world.vg_write_mut(vg)?;
            group.tags.remove(tag);
            group.dirty = true;
            Ok(())
        })
    }

    fn vg_tags(&self, vg: Self::Vg) -> NativeResult<Vec<String>> {
        self.run("vg_tags", |world| Ok(world.vg(vg)?.tags.iter().cloned().collect()))
    }

    fn vg_set_extent_size(&self, vg: Self::Vg, extent_size: u32) -> NativeResult<()> {
        self.run("vg_set_extent_size", |world| {
            let group = world.vg_write_mut(vg)?;
            if extent_size < 1024 || !extent_size.is_power_of_two() {
                return fail(EINVAL, format!("Invalid extent size {extent_size}"));
            }
            if !group.lvs.is_empty() {
                return fail(
                    EINVAL,
                    "Extent size cannot change while logical volumes exist",
                );
            }
            group.extent_size = u64::from(extent_size);
            group.dirty = true;
            Ok(())
        })
    }

    fn vg_name(&self, vg: Self::Vg) -> String {
        self.read(|world| world.open_handle(vg).ok().map(|handle| handle.vg.clone()))
    }

    fn vg_uuid(&self, vg: Self::Vg) -> String {
        self.read(|world| world.vg(vg).ok().map(|group| group.uuid.clone()))
    }

    fn vg_flag(&self, vg: Self::Vg, flag: VgFlag) -> bool {
        self.read(|world| {
            let group = world.vg(vg).ok()?;
            Some(match flag {
                VgFlag::Clustered => group.clustered,
                VgFlag::Exported | VgFlag::Partial => false,
            })
        })
    }

    fn vg_counter(&self, vg: Self::Vg, counter: VgCounter) -> u64 {
        self.read(|world| {
            let group = world.vg(vg).ok()?;
            Some(match counter {
                VgCounter::Seqno => group.seqno,
                VgCounter::Size => group.extent_count() * group.extent_size,
                VgCounter::FreeSize => group.free_extents() * group.extent_size,
                VgCounter::ExtentSize => group.extent_size,
                VgCounter::ExtentCount => group.extent_count(),
                VgCounter::FreeExtentCount => group.free_extents(),
                VgCounter::PvCount => group.pvs.len() as u64,
                VgCounter::MaxPv | VgCounter::MaxLv => 0,
            })
        })
    }

    fn vg_list_lvs(&self, vg: Self::Vg) -> NativeResult<Vec<Self::Lv>> {
        self.run("vg_list_lvs", |world| {
            Ok(world
                .vg(vg)?
                .lvs
                .iter()
                .map(|lv| SimLvHandle {
                    vg,
                    serial: lv.serial,
                })
                .collect())
        })
    }

    fn vg_list_pvs(&self, vg: Self::Vg) -> NativeResult<Vec<Self::Pv>> {
        self.run("vg_list_pvs", |world| {
            Ok(world
                .vg(vg)?
                .pvs
                .iter()
                .map(|pv| SimPvHandle {
                    vg,
                    serial: pv.serial,
                })
                .collect())
        })
    }

    fn vg_create_lv_linear(&self, vg: Self::Vg, name: &str, size: u64) -> NativeResult<Self::Lv> {
        self.run("vg_create_lv_linear", |world| {
            let serial = world.next_serial();
            let group = world.vg_write_mut(vg)?;
            if !valid_object_name(name) {
                return fail(EINVAL, format!("Invalid logical volume name {name}"));
            }
            if group.lvs.iter().any(|lv| lv.name == name) {
                return fail(
                    EEXIST,
                    format!(
                        "Logical volume \"{name}\" already exists in volume group \"{}\"",
                        group.name
                    ),
                );
            }
            if size == 0 {
                return fail(EINVAL, "Unable to create logical volume of size 0");
            }
            let needed = size.div_ceil(group.extent_size);
            let free = group.free_extents();
            if needed > free {
                return fail(
                    ENOSPC,
                    format!("Insufficient free space: {needed} extents needed, but only {free} available"),
                );
            }
            group.lvs.push(SimLv {
                serial,
                name: name.to_string(),
                uuid: crate::lab::lvm_uuid(),
                extents: needed,
                active: true,
                suspended: false,
                tags: Default::default(),
            });
            group.commit();
            Ok(SimLvHandle { vg, serial })
        })
    }

    fn lv_from_name(&self, vg: Self::Vg, name: &str) -> NativeResult<Self::Lv> {
        self.run("lv_from_name", |world| {
            let group = world.vg(vg)?;
            group
                .lvs
                .iter()
                .find(|lv| lv.name == name)
                .map(|lv| SimLvHandle {
                    vg,
                    serial: lv.serial,
                })
                .ok_or_else(|| {
                    NativeError::new(
                        ENOENT,
                        format!("Logical volume {name} not found in volume group {}", group.name),
                    )
                })
        })
    }

    fn lv_from_uuid(&self, vg: Self::Vg, uuid: &str) -> NativeResult<Self::Lv> {
        self.run("lv_from_uuid", |world| {
            world
                .vg(vg)?
                .lvs
                .iter()
                .find(|lv| lv.uuid == uuid)
                .map(|lv| SimLvHandle {
                    vg,
                    serial: lv.serial,
                })
                .ok_or_else(|| NativeError::new(ENOENT, format!("Logical volume {uuid} not found")))
        })
    }

    fn pv_from_name(&self, vg: Self::Vg, name: &str) -> NativeResult<Self::Pv> {
        self.run("pv_from_name", |world| {
            world
                .vg(vg)?
                .pvs
                .iter()
                .find(|pv| pv.device == name)
                .map(|pv| SimPvHandle {
                    vg,
                    serial: pv.serial,
                })
                .ok_or_else(|| {
                    NativeError::new(ENOENT, format!("Physical volume {name} not found"))
                })
        })
    }

    fn lv_name(&self, lv: Self::Lv) -> String {
        self.read(|world| world.lv(lv).ok().map(|state| state.name.clone()))
    }

    fn lv_uuid(&self, lv: Self::Lv) -> String {
        self.read(|world| world.lv(lv).ok().map(|state| state.uuid.clone()))
    }

    fn lv_size(&self, lv: Self::Lv) -> u64 {
        self.read(|world| {
            let extent_size = world.vg(lv.vg).ok()?.extent_size;
            world.lv(lv).ok().map(|state| state.extents * extent_size)
        })
    }

    fn lv_is_active(&self, lv: Self::Lv) -> bool {
        self.read(|world| world.lv(lv).ok().map(|state| state.active))
    }

    fn lv_is_suspended(&self, lv: Self::Lv) -> bool {
        self.read(|world| world.lv(lv).ok().map(|state| state.suspended))
    }

    fn lv_tags(&self, lv: Self::Lv) -> NativeResult<Vec<String>> {
        self.run("lv_tags", |world| Ok(world.lv(lv)?.tags.iter().cloned().collect()))
    }

    fn lv_add_tag(&self, lv: Self::Lv, tag: &str) -> NativeResult<()> {
        self.run("lv_add_tag", |world| {
            let group = world.vg_write_mut(lv.vg)?;
            if !valid_tag(tag) {
                return fail(EINVAL, format!("Invalid tag {tag}"));
            }
            let Some(state) = group.lv_mut(lv.serial) else {
                return fail(ENOENT, "Logical volume not found");
            };
            state.tags.insert(tag.to_string());
            group.dirty = true;
            Ok(())
        })
    }

    fn lv_remove_tag(&self, lv: Self::Lv, tag: &str) -> NativeResult<()> {
        self.run("lv_remove_tag", |world| {
            let group = world.vg_write_mut(lv.vg)?;
            let Some(state) = group.lv_mut(lv.serial) else {
                return fail(ENOENT, "Logical volume not found");
            };
            state.tags.remove(tag);
            group.dirty = true;
            Ok(())
        })
    }

    fn lv_activate(&self, lv: Self::Lv) -> NativeResult<()> {
        self.run("lv_activate", |world| {
            let Some(state) = world.vg_mut(lv.vg)?.lv_mut(lv.serial) else {
                return fail(ENOENT, "Logical volume not found");
            };
            state.active = true;
            Ok(())
        })
    }

    fn lv_deactivate(&self, lv: Self::Lv) -> NativeResult<()> {
        self.run("lv_deactivate", |world| {
            let vg_name = world.vg(lv.vg)?.name.clone();
            let lv_name = world.lv(lv)?.name.clone();
            if world.is_busy(&vg_name, &lv_name) {
                return fail(EBUSY, format!("Logical volume {vg_name}/{lv_name} in use."));
            }
            if let Some(state) = world.vg_mut(lv.vg)?.lv_mut(lv.serial) {
                state.active = false;
            }
            Ok(())
        })
    }

    fn lv_remove(&self, lv: Self::Lv) -> NativeResult<()> {
        self.run("lv_remove", |world| {
            world.vg_write_mut(lv.vg)?;
            let vg_name = world.vg(lv.vg)?.name.clone();
            let (lv_name, active) = {
                let state = world.lv(lv)?;
                (state.name.clone(), state.active)
            };
            if world.is_busy(&vg_name, &lv_name) {
                return fail(EBUSY, format!("Can't remove open logical volume \"{lv_name}\""));
            }
            if active && world.strict_remove {
                return fail(
                    EBUSY,
                    format!("Can't remove active logical volume {vg_name}/{lv_name}, it is in use"),
                );
            }
            let group = world.vg_mut(lv.vg)?;
            group.lvs.retain(|state| state.serial != lv.serial);
            group.commit();
            Ok(())
        })
    }

    fn lv_resize(&self, lv: Self::Lv, new_size: u64) -> NativeResult<()> {
        self.run("lv_resize", |world| {
            let group = world.vg_write_mut(lv.vg)?;
            if new_size == 0 {
                return fail(EINVAL, "New size must be greater than zero");
            }
            let needed = new_size.div_ceil(group.extent_size);
            let free = group.free_extents();
            let Some(current) = group.lv(lv.serial).map(|state| state.extents) else {
                return fail(ENOENT, "Logical volume not found");
            };
            if needed > current && needed - current > free {
                return fail(
                    ENOSPC,
                    format!(
                        "Insufficient free space: {} extents needed, but only {free} available",
                        needed - current
                    ),
                );
            }
            if let Some(state) = group.lv_mut(lv.serial) {
                state.extents = needed;
            }
            group.commit();
            Ok(())
        })
    }

    fn pv_name(&self, pv: Self::Pv) -> String {
        self.read(|world| {
            let group = world.vg(pv.vg).ok()?;
            group.pv(pv.serial).map(|state| state.device.clone())
        })
    }

    fn pv_uuid(&self, pv: Self::Pv) -> String {
        self.read(|world| {
            let group = world.vg(pv.vg).ok()?;
            group.pv(pv.serial).map(|state| state.uuid.clone())
        })
    }

    fn pv_counter(&self, pv: Self::Pv, counter: PvCounter) -> u64 {
        self.read(|world| {
            let group = world.vg(pv.vg).ok()?;
            let state = group.pv(pv.serial)?;
            Some(match counter {
                PvCounter::MdaCount => 1,
                PvCounter::DevSize => state.dev_size,
                PvCounter::Size => state.size,
                PvCounter::Free => group.pv_free_extents(pv.serial) * group.extent_size,
            })
        })
    }

    fn pv_resize(&self, pv: Self::Pv, new_size: u64) -> NativeResult<()> {
        self.run("pv_resize", |world| {
            let group = world.vg_write_mut(pv.vg)?;
            let Some(index) = group.pvs.iter().position(|state| state.serial == pv.serial) else {
                return fail(ENOENT, "Physical volume not found");
            };
            let state = &group.pvs[index];
            if new_size > state.dev_size - crate::lab::PE_START {
                return fail(
                    EINVAL,
                    format!("Size {new_size} exceeds device size of {}", state.device),
                );
            }
            let extent_size = group.extent_size;
            let shrink = state.extents(extent_size).saturating_sub(new_size / extent_size);
            if group.extent_count() - shrink < group.used_extents() {
                return fail(
                    EINVAL,
                    format!("Cannot shrink {} below allocated extents", state.device),
                );
            }
            group.pvs[index].size = new_size;
            group.commit();
            Ok(())
        })
    }
}
