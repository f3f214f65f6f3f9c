//! In-memory LVM world shared by the lab and its backends
//!
//! The model is deliberately coarse: extents are accounted per volume
//! group, physical volumes are filled in order, and activation is a flag.
//! It is detailed enough to reproduce the errno conventions of lvm2app
//! (locking, busy volumes, space exhaustion, duplicate names) without
//! touching real block devices.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use liblvm::{LvmConfig, Lvm, NativeError, NativeResult, OpenMode, Operation, error::classify};

use crate::backend::SimBackend;
use crate::errors::{LabError, Result};

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Extent size of volume groups created by the lab
pub const DEFAULT_EXTENT_SIZE: u64 = 4 * MIB;

/// Space reserved at the start of every physical volume for metadata
pub const PE_START: u64 = MIB;

/// Version string reported by simulated libraries
pub const SIM_VERSION: &str = "2.02.187(2)-sim";

const UUID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Random identifier in LVM's 6-4-4-4-4-4-6 layout
pub fn lvm_uuid() -> String {
    let bytes = [*uuid::Uuid::new_v4().as_bytes(), *uuid::Uuid::new_v4().as_bytes()].concat();
    let chars: Vec<char> = bytes
        .iter()
        .map(|byte| UUID_ALPHABET[*byte as usize % UUID_ALPHABET.len()] as char)
        .collect();

    let mut out = String::with_capacity(38);
    let mut start = 0;
    for (i, len) in [6, 4, 4, 4, 4, 4, 6].into_iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        out.extend(&chars[start..start + len]);
        start += len;
    }
    out
}

pub(crate) fn valid_object_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-'))
}

pub(crate) fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag.len() <= 1024
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-+/=!:&#".contains(c))
}

#[derive(Debug, Clone)]
pub(crate) struct SimPv {
    pub(crate) serial: u64,
    pub(crate) device: String,
    pub(crate) uuid: String,
    /// Usable bytes after the metadata area
    pub(crate) size: u64,
    pub(crate) dev_size: u64,
}

impl SimPv {
    pub(crate) fn extents(&self, extent_size: u64) -> u64 {
        self.size / extent_size
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SimLv {
    pub(crate) serial: u64,
    pub(crate) name: String,
    pub(crate) uuid: String,
    pub(crate) extents: u64,
    pub(crate) active: bool,
    pub(crate) suspended: bool,
    pub(crate) tags: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SimVg {
    pub(crate) name: String,
    pub(crate) uuid: String,
    pub(crate) extent_size: u64,
    pub(crate) seqno: u64,
    pub(crate) pvs: Vec<SimPv>,
    pub(crate) lvs: Vec<SimLv>,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) clustered: bool,
    /// False until the first successful write of a freshly created group
    pub(crate) committed: bool,
    /// Changes made through a handle but not yet written
    pub(crate) dirty: bool,
    pub(crate) pending_remove: bool,
}

impl SimVg {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uuid: lvm_uuid(),
            extent_size: DEFAULT_EXTENT_SIZE,
            seqno: 0,
            pvs: Vec::new(),
            lvs: Vec::new(),
            tags: BTreeSet::new(),
            clustered: false,
            committed: false,
            dirty: false,
            pending_remove: false,
        }
    }

    pub(crate) fn extent_count(&self) -> u64 {
        self.pvs.iter().map(|pv| pv.extents(self.extent_size)).sum()
    }

    pub(crate) fn used_extents(&self) -> u64 {
        self.lvs.iter().map(|lv| lv.extents).sum()
    }

    pub(crate) fn free_extents(&self) -> u64 {
        self.extent_count().saturating_sub(self.used_extents())
    }

    /// Free extents on one physical volume, filling volumes in order
    pub(crate) fn pv_free_extents(&self, serial: u64) -> u64 {
        let mut used = self.used_extents();
        for pv in &self.pvs {
            let extents = pv.extents(self.extent_size);
            let taken = used.min(extents);
            used -= taken;
            if pv.serial == serial {
                return extents - taken;
            }
        }
        0
    }

    pub(crate) fn lv(&self, serial: u64) -> Option<&SimLv> {
        self.lvs.iter().find(|lv| lv.serial == serial)
    }

    pub(crate) fn lv_mut(&mut self, serial: u64) -> Option<&mut SimLv> {
        self.lvs.iter_mut().find(|lv| lv.serial == serial)
    }

    pub(crate) fn pv(&self, serial: u64) -> Option<&SimPv> {
        self.pvs.iter().find(|pv| pv.serial == serial)
    }

    /// Persist all pending changes
    pub(crate) fn commit(&mut self) {
        self.committed = true;
        self.dirty = false;
        self.seqno += 1;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OpenHandle {
    pub(crate) vg: String,
    pub(crate) mode: OpenMode,
    pub(crate) owner: u64,
}

#[derive(Debug, Default)]
pub(crate) struct World {
    pub(crate) devices: BTreeMap<String, u64>,
    pub(crate) vgs: BTreeMap<String, SimVg>,
    pub(crate) handles: BTreeMap<u64, OpenHandle>,
    pub(crate) external_locks: BTreeSet<String>,
    pub(crate) busy: BTreeSet<(String, String)>,
    pub(crate) strict_remove: bool,
    pub(crate) fail_init: Option<NativeError>,
    pub(crate) faults: HashMap<String, NativeError>,
    pub(crate) overrides: Vec<String>,
    pub(crate) scans: u32,
    pub(crate) reloads: u32,
    pub(crate) live_backends: u32,
    next_serial: u64,
}

impl World {
    pub(crate) fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    pub(crate) fn device_owner(&self, device: &str) -> Option<&str> {
        self.vgs
            .values()
            .find(|vg| vg.pvs.iter().any(|pv| pv.device == device))
            .map(|vg| vg.name.as_str())
    }

    pub(crate) fn new_pv(&mut self, device: &str) -> Option<SimPv> {
        let dev_size = *self.devices.get(device)?;
        if dev_size < PE_START + DEFAULT_EXTENT_SIZE {
            return None;
        }
        Some(SimPv {
            serial: self.next_serial(),
            device: device.to_string(),
            uuid: lvm_uuid(),
            size: dev_size - PE_START,
            dev_size,
        })
    }

    pub(crate) fn take_fault(&mut self, operation: &str) -> NativeResult<()> {
        match self.faults.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A simulated host: block devices, volume groups and the knobs tests use
/// to provoke lock contention, busy volumes and library failures.
///
/// Clones share the same world, so a test can keep a `SimLab` around and
/// inspect or perturb state while the binding holds a backend.
#[derive(Clone, Default)]
pub struct SimLab {
    pub(crate) world: Rc<RefCell<World>>,
}

impl SimLab {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lab with one volume group spread over `pv_count` devices of
    /// `pv_size` bytes each, named `/dev/loop0`, `/dev/loop1`, ...
    pub fn with_vg(name: &str, pv_count: usize, pv_size: u64) -> Result<Self> {
        let lab = Self::new();
        let devices: Vec<String> = (0..pv_count).map(|i| format!("/dev/loop{i}")).collect();
        for device in &devices {
            lab.add_device(device, pv_size);
        }
        let refs: Vec<&str> = devices.iter().map(String::as_str).collect();
        lab.create_vg(name, &refs)?;
        Ok(lab)
    }

    /// Make a block device of `size` bytes available
    pub fn add_device(&self, device: &str, size: u64) {
        self.world
            .borrow_mut()
            .devices
            .insert(device.to_string(), size);
    }

    /// Create a committed volume group on existing devices
    pub fn create_vg(&self, name: &str, devices: &[&str]) -> Result<()> {
        let mut world = self.world.borrow_mut();
        if world.vgs.contains_key(name) {
            return Err(LabError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let mut vg = SimVg::new(name);
        for device in devices {
            if let Some(owner) = world.device_owner(device) {
                return Err(LabError::DeviceInUse {
                    device: device.to_string(),
                    vg: owner.to_string(),
                });
            }
            if !world.devices.contains_key(*device) {
                return Err(LabError::DeviceNotFound {
                    device: device.to_string(),
                });
            }
            let pv = world.new_pv(device).ok_or_else(|| LabError::DeviceTooSmall {
                device: device.to_string(),
            })?;
            vg.pvs.push(pv);
        }
        vg.commit();
        world.vgs.insert(name.to_string(), vg);
        Ok(())
    }

    /// Create a logical volume directly, bypassing the binding
    pub fn create_lv(&self, vg: &str, name: &str, size: u64, active: bool) -> Result<String> {
        let mut world = self.world.borrow_mut();
        let serial = world.next_serial();
        let group = world.vgs.get_mut(vg).ok_or_else(|| LabError::VgNotFound {
            name: vg.to_string(),
        })?;
        if group.lvs.iter().any(|lv| lv.name == name) {
            return Err(LabError::AlreadyExists {
                name: format!("{vg}/{name}"),
            });
        }
        let needed = size.div_ceil(group.extent_size);
        let free = group.free_extents();
        if needed > free {
            return Err(LabError::InsufficientSpace {
                vg: vg.to_string(),
                needed,
                free,
            });
        }
        let uuid = lvm_uuid();
        group.lvs.push(SimLv {
            serial,
            name: name.to_string(),
            uuid: uuid.clone(),
            extents: needed,
            active,
            suspended: false,
            tags: BTreeSet::new(),
        });
        group.commit();
        Ok(uuid)
    }

    /// Mark a logical volume as held open (mounted) or released
    pub fn set_busy(&self, vg: &str, lv: &str, busy: bool) {
        let key = (vg.to_string(), lv.to_string());
        let mut world = self.world.borrow_mut();
        if busy {
            world.busy.insert(key);
        } else {
            world.busy.remove(&key);
        }
    }

    pub fn set_suspended(&self, vg: &str, lv: &str, suspended: bool) -> Result<()> {
        let mut world = self.world.borrow_mut();
        let lv = world
            .vgs
            .get_mut(vg)
            .and_then(|group| group.lvs.iter_mut().find(|candidate| candidate.name == lv))
            .ok_or_else(|| LabError::LvNotFound {
                vg: vg.to_string(),
                name: lv.to_string(),
            })?;
        lv.suspended = suspended;
        Ok(())
    }

    pub fn set_clustered(&self, vg: &str, clustered: bool) -> Result<()> {
        let mut world = self.world.borrow_mut();
        let group = world.vgs.get_mut(vg).ok_or_else(|| LabError::VgNotFound {
            name: vg.to_string(),
        })?;
        group.clustered = clustered;
        Ok(())
    }

    /// Hold the volume group lock from outside the lab's backends
    pub fn lock_vg(&self, vg: &str) {
        self.world
            .borrow_mut()
            .external_locks
            .insert(vg.to_string());
    }

    pub fn unlock_vg(&self, vg: &str) {
        self.world.borrow_mut().external_locks.remove(vg);
    }

    /// Refuse to remove active logical volumes, as some lvm2 builds do
    pub fn set_strict_remove(&self, strict: bool) {
        self.world.borrow_mut().strict_remove = strict;
    }

    /// Make library initialization fail with `errno` and `message`
    pub fn fail_init(&self, errno: i32, message: &str) {
        self.world.borrow_mut().fail_init = Some(NativeError::new(errno, message));
    }

    /// Fail the next backend call named `operation` (e.g. `"vg_write"`)
    pub fn inject_failure(&self, operation: &str, errno: i32, message: &str) {
        self.world
            .borrow_mut()
            .faults
            .insert(operation.to_string(), NativeError::new(errno, message));
    }

    /// A fresh library instance over this lab
    pub fn backend(&self) -> NativeResult<SimBackend> {
        SimBackend::init(self.clone())
    }

    /// Open the binding over this lab
    pub fn open(&self) -> liblvm::Result<Lvm<SimBackend>> {
        let backend = self
            .backend()
            .map_err(|native| classify(Operation::Init, "sim", native))?;
        Ok(Lvm::with_backend(backend))
    }

    /// Open the binding and apply `config`
    pub fn open_with(&self, config: &LvmConfig) -> liblvm::Result<Lvm<SimBackend>> {
        let lvm = self.open()?;
        lvm.apply_config(config)?;
        Ok(lvm)
    }

    pub fn vg_names(&self) -> Vec<String> {
        self.world
            .borrow()
            .vgs
            .values()
            .filter(|vg| vg.committed)
            .map(|vg| vg.name.clone())
            .collect()
    }

    pub fn lv_names(&self, vg: &str) -> Vec<String> {
        self.with_vg_state(vg, |group| group.lvs.iter().map(|lv| lv.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn lv_active(&self, vg: &str, lv: &str) -> Option<bool> {
        self.with_lv_state(vg, lv, |state| state.active)
    }

    pub fn lv_tags(&self, vg: &str, lv: &str) -> Option<BTreeSet<String>> {
        self.with_lv_state(vg, lv, |state| state.tags.clone())
    }

    /// Allocated size in bytes
    pub fn lv_size(&self, vg: &str, lv: &str) -> Option<u64> {
        let extent_size = self.with_vg_state(vg, |group| group.extent_size)?;
        self.with_lv_state(vg, lv, |state| state.extents * extent_size)
    }

    pub fn vg_tags(&self, vg: &str) -> Option<BTreeSet<String>> {
        self.with_vg_state(vg, |group| group.tags.clone())
    }

    pub fn vg_seqno(&self, vg: &str) -> Option<u64> {
        self.with_vg_state(vg, |group| group.seqno)
    }

    pub fn vg_devices(&self, vg: &str) -> Vec<String> {
        self.with_vg_state(vg, |group| group.pvs.iter().map(|pv| pv.device.clone()).collect())
            .unwrap_or_default()
    }

    pub fn free_extents(&self, vg: &str) -> Option<u64> {
        self.with_vg_state(vg, SimVg::free_extents)
    }

    /// Whether the group has changes that were never written
    pub fn is_dirty(&self, vg: &str) -> Option<bool> {
        self.with_vg_state(vg, |group| group.dirty)
    }

    /// Volume group handles currently open across all backends
    pub fn open_vg_handles(&self) -> usize {
        self.world.borrow().handles.len()
    }

    /// Library instances not yet released
    pub fn live_backends(&self) -> u32 {
        self.world.borrow().live_backends
    }

    pub fn overrides(&self) -> Vec<String> {
        self.world.borrow().overrides.clone()
    }

    pub fn scan_count(&self) -> u32 {
        self.world.borrow().scans
    }

    pub fn reload_count(&self) -> u32 {
        self.world.borrow().reloads
    }

    fn with_vg_state<T>(&self, vg: &str, f: impl FnOnce(&SimVg) -> T) -> Option<T> {
        self.world.borrow().vgs.get(vg).map(f)
    }

    fn with_lv_state<T>(&self, vg: &str, lv: &str, f: impl FnOnce(&SimLv) -> T) -> Option<T> {
        self.world
            .borrow()
            .vgs
            .get(vg)
            .and_then(|group| group.lvs.iter().find(|state| state.name == lv))
            .map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_has_lvm_layout() {
        let uuid = lvm_uuid();
        let groups: Vec<usize> = uuid.split('-').map(str::len).collect();
        assert_eq!(groups, vec![6, 4, 4, 4, 4, 4, 6]);
        assert!(uuid.chars().all(|c| c == '-' || c.is_ascii_alphanumeric()));
        assert_ne!(uuid, lvm_uuid());
    }

    #[test]
    fn with_vg_accounts_extents_per_pv() {
        let lab = SimLab::with_vg("vg0", 2, 101 * MIB).unwrap();
        // 100 MiB usable per device at 4 MiB extents
        assert_eq!(lab.free_extents("vg0"), Some(50));
        assert_eq!(lab.vg_devices("vg0"), vec!["/dev/loop0", "/dev/loop1"]);
    }

    #[test]
    fn create_lv_rounds_up_and_fills_pvs_in_order() {
        let lab = SimLab::with_vg("vg0", 2, 101 * MIB).unwrap();
        lab.create_lv("vg0", "data", 100 * MIB + 1, true).unwrap();
        assert_eq!(lab.lv_size("vg0", "data"), Some(104 * MIB));

        let world = lab.world.borrow();
        let vg = &world.vgs["vg0"];
        assert_eq!(vg.pv_free_extents(vg.pvs[0].serial), 0);
        assert_eq!(vg.pv_free_extents(vg.pvs[1].serial), 24);
    }

    #[test]
    fn lab_setup_errors() {
        let lab = SimLab::with_vg("vg0", 1, 64 * MIB).unwrap();
        assert_eq!(
            lab.create_vg("vg1", &["/dev/loop0"]),
            Err(LabError::DeviceInUse {
                device: "/dev/loop0".to_string(),
                vg: "vg0".to_string()
            })
        );
        assert!(matches!(
            lab.create_lv("vg0", "big", GIB, true),
            Err(LabError::InsufficientSpace { .. })
        ));
        lab.add_device("/dev/tiny", MIB);
        assert!(matches!(
            lab.create_vg("vg1", &["/dev/tiny"]),
            Err(LabError::DeviceTooSmall { .. })
        ));
    }

    #[test]
    fn names_and_tags() {
        assert!(valid_object_name("lv_foobar"));
        assert!(!valid_object_name("-lv"));
        assert!(!valid_object_name("lv foo"));
        assert!(valid_tag("my_fance_tag"));
        assert!(!valid_tag("bad tag"));
    }
}
