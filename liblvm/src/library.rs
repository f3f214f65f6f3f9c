// SPDX-License-Identifier: GPL-3.0-only

use std::rc::Rc;

use lvm_types::OpenMode;

use crate::backend::Backend;
use crate::config::LvmConfig;
use crate::error::{NativeError, Operation, Result};
use crate::names::{validate_device, validate_vg_name};
use crate::session::{Session, VgState};
use crate::vg::VolumeGroup;

/// Entry point to the LVM library.
///
/// Owns the backend until [`Lvm::close`] is called or the handle is dropped.
/// Closing releases every volume group opened through this handle, and
/// every handle derived from it reports `UseAfterClose` from then on.
///
/// Handles are deliberately neither `Send` nor `Sync`: the native library
/// keeps per-handle state that is unsafe to share, so each thread must open
/// its own `Lvm`. The native backend additionally allows only one live
/// library handle per process.
pub struct Lvm<B: Backend> {
    session: Rc<Session<B>>,
}

impl<B: Backend> std::fmt::Debug for Lvm<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lvm").field("open", &self.is_open()).finish()
    }
}

impl<B: Backend> Lvm<B> {
    /// Wrap an already initialized backend
    pub fn with_backend(backend: B) -> Self {
        Self {
            session: Session::new(backend),
        }
    }

    /// Apply configuration overrides and optionally rescan devices
    pub fn apply_config(&self, config: &LvmConfig) -> Result<()> {
        for setting in &config.overrides {
            self.config_override(setting)?;
        }
        if config.scan_on_open {
            self.scan()?;
        }
        Ok(())
    }

    /// Release all volume groups and the library itself. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.session.shutdown()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn library_version(&self) -> Result<String> {
        self.session
            .query(Operation::LibraryQuery, "", |backend| backend.library_version())
    }

    /// Errno and message of the most recent library failure
    pub fn last_error(&self) -> Result<NativeError> {
        self.session
            .query(Operation::LibraryQuery, "", |backend| backend.last_error())
    }

    /// Reload `lvm.conf` from the system directory
    pub fn config_reload(&self) -> Result<()> {
        tracing::debug!("Reloading LVM configuration");
        self.session
            .call(Operation::ConfigReload, "", |backend| backend.config_reload())
    }

    /// Override configuration with an `lvm.conf` fragment, e.g.
    /// `"devices { filter = [ \"a|.*|\" ] }"`
    pub fn config_override(&self, config: &str) -> Result<()> {
        tracing::debug!(config, "Overriding LVM configuration");
        self.session.call(Operation::ConfigOverride, config, |backend| {
            backend.config_override(config)
        })
    }

    /// Rescan all devices for LVM metadata
    pub fn scan(&self) -> Result<()> {
        tracing::debug!("Scanning devices for LVM metadata");
        self.session.call(Operation::Scan, "", |backend| backend.scan())
    }

    pub fn list_vg_names(&self) -> Result<Vec<String>> {
        self.session
            .call(Operation::ListVgNames, "", |backend| backend.list_vg_names())
    }

    pub fn list_vg_uuids(&self) -> Result<Vec<String>> {
        self.session
            .call(Operation::ListVgUuids, "", |backend| backend.list_vg_uuids())
    }

    /// Name of the volume group owning the physical volume with this id
    pub fn vg_name_from_pvid(&self, pvid: &str) -> Result<String> {
        validate_device(Operation::VgNameFromPvid, pvid)?;
        self.session.call(Operation::VgNameFromPvid, pvid, |backend| {
            backend.vgname_from_pvid(pvid)
        })
    }

    /// Name of the volume group owning the physical volume on this device
    pub fn vg_name_from_device(&self, device: &str) -> Result<String> {
        validate_device(Operation::VgNameFromDevice, device)?;
        self.session.call(Operation::VgNameFromDevice, device, |backend| {
            backend.vgname_from_device(device)
        })
    }

    /// Open a volume group.
    ///
    /// The library takes a lock matching `mode` that is held until the
    /// volume group is closed. Contention surfaces as `Lock`.
    pub fn vg_open(&self, name: &str, mode: OpenMode) -> Result<VolumeGroup<B>> {
        validate_vg_name(Operation::VgOpen, name)?;
        let handle = self
            .session
            .call(Operation::VgOpen, name, |backend| backend.vg_open(name, mode))?;
        tracing::info!(vg = name, %mode, "Opened volume group");
        Ok(self.adopt(handle, name, mode))
    }

    /// Start a new, empty volume group.
    ///
    /// Nothing is written until a physical volume is added with
    /// [`VolumeGroup::extend`] or [`VolumeGroup::write`] is called.
    pub fn vg_create(&self, name: &str) -> Result<VolumeGroup<B>> {
        validate_vg_name(Operation::VgCreate, name)?;
        let handle = self
            .session
            .call(Operation::VgCreate, name, |backend| backend.vg_create(name))?;
        tracing::info!(vg = name, "Created volume group");
        Ok(self.adopt(handle, name, OpenMode::Write))
    }

    fn adopt(&self, handle: B::Vg, name: &str, mode: OpenMode) -> VolumeGroup<B> {
        let state = VgState::new(name, mode);
        self.session.register(handle, Rc::clone(&state));
        VolumeGroup::new(Rc::clone(&self.session), handle, state)
    }
}

impl<B: Backend> Drop for Lvm<B> {
    fn drop(&mut self) {
        if let Err(err) = self.session.shutdown() {
            tracing::warn!("Failed to release LVM library cleanly: {err}");
        }
    }
}

#[cfg(feature = "native")]
impl Lvm<crate::native::NativeBackend> {
    /// Initialize the system LVM library.
    ///
    /// Fails with `Initialization` if the library cannot start (missing
    /// permissions, no device-mapper) or if another native handle is still
    /// live in this process.
    pub fn open(config: &LvmConfig) -> Result<Self> {
        let backend = crate::native::NativeBackend::init(config.system_dir.as_deref())?;
        let lvm = Self::with_backend(backend);
        tracing::info!(version = %lvm.library_version()?, "LVM library initialized");
        lvm.apply_config(config)?;
        Ok(lvm)
    }
}
