//! Simulated LVM host for tests
//!
//! `SimLab` holds block devices, volume groups and logical volumes in
//! memory. `SimBackend` implements `liblvm::Backend` on top of it, so the
//! binding's handles run unchanged against the simulation.

pub mod backend;
pub mod errors;
pub mod lab;

pub use backend::{SimBackend, SimLvHandle, SimPvHandle, SimVgHandle};
pub use errors::LabError;
pub use lab::{DEFAULT_EXTENT_SIZE, GIB, KIB, MIB, SIM_VERSION, SimLab, lvm_uuid};
