#![allow(dead_code)]

use std::fmt::Debug;

use liblvm::{ErrorKind, LvmError};
use lvm_testing::{MIB, SimLab};

pub const VG: &str = "myvg";

/// 100 MiB usable, 25 extents of 4 MiB
pub const PV_SIZE: u64 = 101 * MIB;

/// A lab with `myvg` on `/dev/loop0` and `/dev/loop1`
pub fn lab() -> SimLab {
    SimLab::with_vg(VG, 2, PV_SIZE).expect("lab setup")
}

pub fn expect_kind<T: Debug>(result: liblvm::Result<T>, kind: ErrorKind) -> LvmError {
    let err = result.expect_err("operation should fail");
    assert_eq!(err.kind(), kind, "unexpected error: {err}");
    err
}
