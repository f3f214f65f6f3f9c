mod common;

use common::{VG, expect_kind, lab};
use liblvm::{ErrorKind, OpenMode};
use lvm_testing::MIB;

#[test]
fn closing_a_group_invalidates_its_volumes() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();
    let pv = vg.pv_from_name("/dev/loop0").unwrap();

    vg.close().unwrap();
    assert!(!vg.is_open());
    assert_eq!(lab.open_vg_handles(), 0);

    let err = expect_kind(lv.name(), ErrorKind::UseAfterClose);
    assert!(!err.is_retryable());
    expect_kind(lv.state(), ErrorKind::UseAfterClose);
    expect_kind(lv.deactivate(), ErrorKind::UseAfterClose);
    expect_kind(lv.remove(), ErrorKind::UseAfterClose);
    expect_kind(lv.add_tag("late"), ErrorKind::UseAfterClose);
    expect_kind(pv.size(), ErrorKind::UseAfterClose);
    expect_kind(vg.name(), ErrorKind::UseAfterClose);
    expect_kind(vg.list_lvs(), ErrorKind::UseAfterClose);
    expect_kind(vg.create_lv_linear("more", MIB), ErrorKind::UseAfterClose);

    // the volume itself is untouched
    assert_eq!(lab.lv_active(VG, "data"), Some(true));
}

#[test]
fn closing_a_group_twice_is_harmless() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Read).unwrap();

    vg.close().unwrap();
    vg.close().unwrap();
    drop(vg);
    assert_eq!(lab.open_vg_handles(), 0);
}

#[test]
fn dropping_a_group_releases_its_lock() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    {
        let _vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
        assert_eq!(lab.open_vg_handles(), 1);
    }
    assert_eq!(lab.open_vg_handles(), 0);
    lvm.vg_open(VG, OpenMode::Write).unwrap();
}

#[test]
fn closing_the_library_closes_every_group() {
    let lab = lab();
    lab.add_device("/dev/loop9", 101 * MIB);
    lab.create_vg("othervg", &["/dev/loop9"]).unwrap();

    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let other = lvm.vg_open("othervg", OpenMode::Read).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();
    assert_eq!(lab.open_vg_handles(), 2);

    lvm.close().unwrap();
    assert!(!lvm.is_open());
    assert_eq!(lab.open_vg_handles(), 0);
    assert_eq!(lab.live_backends(), 0);

    assert!(!vg.is_open());
    assert!(!other.is_open());
    expect_kind(vg.uuid(), ErrorKind::UseAfterClose);
    expect_kind(other.tags(), ErrorKind::UseAfterClose);
    expect_kind(lv.size(), ErrorKind::UseAfterClose);
    expect_kind(lvm.list_vg_names(), ErrorKind::UseAfterClose);
    expect_kind(lvm.vg_open(VG, OpenMode::Read), ErrorKind::UseAfterClose);
    expect_kind(lvm.library_version(), ErrorKind::UseAfterClose);

    // closing again, in any order, is a no-op
    vg.close().unwrap();
    lvm.close().unwrap();
}

#[test]
fn dropping_the_library_invalidates_surviving_groups() {
    let lab = lab();
    let vg = {
        let lvm = lab.open().unwrap();
        lvm.vg_open(VG, OpenMode::Read).unwrap()
    };

    assert_eq!(lab.live_backends(), 0);
    assert_eq!(lab.open_vg_handles(), 0);
    expect_kind(vg.name(), ErrorKind::UseAfterClose);
}

#[test]
fn reopening_after_close_works() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    lvm.close().unwrap();

    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Read).unwrap();
    assert_eq!(vg.name().unwrap(), VG);
}
