mod common;

use common::{VG, expect_kind, lab};
use liblvm::{ErrorKind, Operation, OpenMode};
use lvm_testing::{GIB, MIB};

#[test]
fn read_mode_refuses_to_create_and_leaves_group_untouched() {
    let lab = lab();
    let seqno = lab.vg_seqno(VG);
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Read).unwrap();

    let err = expect_kind(vg.create_lv_linear("lv_foobar", MIB), ErrorKind::Capability);
    assert!(!err.is_retryable());
    assert!(err.native().is_none());
    assert_eq!(err.failure().operation, Operation::CreateLvLinear);

    assert!(lab.lv_names(VG).is_empty());
    assert_eq!(lab.vg_seqno(VG), seqno);
    assert_eq!(lab.is_dirty(VG), Some(false));
}

#[test]
fn read_mode_refuses_every_mutation() {
    let lab = lab();
    lab.create_lv(VG, "data", MIB, true).unwrap();
    lab.add_device("/dev/sdx", 101 * MIB);
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Read).unwrap();
    let lv = vg.lv_from_name("data").unwrap();
    let pv = vg.pv_from_name("/dev/loop0").unwrap();

    expect_kind(lv.add_tag("t"), ErrorKind::Capability);
    expect_kind(lv.remove_tag("t"), ErrorKind::Capability);
    expect_kind(lv.deactivate(), ErrorKind::Capability);
    expect_kind(lv.activate(), ErrorKind::Capability);
    expect_kind(lv.remove(), ErrorKind::Capability);
    expect_kind(lv.resize(8 * MIB), ErrorKind::Capability);
    expect_kind(vg.add_tag("t"), ErrorKind::Capability);
    expect_kind(vg.extend("/dev/sdx"), ErrorKind::Capability);
    expect_kind(vg.reduce("/dev/loop1"), ErrorKind::Capability);
    expect_kind(vg.set_extent_size(8 * 1024 * 1024), ErrorKind::Capability);
    expect_kind(vg.write(), ErrorKind::Capability);
    expect_kind(vg.remove(), ErrorKind::Capability);
    expect_kind(pv.resize(50 * MIB), ErrorKind::Capability);

    // reads still work
    assert_eq!(lv.name().unwrap(), "data");
    assert!(lv.is_active().unwrap());
    assert_eq!(lab.lv_active(VG, "data"), Some(true));
    assert!(lab.lv_tags(VG, "data").unwrap().is_empty());
}

#[test]
fn missing_volume_group_is_not_found() {
    let lab = lab();
    let lvm = lab.open().unwrap();

    let err = expect_kind(lvm.vg_open("nope", OpenMode::Read), ErrorKind::NotFound);
    assert_eq!(err.native().map(|native| native.errno), Some(libc::ENOENT));
    assert_eq!(lvm.last_error().unwrap().errno, libc::ENOENT);
}

#[test]
fn missing_volumes_are_not_found() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Read).unwrap();

    expect_kind(vg.lv_from_name("nope"), ErrorKind::NotFound);
    expect_kind(vg.lv_from_uuid("aaaaaa-bbbb-cccc-dddd-eeee-ffff-gggggg"), ErrorKind::NotFound);
    expect_kind(vg.pv_from_name("/dev/nope"), ErrorKind::NotFound);
}

#[test]
fn externally_locked_group_reports_retryable_lock() {
    let lab = lab();
    let lvm = lab.open().unwrap();

    lab.lock_vg(VG);
    let err = expect_kind(lvm.vg_open(VG, OpenMode::Write), ErrorKind::Lock);
    assert!(err.is_retryable());

    lab.unlock_vg(VG);
    lvm.vg_open(VG, OpenMode::Write).unwrap();
}

#[test]
fn write_lock_excludes_other_library_handles() {
    let lab = lab();
    let first = lab.open().unwrap();
    let second = lab.open().unwrap();

    let writer = first.vg_open(VG, OpenMode::Write).unwrap();
    expect_kind(second.vg_open(VG, OpenMode::Read), ErrorKind::Lock);
    expect_kind(second.vg_open(VG, OpenMode::Write), ErrorKind::Lock);

    writer.close().unwrap();
    let reader = second.vg_open(VG, OpenMode::Read).unwrap();
    let other_reader = first.vg_open(VG, OpenMode::Read).unwrap();
    expect_kind(first.vg_open(VG, OpenMode::Write), ErrorKind::Lock);
    drop(reader);
    drop(other_reader);
    first.vg_open(VG, OpenMode::Write).unwrap();
}

#[test]
fn oversized_volume_is_rejected_before_allocation() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();

    let err = expect_kind(vg.create_lv_linear("big", GIB), ErrorKind::InsufficientSpace);
    assert!(!err.is_retryable());
    assert!(lab.lv_names(VG).is_empty());

    // exactly the free space fits
    let free = vg.free_size().unwrap();
    vg.create_lv_linear("all", free).unwrap();
    assert_eq!(vg.free_extent_count().unwrap(), 0);
    expect_kind(vg.create_lv_linear("more", 1), ErrorKind::InsufficientSpace);
}

#[test]
fn zero_size_is_an_invalid_argument() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();

    expect_kind(vg.create_lv_linear("empty", 0), ErrorKind::InvalidArgument);
}

#[test]
fn malformed_and_duplicate_names_are_invalid() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();

    for bad in ["", "has space", "-dash", "snapshot0", "x_rimage_0", "a/b"] {
        expect_kind(vg.create_lv_linear(bad, MIB), ErrorKind::InvalidName);
    }
    expect_kind(lvm.vg_open("bad name", OpenMode::Read), ErrorKind::InvalidName);

    vg.create_lv_linear("lv_foobar", MIB).unwrap();
    let err = expect_kind(vg.create_lv_linear("lv_foobar", MIB), ErrorKind::InvalidName);
    assert_eq!(err.native().map(|native| native.errno), Some(libc::EEXIST));
    assert_eq!(lab.lv_names(VG), vec!["lv_foobar"]);
}

#[test]
fn malformed_tags_are_invalid() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();

    let too_long = "t".repeat(1025);
    for bad in ["", "has space", "semi;colon", too_long.as_str()] {
        expect_kind(lv.add_tag(bad), ErrorKind::InvalidTag);
        expect_kind(vg.add_tag(bad), ErrorKind::InvalidTag);
    }
    lv.add_tag("ok.tag-1+/=!:&#").unwrap();
}

#[test]
fn initialization_failure_is_reported() {
    let lab = lab();
    lab.fail_init(libc::EACCES, "Failed to initialize locking");

    let err = expect_kind(lab.open(), ErrorKind::Initialization);
    assert!(!err.is_retryable());
    assert!(err.to_string().starts_with("LVM library initialization failed"));
    assert_eq!(lab.live_backends(), 0);
}

#[test]
fn unknown_library_failures_are_surfaced_not_swallowed() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();

    lab.inject_failure("lv_activate", libc::EIO, "Failed to resume data");
    let err = expect_kind(lv.activate(), ErrorKind::Native);
    let native = err.native().unwrap();
    assert_eq!(native.errno, libc::EIO);
    assert_eq!(native.message, "Failed to resume data");
    assert!(err.to_string().contains("myvg/data"));
}

#[test]
fn failed_commit_keeps_the_group_open() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();

    lab.inject_failure("vg_write", libc::EIO, "Failed to write metadata");
    let err = expect_kind(lv.add_tag("pending"), ErrorKind::Native);
    assert_eq!(err.failure().operation, Operation::VgWrite);
    assert!(vg.is_open());
    assert_eq!(lab.is_dirty(VG), Some(true));

    vg.write().unwrap();
    assert_eq!(lab.is_dirty(VG), Some(false));
    assert!(lab.lv_tags(VG, "data").unwrap().contains("pending"));
}

#[test]
fn message_text_classifies_bare_einval() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();

    lab.inject_failure("lv_deactivate", libc::EINVAL, "Logical volume myvg/data in use.");
    expect_kind(lv.deactivate(), ErrorKind::Busy);

    lab.inject_failure("vg_open", libc::EINVAL, "Can't get lock for myvg");
    drop(vg);
    expect_kind(lvm.vg_open(VG, OpenMode::Write), ErrorKind::Lock);
}

#[test]
fn block_in_a_message_is_not_a_lock() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();

    lab.inject_failure("lv_resize", libc::EINVAL, "Failed to read metadata block from /dev/loop0");
    let err = expect_kind(lv.resize(8 * MIB), ErrorKind::InvalidArgument);
    assert!(!err.is_retryable());
}

#[test]
fn stale_errno_does_not_fail_empty_listings() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    expect_kind(lvm.vg_open("nope", OpenMode::Read), ErrorKind::NotFound);

    let vg = lvm.vg_open(VG, OpenMode::Read).unwrap();
    assert!(vg.list_lvs().unwrap().is_empty());
    assert_eq!(vg.info().unwrap().lv_count, 0);
    assert_eq!(vg.list_pvs().unwrap().len(), 2);

    // lvm2app never clears errno on success
    assert_eq!(lvm.last_error().unwrap().errno, libc::ENOENT);
}
