mod common;

use common::{VG, expect_kind, lab};
use liblvm::{ActivationState, ErrorKind, OpenMode};
use lvm_testing::MIB;

#[test]
fn create_tag_deactivate_remove_round_trip() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();

    let lv = vg.create_lv_linear("lv_foobar", 100_000).unwrap();
    let uuid = lv.uuid().unwrap();
    assert_eq!(uuid.len(), 38);
    // rounded up to one 4 MiB extent
    assert_eq!(lv.size().unwrap(), 4 * MIB);
    assert_eq!(lv.state().unwrap(), ActivationState::Active);

    lv.add_tag("my_fance_tag").unwrap();
    assert!(lv.tags().unwrap().contains("my_fance_tag"));

    lv.deactivate().unwrap();
    assert_eq!(lv.state().unwrap(), ActivationState::Inactive);
    assert_eq!(lab.lv_active(VG, "lv_foobar"), Some(false));

    lv.remove().unwrap();
    assert_eq!(lv.state().unwrap(), ActivationState::Removed);
    assert!(lab.lv_names(VG).is_empty());

    vg.close().unwrap();
    lvm.close().unwrap();
    assert_eq!(lab.open_vg_handles(), 0);
    assert_eq!(lab.live_backends(), 0);
}

#[test]
fn uuid_is_stable_and_resolves_back_to_the_volume() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", 8 * MIB).unwrap();

    let uuid = lv.uuid().unwrap();
    lv.add_tag("backup").unwrap();
    lv.deactivate().unwrap();
    assert_eq!(lv.uuid().unwrap(), uuid);

    let again = vg.lv_from_uuid(&uuid).unwrap();
    assert_eq!(again.name().unwrap(), "data");
}

#[test]
fn size_is_rounded_up_to_whole_extents() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let extent = vg.extent_size().unwrap();

    let exact = vg.create_lv_linear("exact", 3 * extent).unwrap();
    assert_eq!(exact.size().unwrap(), 3 * extent);

    let odd = vg.create_lv_linear("odd", 3 * extent + 1).unwrap();
    assert_eq!(odd.size().unwrap(), 4 * extent);
    assert_eq!(odd.size().unwrap() % extent, 0);
}

#[test]
fn busy_deactivate_can_be_retried_once_released() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("lv_foobar", MIB).unwrap();

    lab.set_busy(VG, "lv_foobar", true);
    let err = expect_kind(lv.deactivate(), ErrorKind::Busy);
    assert!(err.is_retryable());
    assert_eq!(err.native().map(|native| native.errno), Some(libc::EBUSY));
    assert_eq!(lv.state().unwrap(), ActivationState::Active);

    lab.set_busy(VG, "lv_foobar", false);
    lv.deactivate().unwrap();
    assert_eq!(lv.state().unwrap(), ActivationState::Inactive);
}

#[test]
fn activate_after_deactivate() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();

    lv.deactivate().unwrap();
    assert!(!lv.is_active().unwrap());
    lv.activate().unwrap();
    assert!(lv.is_active().unwrap());
    assert_eq!(lab.lv_active(VG, "data"), Some(true));
}

#[test]
fn removing_twice_reports_not_found() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("lv_foobar", MIB).unwrap();

    lv.deactivate().unwrap();
    lv.remove().unwrap();

    let err = expect_kind(lv.remove(), ErrorKind::NotFound);
    assert!(!err.is_retryable());
}

#[test]
fn removed_volume_rejects_everything_but_state_and_remove() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("gone", MIB).unwrap();
    lv.deactivate().unwrap();
    lv.remove().unwrap();

    expect_kind(lv.uuid(), ErrorKind::UseAfterClose);
    expect_kind(lv.name(), ErrorKind::UseAfterClose);
    expect_kind(lv.size(), ErrorKind::UseAfterClose);
    expect_kind(lv.tags(), ErrorKind::UseAfterClose);
    expect_kind(lv.add_tag("late"), ErrorKind::UseAfterClose);
    expect_kind(lv.activate(), ErrorKind::UseAfterClose);
    expect_kind(lv.deactivate(), ErrorKind::UseAfterClose);
    expect_kind(lv.resize(8 * MIB), ErrorKind::UseAfterClose);
    assert_eq!(lv.state().unwrap(), ActivationState::Removed);
}

#[test]
fn removal_is_seen_by_other_handles_to_the_same_volume() {
    let lab = lab();
    lab.create_lv(VG, "shared", MIB, false).unwrap();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();

    let first = vg.lv_from_name("shared").unwrap();
    let second = vg.lv_from_name("shared").unwrap();
    first.remove().unwrap();

    assert_eq!(second.state().unwrap(), ActivationState::Removed);
    expect_kind(second.remove(), ErrorKind::NotFound);
    expect_kind(second.name(), ErrorKind::UseAfterClose);
}

#[test]
fn active_volume_removal_depends_on_library_policy() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();

    let lenient = vg.create_lv_linear("lenient", MIB).unwrap();
    lenient.remove().unwrap();

    lab.set_strict_remove(true);
    let strict = vg.create_lv_linear("strict", MIB).unwrap();
    expect_kind(strict.remove(), ErrorKind::Busy);
    assert_eq!(strict.state().unwrap(), ActivationState::Active);

    strict.deactivate().unwrap();
    strict.remove().unwrap();
    assert!(lab.lv_names(VG).is_empty());
}

#[test]
fn busy_volume_cannot_be_removed() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("mounted", MIB).unwrap();

    lab.set_busy(VG, "mounted", true);
    expect_kind(lv.remove(), ErrorKind::Busy);
    assert_eq!(lab.lv_names(VG), vec!["mounted"]);
}

#[test]
fn resize_grows_and_shrinks_in_extents() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", 8 * MIB).unwrap();

    lv.resize(10 * MIB).unwrap();
    assert_eq!(lv.size().unwrap(), 12 * MIB);
    lv.resize(4 * MIB).unwrap();
    assert_eq!(lab.lv_size(VG, "data"), Some(4 * MIB));

    let err = expect_kind(lv.resize(10 * 1024 * MIB), ErrorKind::InsufficientSpace);
    assert_eq!(err.native().map(|native| native.errno), Some(libc::ENOSPC));
    expect_kind(lv.resize(0), ErrorKind::InvalidArgument);
}

#[test]
fn info_snapshot_serializes() {
    let lab = lab();
    let lvm = lab.open().unwrap();
    let vg = lvm.vg_open(VG, OpenMode::Write).unwrap();
    let lv = vg.create_lv_linear("data", MIB).unwrap();
    lv.add_tag("b").unwrap();
    lv.add_tag("a").unwrap();
    lab.set_suspended(VG, "data", true).unwrap();

    let info = lv.info().unwrap();
    assert_eq!(info.display_name(), "myvg/data");
    assert_eq!(info.device_path(), "/dev/myvg/data");
    assert!(info.suspended);

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["state"], "active");
    assert_eq!(json["tags"], serde_json::json!(["a", "b"]));
    assert_eq!(json["size"], 4 * MIB);
}
