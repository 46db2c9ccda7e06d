// vim: tw=80
//! Reconcile existing arrays with changed declarations

use pretty_assertions::assert_eq;
use raidsync_core::{
    fake::Call,
    ApplyError,
    DeviceId,
    DeviceKind,
    Error,
    Level,
    Members,
    Phase,
    Violation,
};

use super::*;

const NONE: [&str; 0] = [];

/// Every active member of md0 trades places with a spare.  That takes four
/// batches, and md0 never has fewer than two active members along the way.
#[test_log::test(tokio::test)]
async fn swap_active_and_spare() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 1
block_devices: [bd3]
partitions: [bd4p]
spare_devices: [bd1]
spare_partitions: [bd2p]
"#);
    let (old, p) = t!(r.plan(1, &d).await);
    let mut t = old;
    for batch in &p {
        t = batch.apply_to(&t);
        assert!(t.active_count() >= 2, "{batch} left {t}");
    }

    let state = t!(r.update(1, &d).await);
    assert_eq!(&Members::new(["bd3"], ["bd4p"]), state.topology.active());
    assert_eq!(&Members::new(["bd1"], ["bd2p"]), state.topology.spare());
    assert_eq!(vec![
        Call::ApplyBatch(1, Phase::RemoveSpares),
        Call::ApplyBatch(1, Phase::AddMovedToActive),
        Call::ApplyBatch(1, Phase::RemoveActives),
        Call::ApplyBatch(1, Phase::AddMovedToSpare),
    ], r.controller().mutations());
}

/// Replace one active member and add a new spare
#[tokio::test]
async fn replace_and_grow() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 1
block_devices: [bd5]
partitions: [bd2p]
spare_devices: [bd3, bd6]
spare_partitions: [bd4p]
"#);
    let state = t!(r.update(1, &d).await);
    assert_eq!(&Members::new(["bd5"], ["bd2p"]), state.topology.active());
    assert_eq!(&Members::new(["bd3", "bd6"], ["bd4p"]),
               state.topology.spare());
    assert_eq!(vec![
        Call::ApplyBatch(1, Phase::AddNew),
        Call::ApplyBatch(1, Phase::RemoveActives),
    ], r.controller().mutations());
}

#[tokio::test]
async fn rename() {
    let r = reconciler();
    let d = decl(r#"
name: data
machine: node1
level: 1
block_devices: [bd1]
partitions: [bd2p]
spare_devices: [bd3]
spare_partitions: [bd4p]
fs_type: xfs
"#);
    let state = t!(r.update(1, &d).await);
    assert_eq!("data", state.name);
    assert_eq!(Some("xfs".to_owned()), state.fs_type);
    assert_eq!(vec![
        Call::RenameArray(1, "data".to_owned()),
        Call::Format(1001, "xfs".to_owned()),
    ], r.controller().mutations());
}

/// A RAID 5 with only two active members is refused before any change
#[tokio::test]
async fn raid5_with_two_actives() {
    let r = reconciler();
    let d = decl(r#"
name: md1
machine: node1
level: 5
block_devices: [bd5, bd6]
"#);
    let e = r.create(&d).await.unwrap_err();
    assert_eq!(Error::Validation(Violation::InsufficientActiveCount {
        level: Level::Raid5,
        required: 3,
        actual: 2
    }), e);
    assert!(r.controller().mutations().is_empty());
}

#[tokio::test]
async fn collision() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 1
block_devices: [bd1, bd3]
partitions: [bd2p]
spare_devices: [bd3]
"#);
    let e = r.update(1, &d).await.unwrap_err();
    assert_eq!(Error::Validation(Violation::RoleCollision {
        id: DeviceId::from("bd3"),
        kind: DeviceKind::WholeDevice
    }), e);
    assert!(r.controller().mutations().is_empty());
}

#[tokio::test]
async fn level_is_immutable() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 5
block_devices: [bd1, bd3]
partitions: [bd2p]
"#);
    let e = r.update(1, &d).await.unwrap_err();
    assert_eq!(Error::ImmutableField("level"), e);
    assert!(r.controller().mutations().is_empty());
}

/// If a batch fails midway, the apply stops there and the array is left in a
/// valid intermediate state
#[tokio::test]
async fn fail_midway() {
    let r = reconciler();
    r.controller().fail_apply_batch(3);
    let d = decl(r#"
name: md0
machine: node1
level: 1
block_devices: [bd3]
partitions: [bd4p]
spare_devices: [bd1]
spare_partitions: [bd2p]
"#);
    let e = r.update(1, &d).await.unwrap_err();
    match e {
        Error::Apply(ApplyError{failed, last_completed, ..}) => {
            assert_eq!(Phase::RemoveActives, failed);
            assert_eq!(Some(Phase::AddMovedToActive), last_completed);
        }
        e => panic!("Unexpected error {e:?}")
    }

    let t = r.controller().topology(1).unwrap();
    assert_eq!(&Members::new(["bd1", "bd3"], ["bd2p", "bd4p"]), t.active());
    assert!(t.spare().is_empty());
    assert_eq!(0, t.collisions().count());

    // Retrying from the intermediate state finishes the job
    let state = t!(r.update(1, &d).await);
    assert_eq!(&Members::new(["bd1"], ["bd2p"]), state.topology.spare());
}

/// Unchanged declarations cause no mutations at all
#[tokio::test]
async fn idempotent() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 1
block_devices: [bd1]
partitions: [bd2p]
spare_devices: [bd3]
spare_partitions: [bd4p]
"#);
    let (_, p) = t!(r.plan(1, &d).await);
    assert!(p.is_empty());
    t!(r.update(1, &d).await);
    assert!(r.controller().mutations().is_empty());
}

/// Shrink to a bare mirror of partitions
#[tokio::test]
async fn shrink() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 1
partitions: [bd2p, bd4p]
"#);
    let state = t!(r.update(1, &d).await);
    assert_eq!(&Members::new(NONE, ["bd2p", "bd4p"]), state.topology.active());
    assert!(state.topology.spare().is_empty());
    assert_eq!(vec![
        Call::ApplyBatch(1, Phase::RemoveSpares),
        Call::ApplyBatch(1, Phase::AddMovedToActive),
        Call::ApplyBatch(1, Phase::RemoveActives),
    ], r.controller().mutations());
}

/// The array and the machine facts are read, and the declaration validated,
/// before the first change is requested.  The array is read again after the
/// last batch.
#[tokio::test]
async fn reads_before_changes() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 1
block_devices: [bd3]
partitions: [bd4p]
spare_devices: [bd1]
spare_partitions: [bd2p]
"#);
    t!(r.update(1, &d).await);
    assert_eq!(vec![
        Call::ResolveMachine("node1".to_owned()),
        Call::GetArray(1),
        Call::BootDiskId,
        Call::PartitionedDeviceIds,
        Call::ApplyBatch(1, Phase::RemoveSpares),
        Call::ApplyBatch(1, Phase::AddMovedToActive),
        Call::ApplyBatch(1, Phase::RemoveActives),
        Call::ApplyBatch(1, Phase::AddMovedToSpare),
        Call::GetArray(1),
        Call::GetArray(1),
    ], r.controller().calls());
}

/// A rejected declaration stops after the reads
#[tokio::test]
async fn rejected_after_reads() {
    let r = reconciler();
    let d = decl(r#"
name: md0
machine: node1
level: 1
block_devices: [bd0, bd1]
"#);
    let e = r.update(1, &d).await.unwrap_err();
    assert_eq!(Error::Validation(Violation::BootDiskConflict {
        boot_disk: DeviceId::from("bd0")
    }), e);
    assert_eq!(vec![
        Call::ResolveMachine("node1".to_owned()),
        Call::GetArray(1),
        Call::BootDiskId,
        Call::PartitionedDeviceIds,
    ], r.controller().calls());
}
