// vim: tw=80
//! Compare two topologies of the same array, bucket by bucket.

use std::collections::BTreeSet;

use crate::{topology::Topology, types::*};

/// Changes to one (role, kind) bucket of an array
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BucketDiff {
    /// Ids that are new to the array
    pub created: BTreeSet<DeviceId>,
    /// Ids that previously played the opposite role.  They are recorded here,
    /// at their destination, and nowhere else as created.
    pub moved:   BTreeSet<DeviceId>,
    /// Ids that no longer play this role.  That includes ids that moved to the
    /// opposite role.
    pub removed: BTreeSet<DeviceId>,
}

impl BucketDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.moved.is_empty() &&
            self.removed.is_empty()
    }
}

/// The difference between an old and a new topology.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffSet {
    pub active_devices:    BucketDiff,
    pub active_partitions: BucketDiff,
    pub spare_devices:     BucketDiff,
    pub spare_partitions:  BucketDiff,
}

impl DiffSet {
    pub fn get(&self, role: Role, kind: DeviceKind) -> &BucketDiff {
        match (role, kind) {
            (Role::Active, DeviceKind::WholeDevice) => &self.active_devices,
            (Role::Active, DeviceKind::Partition) => &self.active_partitions,
            (Role::Spare, DeviceKind::WholeDevice) => &self.spare_devices,
            (Role::Spare, DeviceKind::Partition) => &self.spare_partitions,
        }
    }

    fn get_mut(&mut self, role: Role, kind: DeviceKind) -> &mut BucketDiff {
        match (role, kind) {
            (Role::Active, DeviceKind::WholeDevice) => &mut self.active_devices,
            (Role::Active, DeviceKind::Partition) =>
                &mut self.active_partitions,
            (Role::Spare, DeviceKind::WholeDevice) => &mut self.spare_devices,
            (Role::Spare, DeviceKind::Partition) => &mut self.spare_partitions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active_devices.is_empty() && self.active_partitions.is_empty() &&
            self.spare_devices.is_empty() && self.spare_partitions.is_empty()
    }

    /// Every device that changes role, with the role it moves to
    pub fn moves(&self) -> impl Iterator<Item=(DeviceRef, Role)> + '_ {
        Role::ALL.into_iter()
            .flat_map(move |role| DeviceKind::ALL.into_iter()
                .flat_map(move |kind| {
                    self.get(role, kind).moved.iter()
                        .map(move |id| (DeviceRef::new(id.clone(), kind), role))
                })
            )
    }
}

/// Compute the changes needed to turn `old` into `new`.
///
/// Whole devices and partitions are compared independently.  The level is not
/// considered.
pub fn diff(old: &Topology, new: &Topology) -> DiffSet {
    let mut ds = DiffSet::default();
    for role in Role::ALL {
        for kind in DeviceKind::ALL {
            *ds.get_mut(role, kind) = diff_bucket(
                old.bucket(role, kind),
                new.bucket(role, kind),
                old.bucket(role.opposite(), kind)
            );
        }
    }
    ds
}

/// Diff one bucket.
///
/// # Arguments
///
/// - `old`:            The bucket's previous contents
/// - `new`:            The bucket's desired contents
/// - `old_opposite`:   The previous contents of the bucket with the same kind
///                     but the opposite role.
fn diff_bucket(
    old: &BTreeSet<DeviceId>,
    new: &BTreeSet<DeviceId>,
    old_opposite: &BTreeSet<DeviceId>
) -> BucketDiff
{
    let mut bd = BucketDiff::default();
    for id in new.difference(old) {
        if old_opposite.contains(id) {
            bd.moved.insert(id.clone());
        } else {
            bd.created.insert(id.clone());
        }
    }
    bd.removed = old.difference(new).cloned().collect();
    bd
}

// LCOV_EXCL_STOP
