// vim: tw=80
//! Checks a requested topology before any change is made to the array.
//!
//! Partially applying a bad topology can't be undone by simply retrying, so
//! every constraint that the controller would enforce, or that would leave the
//! machine in a surprising state, is checked up front.

use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::{topology::Topology, types::*};

/// Facts about the machine that hosts an array, needed for validation.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineFacts {
    /// The machine's boot disk, if it has one
    #[serde(default)]
    pub boot_disk:   Option<DeviceId>,
    /// Every whole block device that already has partitions
    #[serde(default)]
    pub partitioned: BTreeSet<DeviceId>,
}

/// A reason to reject a requested topology
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Violation {
    #[error("cannot include {kind} {id} as both active and spare, specify only a single location for the disk")]
    RoleCollision {
        id:   DeviceId,
        kind: DeviceKind
    },

    /// The controller partitions every whole-device member once the boot disk
    /// joins an array.
    #[error("cannot construct a RAID with block devices if the boot disk {boot_disk} is participating.  Provide partitions on top of provided block devices instead")]
    BootDiskConflict {
        boot_disk: DeviceId
    },

    #[error("cannot create a RAID from a block device with partitions, supply the partitions for {id} instead")]
    PartitionedDeviceAsMember {
        id: DeviceId
    },

    #[error("RAID level {level} requires at least {required} active disks, but only {actual} were supplied")]
    InsufficientActiveCount {
        level:    Level,
        required: usize,
        actual:   usize
    },

    #[error("RAID level {level} cannot use hot spares, supply active disks only")]
    SparesNotAllowed {
        level:  Level,
        spares: usize
    },
}

/// A legal but unusual topology.  Worth telling the user about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Advisory {
    /// A RAID 1 array only ever uses one spare during recovery
    UnusedSpares {
        spares: usize
    },
    /// A RAID 5 array with several spares would be more fault tolerant as
    /// RAID 6
    ConsiderRaid6 {
        spares: usize
    },
    MoreSparesThanActive {
        spares: usize,
        active: usize
    },
}

impl Display for Advisory {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Advisory::UnusedSpares{spares} => write!(f,
                "RAID level 1 with {spares} spares is unusual - only one spare is used during recovery"),
            Advisory::ConsiderRaid6{spares} => write!(f,
                "RAID level 5 with {spares} spares might not be the most fault tolerant topology - have you considered RAID 6 with {} spares instead?",
                spares - 1),
            Advisory::MoreSparesThanActive{spares, active} => write!(f,
                "RAID has more spares ({spares}) than active disks ({active}) - is this intentional?"),
        }
    }
}

/// Check a candidate topology.
///
/// # Returns
///
/// The first violated constraint, or else any advisories about the topology.
/// Advisories are also logged.
pub fn validate(candidate: &Topology, facts: &MachineFacts)
    -> std::result::Result<Vec<Advisory>, Violation>
{
    check_collisions(candidate)?;
    check_boot_disk(candidate, facts)?;
    check_partitioned(candidate, facts)?;
    check_level(candidate)?;
    let advisories = advise(candidate);
    for a in advisories.iter() {
        tracing::warn!("{}", a);
    }
    Ok(advisories)
}

fn check_collisions(candidate: &Topology)
    -> std::result::Result<(), Violation>
{
    match candidate.collisions().next() {
        Some(DeviceRef{id, kind}) => Err(Violation::RoleCollision{id, kind}),
        None => Ok(())
    }
}

/// Only whole-device membership of the boot disk matters.  Its partitions may
/// be members alongside any other partitions.
fn check_boot_disk(candidate: &Topology, facts: &MachineFacts)
    -> std::result::Result<(), Violation>
{
    let Some(boot_disk) = facts.boot_disk.as_ref() else {
        return Ok(());
    };
    let boot_disk_is_member = Role::ALL.into_iter()
        .any(|role| {
            candidate.bucket(role, DeviceKind::WholeDevice).contains(boot_disk)
        });
    if boot_disk_is_member {
        Err(Violation::BootDiskConflict{boot_disk: boot_disk.clone()})
    } else {
        Ok(())
    }
}

fn check_partitioned(candidate: &Topology, facts: &MachineFacts)
    -> std::result::Result<(), Violation>
{
    Role::ALL.into_iter()
        .flat_map(|role| candidate.bucket(role, DeviceKind::WholeDevice))
        .find(|id| facts.partitioned.contains(*id))
        .map_or(Ok(()), |id| {
            Err(Violation::PartitionedDeviceAsMember{id: id.clone()})
        })
}

fn check_level(candidate: &Topology) -> std::result::Result<(), Violation> {
    let level = candidate.level();
    let active = candidate.active_count();
    let spares = candidate.spare_count();
    if active < level.min_active() {
        return Err(Violation::InsufficientActiveCount {
            level,
            required: level.min_active(),
            actual: active
        });
    }
    if !level.allows_spares() && spares > 0 {
        return Err(Violation::SparesNotAllowed{level, spares});
    }
    Ok(())
}

fn advise(candidate: &Topology) -> Vec<Advisory> {
    let active = candidate.active_count();
    let spares = candidate.spare_count();
    let mut advisories = Vec::new();
    match candidate.level() {
        Level::Raid1 if spares > 1 => {
            advisories.push(Advisory::UnusedSpares{spares});
        }
        Level::Raid5 if spares > 1 => {
            advisories.push(Advisory::ConsiderRaid6{spares});
        }
        _ => ()
    }
    if spares > active {
        advisories.push(Advisory::MoreSparesThanActive{spares, active});
    }
    advisories
}

// LCOV_EXCL_STOP
