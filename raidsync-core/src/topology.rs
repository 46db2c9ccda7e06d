// vim: tw=80
//! The declared or observed membership of one array

use std::{
    collections::BTreeSet,
    fmt::{self, Display, Formatter},
};

use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};

use crate::{
    controller::{ArrayMember, ArraySummary},
    types::*,
};

/// The members of an array that share one role.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Members {
    /// Whole block devices
    #[serde(default)]
    pub devices:    BTreeSet<DeviceId>,
    #[serde(default)]
    pub partitions: BTreeSet<DeviceId>,
}

impl Members {
    pub fn new<D, P>(devices: D, partitions: P) -> Self
        where D: IntoIterator,
              D::Item: Into<DeviceId>,
              P: IntoIterator,
              P::Item: Into<DeviceId>
    {
        Members {
            devices: devices.into_iter().map(Into::into).collect(),
            partitions: partitions.into_iter().map(Into::into).collect(),
        }
    }

    /// Split the member list reported by the controller by device type
    pub fn from_controller(members: &[ArrayMember]) -> Result<Self> {
        let mut r = Members::default();
        for m in members {
            match DeviceKind::from_controller_type(&m.kind) {
                Some(DeviceKind::WholeDevice) => {
                    r.devices.insert(m.id.clone());
                }
                Some(DeviceKind::Partition) => {
                    r.partitions.insert(m.id.clone());
                }
                None => return Err(Error::UnknownDeviceType {
                    id: m.id.clone(),
                    kind: m.kind.clone()
                })
            }
        }
        Ok(r)
    }

    pub fn contains(&self, dref: &DeviceRef) -> bool {
        self.get(dref.kind).contains(&dref.id)
    }

    pub fn get(&self, kind: DeviceKind) -> &BTreeSet<DeviceId> {
        match kind {
            DeviceKind::WholeDevice => &self.devices,
            DeviceKind::Partition => &self.partitions,
        }
    }

    pub(crate) fn get_mut(&mut self, kind: DeviceKind)
        -> &mut BTreeSet<DeviceId>
    {
        match kind {
            DeviceKind::WholeDevice => &mut self.devices,
            DeviceKind::Partition => &mut self.partitions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.partitions.is_empty()
    }

    /// Iterate over every member, devices first
    pub fn iter(&self) -> impl Iterator<Item=DeviceRef> + '_ {
        DeviceKind::ALL.into_iter()
            .flat_map(move |kind| {
                self.get(kind).iter()
                    .map(move |id| DeviceRef::new(id.clone(), kind))
            })
    }

    /// Total number of members, devices plus partitions
    pub fn len(&self) -> usize {
        self.devices.len() + self.partitions.len()
    }
}

impl Display for Members {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "devices [{}] partitions [{}]",
               self.devices.iter().join(", "),
               self.partitions.iter().join(", "))
    }
}

/// The full membership of one array at one point in time.
///
/// Topologies are values.  Reconciliation builds fresh ones from each
/// declaration and each controller read rather than modifying them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Topology {
    level:  Level,
    active: Members,
    spare:  Members,
}

impl Topology {
    pub fn new(level: Level, active: Members, spare: Members) -> Self {
        Topology { level, active, spare }
    }

    /// Build a topology from the controller's view of an array
    pub fn from_summary(summary: &ArraySummary) -> Result<Self> {
        let level = summary.level.parse()?;
        let active = Members::from_controller(&summary.devices)?;
        let spare = Members::from_controller(&summary.spare_devices)?;
        Ok(Topology { level, active, spare })
    }

    pub fn active(&self) -> &Members {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// One (role, kind) bucket of members
    pub fn bucket(&self, role: Role, kind: DeviceKind) -> &BTreeSet<DeviceId>
    {
        self.members(role).get(kind)
    }

    /// Every member that is claimed by both roles at once.
    ///
    /// A valid topology has none.
    pub fn collisions(&self) -> impl Iterator<Item=DeviceRef> + '_ {
        DeviceKind::ALL.into_iter()
            .flat_map(move |kind| {
                self.active.get(kind).intersection(self.spare.get(kind))
                    .map(move |id| DeviceRef::new(id.clone(), kind))
            })
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn members(&self, role: Role) -> &Members {
        match role {
            Role::Active => &self.active,
            Role::Spare => &self.spare,
        }
    }

    /// Which role, if any, does this device play?
    pub fn role_of(&self, dref: &DeviceRef) -> Option<Role> {
        Role::ALL.into_iter()
            .find(|role| self.members(*role).contains(dref))
    }

    pub fn spare(&self) -> &Members {
        &self.spare
    }

    pub fn spare_count(&self) -> usize {
        self.spare.len()
    }

    /// Decompose into `(level, active, spare)`
    pub fn into_parts(self) -> (Level, Members, Members) {
        (self.level, self.active, self.spare)
    }
}

impl Display for Topology {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "RAID {}: active {}; spare {}", self.level, self.active,
               self.spare)
    }
}

// LCOV_EXCL_STOP
