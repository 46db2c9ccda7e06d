// vim: tw=80
//! Turn a [`DiffSet`] into an ordered list of controller batches.
//!
//! The controller refuses any request that would leave an array with a role
//! collision or with too few active members, and it refuses a request that
//! both adds and removes the same id.  So a membership change is staged:
//!
//! 1. Add every brand new member, in its final role.
//! 2. Remove departing spares, including spares that are about to go active.
//! 3. Add the members moving into the active role.
//! 4. Remove departing actives, including actives that are about to go spare.
//! 5. Add the members moving into the spare role.
//!
//! Every addition to the active role happens before any removal from it, so if
//! the old and new topologies are both valid, so is every intermediate state.

use std::fmt::{self, Display, Formatter};

use itertools::Itertools;

use crate::{
    diff::DiffSet,
    topology::{Members, Topology},
    types::*,
};

/// The stage of a staged apply that a batch belongs to
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Phase {
    AddNew,
    RemoveSpares,
    AddMovedToActive,
    RemoveActives,
    AddMovedToSpare,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::AddNew,
        Phase::RemoveSpares,
        Phase::AddMovedToActive,
        Phase::RemoveActives,
        Phase::AddMovedToSpare,
    ];
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let s = match self {
            Phase::AddNew => "add new members",
            Phase::RemoveSpares => "remove spares",
            Phase::AddMovedToActive => "add moved members to active",
            Phase::RemoveActives => "remove actives",
            Phase::AddMovedToSpare => "add moved members to spare",
        };
        s.fmt(f)
    }
}

/// One membership change request, sent to the controller in a single call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Batch {
    pub phase:         Phase,
    pub add_active:    Members,
    pub add_spare:     Members,
    pub remove_active: Members,
    pub remove_spare:  Members,
}

impl Batch {
    pub fn new(phase: Phase) -> Self {
        Batch {
            phase,
            add_active: Members::default(),
            add_spare: Members::default(),
            remove_active: Members::default(),
            remove_spare: Members::default(),
        }
    }

    /// Apply this batch to a topology, as the controller would.
    pub fn apply_to(&self, topology: &Topology) -> Topology {
        let (level, mut active, mut spare) = topology.clone().into_parts();
        for kind in DeviceKind::ALL {
            let a = active.get_mut(kind);
            for id in self.remove_active.get(kind) {
                a.remove(id);
            }
            a.extend(self.add_active.get(kind).iter().cloned());
            let s = spare.get_mut(kind);
            for id in self.remove_spare.get(kind) {
                s.remove(id);
            }
            s.extend(self.add_spare.get(kind).iter().cloned());
        }
        Topology::new(level, active, spare)
    }

    /// Every id that appears in more than one of this batch's four lists.
    ///
    /// The controller rejects a batch that has any.
    pub fn collisions(&self) -> Vec<DeviceRef> {
        let lists = [&self.add_active, &self.add_spare, &self.remove_active,
                     &self.remove_spare];
        lists.iter()
            .flat_map(|m| m.iter())
            .duplicates()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.add_active.is_empty() && self.add_spare.is_empty() &&
            self.remove_active.is_empty() && self.remove_spare.is_empty()
    }

    fn members_mut(&mut self, op: Op, role: Role) -> &mut Members {
        match (op, role) {
            (Op::Add, Role::Active) => &mut self.add_active,
            (Op::Add, Role::Spare) => &mut self.add_spare,
            (Op::Remove, Role::Active) => &mut self.remove_active,
            (Op::Remove, Role::Spare) => &mut self.remove_spare,
        }
    }
}

impl Display for Batch {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}:", self.phase)?;
        let parts = [
            ("add active", &self.add_active),
            ("add spare", &self.add_spare),
            ("remove active", &self.remove_active),
            ("remove spare", &self.remove_spare),
        ];
        for (label, m) in parts.into_iter().filter(|(_, m)| !m.is_empty()) {
            write!(f, " {label} {m};")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Add,
    Remove
}

/// An ordered list of batches.  Empty phases are omitted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplyPlan {
    batches: Vec<Batch>,
}

impl ApplyPlan {
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Batch> {
        self.batches.iter()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Compute the topology that results from applying every batch in order
    pub fn simulate(&self, old: &Topology) -> Topology {
        self.batches.iter()
            .fold(old.clone(), |t, batch| batch.apply_to(&t))
    }
}

impl<'a> IntoIterator for &'a ApplyPlan {
    type Item = &'a Batch;
    type IntoIter = std::slice::Iter<'a, Batch>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Stage a diff into batches.  Pure; never fails.
pub fn plan(diff: &DiffSet) -> ApplyPlan {
    let batches = Phase::ALL.into_iter()
        .map(|phase| {
            let mut batch = Batch::new(phase);
            for kind in DeviceKind::ALL {
                for role in Role::ALL {
                    let bd = diff.get(role, kind);
                    // Which of the bucket's sets feeds this phase, if any
                    let (op, ids) = match (phase, role) {
                        (Phase::AddNew, _) => (Op::Add, &bd.created),
                        (Phase::RemoveSpares, Role::Spare) =>
                            (Op::Remove, &bd.removed),
                        (Phase::AddMovedToActive, Role::Active) =>
                            (Op::Add, &bd.moved),
                        (Phase::RemoveActives, Role::Active) =>
                            (Op::Remove, &bd.removed),
                        (Phase::AddMovedToSpare, Role::Spare) =>
                            (Op::Add, &bd.moved),
                        _ => continue
                    };
                    batch.members_mut(op, role).get_mut(kind)
                        .extend(ids.iter().cloned());
                }
            }
            batch
        }).filter(|batch| !batch.is_empty())
        .collect();
    ApplyPlan { batches }
}

// LCOV_EXCL_STOP
