// vim: tw=80
//! Reconcile the membership of a RAID array with a declared topology.
//!
//! A request is validated, diffed against the array's current membership, and
//! then applied as a short sequence of controller batches, ordered so that the
//! array never drops below its level's minimum number of active members.

pub mod apply;
pub mod controller;
pub mod declaration;
pub mod diff;
pub mod fake;
pub mod plan;
pub mod reconciler;
pub mod topology;
pub mod types;
pub mod validate;

pub use crate::types::*;
pub use crate::{
    apply::ApplyError,
    controller::Controller,
    declaration::ArrayDeclaration,
    diff::{diff, DiffSet},
    plan::{plan, ApplyPlan, Batch, Phase},
    reconciler::{ArrayState, Reconciler},
    topology::{Members, Topology},
    validate::{validate, Advisory, MachineFacts, Violation},
};
