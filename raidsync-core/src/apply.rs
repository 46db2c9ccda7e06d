// vim: tw=80
//! Execute an [`ApplyPlan`] against a live controller.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    controller::Controller,
    plan::{ApplyPlan, Phase},
    topology::Topology,
    types::*,
};

fn describe_completed(last_completed: &Option<Phase>) -> String {
    match last_completed {
        Some(phase) => format!("after completing \"{phase}\""),
        None => "before any batch completed".to_owned()
    }
}

/// A batch of a staged apply failed.
///
/// Batches that already completed are not rolled back.  The array is left in
/// the valid intermediate state that they produced.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to {failed} {}: {source}",
        describe_completed(.last_completed))]
pub struct ApplyError {
    /// The phase whose batch the controller rejected
    pub failed:         Phase,
    pub last_completed: Option<Phase>,
    pub source:         Box<Error>,
}

/// Send each batch of `plan` to the controller, in order, then read back the
/// array's new membership.
///
/// Each batch is awaited before the next is issued.  The first failure aborts
/// the apply.  An empty plan issues no mutations, only the final read.
#[instrument(skip(controller, plan), fields(batches = plan.len()))]
pub async fn apply<C>(
    controller: &C,
    system_id: &str,
    array_id: ArrayId,
    plan: &ApplyPlan
) -> Result<Topology>
    where C: Controller + ?Sized
{
    let mut last_completed = None;
    for batch in plan {
        debug!(%batch, "issuing batch");
        if let Err(e) = controller.apply_batch(system_id, array_id, batch).await
        {
            return Err(ApplyError {
                failed: batch.phase,
                last_completed,
                source: Box::new(e)
            }.into());
        }
        last_completed = Some(batch.phase);
    }
    let summary = controller.get_array(system_id, array_id).await?;
    Topology::from_summary(&summary)
}

// LCOV_EXCL_STOP
