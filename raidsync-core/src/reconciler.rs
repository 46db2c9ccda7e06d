// vim: tw=80
//! Create, read, update, and delete one array to match its declaration.

use serde_derive::Serialize;
use tracing::{info, instrument};

use crate::{
    apply::apply,
    controller::{ArraySummary, Controller, CreateParams, VirtualDevice},
    declaration::ArrayDeclaration,
    diff::diff,
    plan::{plan, ApplyPlan},
    topology::Topology,
    types::*,
    validate::{validate, Advisory, MachineFacts},
};

/// Bytes per gigabyte, as reported in [`ArrayState::size_gigabytes`]
pub const GIGABYTE: u64 = 1 << 30;

/// The observed state of an array
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ArrayState {
    pub id:             ArrayId,
    pub name:           String,
    /// System id of the owning machine
    pub machine:        String,
    pub level:          Level,
    #[serde(skip)]
    pub topology:       Topology,
    pub fs_type:        Option<String>,
    pub mount_point:    Option<String>,
    pub mount_options:  Option<String>,
    /// Usable size, rounded to the nearest gigabyte
    pub size_gigabytes: u64,
}

/// Round a byte count to the nearest gigabyte
fn gigabytes(bytes: u64) -> u64 {
    bytes / GIGABYTE + u64::from(bytes % GIGABYTE >= GIGABYTE / 2)
}

/// Drives a [`Controller`] to make arrays match their declarations.
#[derive(Debug)]
pub struct Reconciler<C> {
    controller: C,
}

impl<C: Controller> Reconciler<C> {
    pub fn new(controller: C) -> Self {
        Reconciler { controller }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Create a new array from a declaration.
    #[instrument(skip(self, decl), fields(name = %decl.name))]
    pub async fn create(&self, decl: &ArrayDeclaration) -> Result<ArrayState> {
        let (system_id, _) = self.check(decl).await?;
        let (level, active, spare) = decl.topology().into_parts();
        let params = CreateParams {
            name: decl.name.clone(),
            level,
            active,
            spare
        };
        let summary = self.controller.create_array(&system_id, &params).await?;
        self.format_and_mount(&summary.virtual_device, decl).await?;
        let state = self.read_by_system_id(&system_id, summary.id).await?;
        info!(array = state.id, "created array");
        Ok(state)
    }

    /// Remove an array from its machine.
    #[instrument(skip(self))]
    pub async fn delete(&self, machine: &str, array_id: ArrayId) -> Result<()>
    {
        let system_id = self.controller.resolve_machine(machine).await?;
        self.controller.delete_array(&system_id, array_id).await?;
        info!("deleted array");
        Ok(())
    }

    /// Format and then mount an array's virtual device, as requested.
    ///
    /// Does nothing if the declaration names no filesystem type or mount
    /// point.
    pub async fn format_and_mount(
        &self,
        vd: &VirtualDevice,
        decl: &ArrayDeclaration
    ) -> Result<VirtualDevice>
    {
        let system_id = vd.system_id.as_str();
        let mut vd = vd.clone();
        if let Some(fs_type) = decl.fs_type() {
            vd = self.controller.format(system_id, vd.id, fs_type).await?;
        }
        if let Some(mount_point) = decl.mount_point() {
            vd = self.controller.mount(system_id, vd.id, mount_point,
                                       decl.mount_options()).await?;
        }
        Ok(vd)
    }

    /// Compute the plan that [`Reconciler::update`] would apply, without
    /// changing anything.  Also returns the array's current topology.
    #[instrument(skip(self, decl), fields(name = %decl.name))]
    pub async fn plan(&self, array_id: ArrayId, decl: &ArrayDeclaration)
        -> Result<(Topology, ApplyPlan)>
    {
        let (_, summary, p) = self.prepare(array_id, decl).await?;
        let old = Topology::from_summary(&summary)?;
        Ok((old, p))
    }

    /// Read the array, validate the declaration against it, and plan the
    /// update.
    async fn prepare(&self, array_id: ArrayId, decl: &ArrayDeclaration)
        -> Result<(String, ArraySummary, ApplyPlan)>
    {
        decl.check()?;
        let system_id = self.controller.resolve_machine(&decl.machine).await?;
        let summary = self.controller.get_array(&system_id, array_id).await?;
        let old = Topology::from_summary(&summary)?;
        let new = decl.topology();
        if old.level() != new.level() {
            return Err(Error::ImmutableField("level"));
        }
        let facts = self.facts(&system_id).await?;
        validate(&new, &facts)?;
        let p = plan(&diff(&old, &new));
        Ok((system_id, summary, p))
    }

    /// Check whether a declaration would be accepted by
    /// [`Reconciler::create`], without changing anything.
    ///
    /// Returns any advisories about legal but unusual topologies.
    #[instrument(skip(self, decl), fields(name = %decl.name))]
    pub async fn validate(&self, decl: &ArrayDeclaration)
        -> Result<Vec<Advisory>>
    {
        self.check(decl).await.map(|(_, advisories)| advisories)
    }

    /// Look up an array's current state.
    #[instrument(skip(self))]
    pub async fn read(&self, machine: &str, array_id: ArrayId)
        -> Result<ArrayState>
    {
        let system_id = self.controller.resolve_machine(machine).await?;
        self.read_by_system_id(&system_id, array_id).await
    }

    /// Make an existing array match its declaration.
    ///
    /// The new topology is validated before anything is changed.  Membership
    /// changes are staged so the array stays valid after every step.
    #[instrument(skip(self, decl), fields(name = %decl.name))]
    pub async fn update(&self, array_id: ArrayId, decl: &ArrayDeclaration)
        -> Result<ArrayState>
    {
        let (system_id, summary, p) = self.prepare(array_id, decl).await?;
        if summary.name != decl.name {
            self.controller.rename_array(&system_id, array_id, &decl.name)
                .await?;
        }
        apply(&self.controller, &system_id, array_id, &p).await?;
        self.format_and_mount(&summary.virtual_device, decl).await?;
        let state = self.read_by_system_id(&system_id, array_id).await?;
        info!(batches = p.len(), "updated array");
        Ok(state)
    }

    /// Check a declaration against its machine, and return its system id.
    async fn check(&self, decl: &ArrayDeclaration)
        -> Result<(String, Vec<Advisory>)>
    {
        decl.check()?;
        let system_id = self.controller.resolve_machine(&decl.machine).await?;
        let facts = self.facts(&system_id).await?;
        let advisories = validate(&decl.topology(), &facts)?;
        Ok((system_id, advisories))
    }

    async fn facts(&self, system_id: &str) -> Result<MachineFacts> {
        let boot_disk = self.controller.boot_disk_id(system_id).await?;
        let partitioned = self.controller.partitioned_device_ids(system_id)
            .await?;
        Ok(MachineFacts { boot_disk, partitioned })
    }

    async fn read_by_system_id(&self, system_id: &str, array_id: ArrayId)
        -> Result<ArrayState>
    {
        let summary = self.controller.get_array(system_id, array_id).await?;
        let topology = Topology::from_summary(&summary)?;
        let fs = summary.virtual_device.filesystem;
        Ok(ArrayState {
            id: summary.id,
            name: summary.name,
            machine: summary.system_id,
            level: topology.level(),
            topology,
            fs_type: fs.fs_type,
            mount_point: fs.mount_point,
            mount_options: fs.mount_options,
            size_gigabytes: gigabytes(summary.size),
        })
    }
}

// LCOV_EXCL_STOP
