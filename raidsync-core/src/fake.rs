// vim: tw=80
//! An in-memory [`Controller`], for tests and dry runs.
//!
//! `SimController` enforces the same per-request rules as a real controller,
//! so a plan that works here will not be rejected for ordering reasons by the
//! real thing.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
    fs,
    path::Path,
    sync::Mutex,
};

use async_trait::async_trait;
use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};

use crate::{
    controller::*,
    plan::{Batch, Phase},
    topology::{Members, Topology},
    types::*,
};

/// A partition of a simulated block device
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PartitionSpec {
    pub id:   DeviceId,
    #[serde(default)]
    pub name: Option<String>,
    /// Size in bytes
    pub size: u64,
}

/// A simulated whole block device
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockDeviceSpec {
    pub id:         DeviceId,
    #[serde(default)]
    pub name:       Option<String>,
    /// Size in bytes
    pub size:       u64,
    #[serde(default)]
    pub partitions: Vec<PartitionSpec>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineSpec {
    pub system_id:     String,
    pub hostname:      String,
    #[serde(default)]
    pub fqdn:          Option<String>,
    #[serde(default)]
    pub boot_disk:     Option<DeviceId>,
    #[serde(default)]
    pub block_devices: Vec<BlockDeviceSpec>,
}

impl MachineSpec {
    fn matches(&self, identifier: &str) -> bool {
        self.system_id == identifier || self.hostname == identifier ||
            self.fqdn.as_deref() == Some(identifier)
    }

    /// Look up a device's name and size
    fn device(&self, dref: &DeviceRef) -> Option<(String, u64)> {
        match dref.kind {
            DeviceKind::WholeDevice => self.block_devices.iter()
                .find(|bd| bd.id == dref.id)
                .map(|bd| (bd.name.clone().unwrap_or_else(|| bd.id.to_string()),
                           bd.size)),
            DeviceKind::Partition => self.block_devices.iter()
                .flat_map(|bd| bd.partitions.iter())
                .find(|p| p.id == dref.id)
                .map(|p| (p.name.clone().unwrap_or_else(|| p.id.to_string()),
                          p.size)),
        }
    }
}

/// An array that exists before the simulation starts
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArraySpec {
    pub id:      ArrayId,
    /// System id of the owning machine
    pub machine: String,
    pub name:    String,
    pub level:   Level,
    #[serde(default)]
    pub active:  Members,
    #[serde(default)]
    pub spare:   Members,
}

/// Initial state of a [`SimController`]
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Inventory {
    #[serde(default)]
    pub machines: Vec<MachineSpec>,
    #[serde(default)]
    pub arrays:   Vec<ArraySpec>,
}

impl Inventory {
    pub fn from_yaml(s: &str) -> Result<Self> {
        serde_yaml_ng::from_str(s)
            .map_err(|e| Error::InvalidInventory(e.to_string()))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|e| Error::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string()
            })?;
        Self::from_yaml(&s)
    }
}

/// One request received by a [`SimController`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    ResolveMachine(String),
    BootDiskId,
    PartitionedDeviceIds,
    GetArray(ArrayId),
    CreateArray(String),
    RenameArray(ArrayId, String),
    ApplyBatch(ArrayId, Phase),
    DeleteArray(ArrayId),
    Format(VirtualDeviceId, String),
    Mount(VirtualDeviceId, String),
}

impl Call {
    /// Does this call change the controller's state?
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::ResolveMachine(_) | Call::BootDiskId |
                  Call::PartitionedDeviceIds | Call::GetArray(_))
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Call::ResolveMachine(s) => write!(f, "resolve machine {s}"),
            Call::BootDiskId => write!(f, "get boot disk"),
            Call::PartitionedDeviceIds => write!(f, "get partitioned devices"),
            Call::GetArray(id) => write!(f, "get array {id}"),
            Call::CreateArray(name) => write!(f, "create array {name}"),
            Call::RenameArray(id, name) =>
                write!(f, "rename array {id} to {name}"),
            Call::ApplyBatch(id, phase) =>
                write!(f, "apply batch to array {id}: {phase}"),
            Call::DeleteArray(id) => write!(f, "delete array {id}"),
            Call::Format(id, fs_type) =>
                write!(f, "format virtual device {id} as {fs_type}"),
            Call::Mount(id, mp) =>
                write!(f, "mount virtual device {id} at {mp}"),
        }
    }
}

#[derive(Clone, Debug)]
struct SimArray {
    system_id:      String,
    name:           String,
    topology:       Topology,
    virtual_device: VirtualDevice,
}

#[derive(Debug, Default)]
struct Inner {
    machines:         Vec<MachineSpec>,
    arrays:           BTreeMap<ArrayId, SimArray>,
    calls:            Vec<Call>,
    next_array_id:    ArrayId,
    /// Number of apply_batch calls received so far
    batches:          usize,
    /// Fail the apply_batch call with this 1-based index
    fail_apply_batch: Option<usize>,
}

impl Inner {
    fn machine(&self, system_id: &str) -> Result<&MachineSpec> {
        self.machines.iter()
            .find(|m| m.system_id == system_id)
            .ok_or_else(|| Error::NotFound(format!("machine {system_id}")))
    }

    fn array(&self, system_id: &str, array_id: ArrayId) -> Result<&SimArray> {
        self.arrays.get(&array_id)
            .filter(|a| a.system_id == system_id)
            .ok_or_else(|| Error::NotFound(format!("array {array_id}")))
    }

    /// Apply the controller's rules to a prospective array topology
    fn check(&self, machine: &MachineSpec, array_id: Option<ArrayId>,
             t: &Topology) -> Result<()>
    {
        for dref in t.active().iter().chain(t.spare().iter()) {
            if machine.device(&dref).is_none() {
                return Err(Error::NotFound(dref.to_string()));
            }
            let in_use = self.arrays.iter()
                .filter(|(id, _)| Some(**id) != array_id)
                .any(|(_, a)| a.system_id == machine.system_id &&
                     a.topology.role_of(&dref).is_some());
            if in_use {
                return Err(Error::Controller(
                        format!("{dref} is already in use by another array")));
            }
        }
        if let Some(dref) = t.collisions().next() {
            return Err(Error::Controller(
                    format!("{dref} cannot be both active and spare")));
        }
        if t.active_count() < t.level().min_active() {
            return Err(Error::Controller(format!(
                "RAID {} requires at least {} active devices",
                t.level(), t.level().min_active())));
        }
        Ok(())
    }

    fn summary(&self, array_id: ArrayId, a: &SimArray) -> Result<ArraySummary> {
        let machine = self.machine(&a.system_id)?;
        let members = |m: &Members| -> Result<Vec<ArrayMember>> {
            m.iter()
                .map(|dref| {
                    let (name, _) = machine.device(&dref)
                        .ok_or_else(|| Error::NotFound(dref.to_string()))?;
                    Ok(ArrayMember::new(dref.id, name, dref.kind))
                }).collect()
        };
        Ok(ArraySummary {
            id: array_id,
            name: a.name.clone(),
            level: a.topology.level().controller_name(),
            system_id: a.system_id.clone(),
            size: usable_size(machine, &a.topology),
            devices: members(a.topology.active())?,
            spare_devices: members(a.topology.spare())?,
            virtual_device: a.virtual_device.clone(),
        })
    }
}

/// Usable size of an array, in bytes.  Every active member contributes as
/// much as the smallest one.
fn usable_size(machine: &MachineSpec, t: &Topology) -> u64 {
    let sizes = t.active().iter()
        .filter_map(|dref| machine.device(&dref).map(|(_, size)| size))
        .collect::<Vec<_>>();
    let n = sizes.len() as u64;
    let min = sizes.into_iter().min().unwrap_or(0);
    match t.level() {
        Level::Raid0 => n.saturating_mul(min),
        Level::Raid1 => min,
        Level::Raid5 => n.saturating_sub(1).saturating_mul(min),
        Level::Raid6 => n.saturating_sub(2).saturating_mul(min),
        Level::Raid10 => (n / 2).saturating_mul(min)
            .saturating_add(n % 2 * (min / 2)),
    }
}

/// The id of the virtual device exposed by an array
fn virtual_device_id(array_id: ArrayId) -> VirtualDeviceId {
    1000 + array_id
}

/// A simulated controller
#[derive(Debug)]
pub struct SimController {
    inner: Mutex<Inner>,
}

impl SimController {
    pub fn new(inventory: Inventory) -> Result<Self> {
        let mut inner = Inner {
            machines: inventory.machines,
            next_array_id: 1,
            .. Default::default()
        };
        for spec in inventory.arrays {
            let topology = Topology::new(spec.level, spec.active, spec.spare);
            let machine = inner.machine(&spec.machine)?;
            inner.check(machine, Some(spec.id), &topology)?;
            let sa = SimArray {
                system_id: spec.machine.clone(),
                name: spec.name,
                topology,
                virtual_device: VirtualDevice {
                    id: virtual_device_id(spec.id),
                    system_id: spec.machine,
                    filesystem: Filesystem::default()
                }
            };
            inner.arrays.insert(spec.id, sa);
            inner.next_array_id = inner.next_array_id.max(spec.id + 1);
        }
        Ok(SimController { inner: Mutex::new(inner) })
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Every state-changing call received so far, in order
    pub fn mutations(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Make the `n`th call to `apply_batch`, counting from 1, fail without
    /// changing anything.
    pub fn fail_apply_batch(&self, n: usize) {
        self.inner.lock().unwrap().fail_apply_batch = Some(n);
    }

    /// The current membership of an array
    pub fn topology(&self, array_id: ArrayId) -> Option<Topology> {
        self.inner.lock().unwrap().arrays.get(&array_id)
            .map(|a| a.topology.clone())
    }

    /// The ids of every array that currently exists
    pub fn array_ids(&self) -> Vec<ArrayId> {
        self.inner.lock().unwrap().arrays.keys().cloned().collect()
    }
}

#[async_trait]
impl Controller for SimController {
    async fn resolve_machine(&self, identifier: &str) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::ResolveMachine(identifier.to_owned()));
        inner.machines.iter()
            .find(|m| m.matches(identifier))
            .map(|m| m.system_id.clone())
            .ok_or_else(|| Error::NotFound(format!("machine {identifier}")))
    }

    async fn boot_disk_id(&self, system_id: &str) -> Result<Option<DeviceId>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::BootDiskId);
        Ok(inner.machine(system_id)?.boot_disk.clone())
    }

    async fn partitioned_device_ids(&self, system_id: &str)
        -> Result<BTreeSet<DeviceId>>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::PartitionedDeviceIds);
        Ok(inner.machine(system_id)?.block_devices.iter()
            .filter(|bd| !bd.partitions.is_empty())
            .map(|bd| bd.id.clone())
            .collect())
    }

    async fn get_array(&self, system_id: &str, array_id: ArrayId)
        -> Result<ArraySummary>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::GetArray(array_id));
        let a = inner.array(system_id, array_id)?;
        inner.summary(array_id, a)
    }

    async fn create_array(&self, system_id: &str, params: &CreateParams)
        -> Result<ArraySummary>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::CreateArray(params.name.clone()));
        let topology = Topology::new(params.level, params.active.clone(),
                                     params.spare.clone());
        inner.check(inner.machine(system_id)?, None, &topology)?;
        let array_id = inner.next_array_id;
        inner.next_array_id += 1;
        let sa = SimArray {
            system_id: system_id.to_owned(),
            name: params.name.clone(),
            topology,
            virtual_device: VirtualDevice {
                id: virtual_device_id(array_id),
                system_id: system_id.to_owned(),
                filesystem: Filesystem::default()
            }
        };
        let summary = inner.summary(array_id, &sa)?;
        inner.arrays.insert(array_id, sa);
        Ok(summary)
    }

    async fn rename_array(&self, system_id: &str, array_id: ArrayId,
                          name: &str) -> Result<ArraySummary>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::RenameArray(array_id, name.to_owned()));
        let mut a = inner.array(system_id, array_id)?.clone();
        a.name = name.to_owned();
        let summary = inner.summary(array_id, &a)?;
        inner.arrays.insert(array_id, a);
        Ok(summary)
    }

    async fn apply_batch(&self, system_id: &str, array_id: ArrayId,
                         batch: &Batch) -> Result<ArraySummary>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::ApplyBatch(array_id, batch.phase));
        inner.batches += 1;
        if inner.fail_apply_batch == Some(inner.batches) {
            return Err(Error::Controller("simulated failure".to_owned()));
        }
        let collisions = batch.collisions();
        if !collisions.is_empty() {
            return Err(Error::Controller(format!(
                "cannot both add and remove {}", collisions.iter().join(", "))));
        }
        let mut a = inner.array(system_id, array_id)?.clone();
        for (role, removals) in [(Role::Active, &batch.remove_active),
                                 (Role::Spare, &batch.remove_spare)]
        {
            for dref in removals.iter() {
                if a.topology.role_of(&dref) != Some(role) {
                    return Err(Error::Controller(
                        format!("{dref} is not a {role} member of array \
                                {array_id}")));
                }
            }
        }
        a.topology = batch.apply_to(&a.topology);
        inner.check(inner.machine(system_id)?, Some(array_id), &a.topology)?;
        let summary = inner.summary(array_id, &a)?;
        inner.arrays.insert(array_id, a);
        Ok(summary)
    }

    async fn delete_array(&self, system_id: &str, array_id: ArrayId)
        -> Result<()>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::DeleteArray(array_id));
        inner.array(system_id, array_id)?;
        inner.arrays.remove(&array_id);
        Ok(())
    }

    async fn format(&self, system_id: &str, device_id: VirtualDeviceId,
                    fs_type: &str) -> Result<VirtualDevice>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Format(device_id, fs_type.to_owned()));
        let a = inner.arrays.values_mut()
            .find(|a| a.system_id == system_id &&
                  a.virtual_device.id == device_id)
            .ok_or_else(|| Error::NotFound(
                    format!("virtual device {device_id}")))?;
        a.virtual_device.filesystem = Filesystem {
            fs_type: Some(fs_type.to_owned()),
            mount_point: None,
            mount_options: None,
        };
        Ok(a.virtual_device.clone())
    }

    async fn mount(&self, system_id: &str, device_id: VirtualDeviceId,
                   mount_point: &str, mount_options: &str)
        -> Result<VirtualDevice>
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Mount(device_id, mount_point.to_owned()));
        let a = inner.arrays.values_mut()
            .find(|a| a.system_id == system_id &&
                  a.virtual_device.id == device_id)
            .ok_or_else(|| Error::NotFound(
                    format!("virtual device {device_id}")))?;
        let fs = &mut a.virtual_device.filesystem;
        if fs.fs_type.is_none() {
            return Err(Error::Controller(format!(
                "virtual device {device_id} has no filesystem to mount")));
        }
        fs.mount_point = Some(mount_point.to_owned());
        fs.mount_options = Some(mount_options.to_owned())
            .filter(|s| !s.is_empty());
        Ok(a.virtual_device.clone())
    }
}

// LCOV_EXCL_STOP
