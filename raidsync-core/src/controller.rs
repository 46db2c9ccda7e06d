// vim: tw=80
//! The interface to the machine-management controller that owns the arrays.

use std::collections::BTreeSet;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use serde_derive::{Deserialize, Serialize};

use crate::{plan::Batch, topology::Members, types::*};

/// One member of an array, as the controller reports it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArrayMember {
    pub id:   DeviceId,
    pub name: String,
    /// Either "physical" or "partition"
    #[serde(rename = "type")]
    pub kind: String,
}

impl ArrayMember {
    pub fn new(id: DeviceId, name: String, kind: DeviceKind) -> Self {
        ArrayMember { id, name, kind: kind.controller_type().to_owned() }
    }
}

/// The filesystem on an array's virtual device, if any
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Filesystem {
    pub fs_type:       Option<String>,
    pub mount_point:   Option<String>,
    pub mount_options: Option<String>,
}

/// The block device that an array exposes to the rest of the machine.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct VirtualDevice {
    pub id:         VirtualDeviceId,
    pub system_id:  String,
    #[serde(default)]
    pub filesystem: Filesystem,
}

/// Everything the controller reports about one array
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArraySummary {
    pub id:             ArrayId,
    pub name:           String,
    /// Level in the controller's format, like "raid-5"
    pub level:          String,
    pub system_id:      String,
    /// Usable size in bytes
    pub size:           u64,
    pub devices:        Vec<ArrayMember>,
    pub spare_devices:  Vec<ArrayMember>,
    pub virtual_device: VirtualDevice,
}

/// Arguments to [`Controller::create_array`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateParams {
    pub name:   String,
    pub level:  Level,
    pub active: Members,
    pub spare:  Members,
}

/// A machine-management controller.
///
/// Every mutating method is a single request.  The controller validates each
/// request against the array's current state, and either applies all of it or
/// none of it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Controller: Send + Sync {
    /// Look up a machine's system id by its system id, hostname, or FQDN.
    async fn resolve_machine(&self, identifier: &str) -> Result<String>;

    /// Return the id of the machine's boot disk, if it has one.
    async fn boot_disk_id(&self, system_id: &str) -> Result<Option<DeviceId>>;

    /// Return the ids of every whole block device that has partitions.
    async fn partitioned_device_ids(&self, system_id: &str)
        -> Result<BTreeSet<DeviceId>>;

    async fn get_array(&self, system_id: &str, array_id: ArrayId)
        -> Result<ArraySummary>;

    async fn create_array(&self, system_id: &str, params: &CreateParams)
        -> Result<ArraySummary>;

    async fn rename_array(&self, system_id: &str, array_id: ArrayId,
                          name: &str) -> Result<ArraySummary>;

    /// Add and remove members in one request.
    async fn apply_batch(&self, system_id: &str, array_id: ArrayId,
                         batch: &Batch) -> Result<ArraySummary>;

    async fn delete_array(&self, system_id: &str, array_id: ArrayId)
        -> Result<()>;

    /// Create a filesystem on a virtual device
    async fn format(&self, system_id: &str, device_id: VirtualDeviceId,
                    fs_type: &str) -> Result<VirtualDevice>;

    /// Mount a virtual device's filesystem.  `mount_options` may be empty.
    async fn mount(&self, system_id: &str, device_id: VirtualDeviceId,
                   mount_point: &str, mount_options: &str)
        -> Result<VirtualDevice>;
}

// LCOV_EXCL_STOP
