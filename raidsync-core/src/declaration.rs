// vim: tw=80
//! The user's declaration of what an array should look like.

use std::{fs, path::Path};

use serde_derive::{Deserialize, Serialize};

use crate::{
    topology::{Members, Topology},
    types::*,
};

/// Desired state of one array, usually read from a YAML file.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArrayDeclaration {
    pub name:             String,
    /// The owning machine's system id, hostname, or FQDN
    pub machine:          String,
    pub level:            Level,
    #[serde(default)]
    pub block_devices:    Vec<DeviceId>,
    #[serde(default)]
    pub partitions:       Vec<DeviceId>,
    #[serde(default)]
    pub spare_devices:    Vec<DeviceId>,
    #[serde(default)]
    pub spare_partitions: Vec<DeviceId>,
    /// If unset, the array is left unformatted
    #[serde(default)]
    pub fs_type:          Option<String>,
    /// If unset, the array is not mounted
    #[serde(default)]
    pub mount_point:      Option<String>,
    /// Comma separated
    #[serde(default)]
    pub mount_options:    Option<String>,
}

impl ArrayDeclaration {
    pub fn from_yaml(s: &str) -> Result<Self> {
        let decl: Self = serde_yaml_ng::from_str(s)
            .map_err(|e| Error::InvalidDeclaration(e.to_string()))?;
        decl.check()?;
        Ok(decl)
    }

    /// Read and check a declaration file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .map_err(|e| Error::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string()
            })?;
        Self::from_yaml(&s)
    }

    /// Check the constraints that don't depend on the machine.
    pub fn check(&self) -> Result<()> {
        if self.block_devices.is_empty() && self.partitions.is_empty() {
            return Err(Error::InvalidDeclaration(
                "at least one of block_devices or partitions must be given"
                    .to_owned()));
        }
        if self.mount_point().is_some() && self.fs_type().is_none() {
            return Err(Error::InvalidDeclaration(
                "fs_type must be specified when mount_point is set".to_owned()));
        }
        Ok(())
    }

    /// The filesystem type, treating an empty string as unset
    pub fn fs_type(&self) -> Option<&str> {
        self.fs_type.as_deref().filter(|s| !s.is_empty())
    }

    pub fn mount_point(&self) -> Option<&str> {
        self.mount_point.as_deref().filter(|s| !s.is_empty())
    }

    pub fn mount_options(&self) -> &str {
        self.mount_options.as_deref().unwrap_or("")
    }

    /// The topology this declaration asks for.
    ///
    /// Duplicate ids within one list collapse.
    pub fn topology(&self) -> Topology {
        Topology::new(
            self.level,
            Members::new(self.block_devices.iter().cloned(),
                         self.partitions.iter().cloned()),
            Members::new(self.spare_devices.iter().cloned(),
                         self.spare_partitions.iter().cloned()),
        )
    }
}

// LCOV_EXCL_STOP
