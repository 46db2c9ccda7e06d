// vim: tw=80
//! Common type definitions used throughout raidsync

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::{apply::ApplyError, validate::Violation};

/// Identifies an array on its machine.  Assigned by the controller.
pub type ArrayId = u64;

/// Identifies the virtual block device that an array exposes.
pub type VirtualDeviceId = u64;

/// raidsync's error type
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// The requested topology is not acceptable.  No changes were made.
    #[error(transparent)]
    Validation(#[from] Violation),

    /// One batch of a staged apply failed.  The array may be only partially
    /// reconciled.
    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("{0} not found")]
    NotFound(String),

    /// Any other error reported by the controller
    #[error("controller error: {0}")]
    Controller(String),

    #[error("device {id} has an unknown type: {kind}")]
    UnknownDeviceType {
        id:   DeviceId,
        kind: String
    },

    #[error("invalid RAID level {0:?}.  Valid levels are: \"0\", \"1\", \"5\", \"6\", \"10\"")]
    InvalidLevel(String),

    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    #[error("invalid inventory: {0}")]
    InvalidInventory(String),

    /// A declaration or inventory file could not be read at all
    #[error("cannot read {path}: {reason}")]
    Unreadable {
        path:   String,
        reason: String
    },

    #[error("{0} cannot be changed on an existing array")]
    ImmutableField(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Controllers and hand-written YAML are inconsistent about whether ids are
/// numbers or strings.  Accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(u64),
    Str(String),
}

impl From<NumOrStr> for String {
    fn from(v: NumOrStr) -> Self {
        match v {
            NumOrStr::Num(n) => n.to_string(),
            NumOrStr::Str(s) => s
        }
    }
}

/// Opaque identifier of a whole block device or a partition.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
         Serialize)]
#[serde(from = "NumOrStr", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        DeviceId(s.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        DeviceId(s)
    }
}

impl From<u64> for DeviceId {
    fn from(n: u64) -> Self {
        DeviceId(n.to_string())
    }
}

impl From<NumOrStr> for DeviceId {
    fn from(v: NumOrStr) -> Self {
        DeviceId(String::from(v))
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// What sort of block device an array member is
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq,
         PartialOrd, Serialize)]
pub enum DeviceKind {
    /// An entire physical disk
    WholeDevice,
    /// One partition of a physical disk
    Partition,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::WholeDevice,
                                      DeviceKind::Partition];

    /// Interpret the device type string reported by the controller
    pub fn from_controller_type(s: &str) -> Option<Self> {
        match s {
            "physical" => Some(DeviceKind::WholeDevice),
            "partition" => Some(DeviceKind::Partition),
            _ => None
        }
    }

    pub fn controller_type(self) -> &'static str {
        match self {
            DeviceKind::WholeDevice => "physical",
            DeviceKind::Partition => "partition",
        }
    }
}

impl Display for DeviceKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            DeviceKind::WholeDevice => "block device".fmt(f),
            DeviceKind::Partition => "partition".fmt(f),
        }
    }
}

/// The part a member plays in its array
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq,
         PartialOrd, Serialize)]
pub enum Role {
    Active,
    Spare,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Active, Role::Spare];

    pub fn opposite(self) -> Self {
        match self {
            Role::Active => Role::Spare,
            Role::Spare => Role::Active,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Role::Active => "active".fmt(f),
            Role::Spare => "spare".fmt(f),
        }
    }
}

/// One array member, or a candidate for membership
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DeviceRef {
    pub id:   DeviceId,
    pub kind: DeviceKind,
}

impl DeviceRef {
    pub fn new<I: Into<DeviceId>>(id: I, kind: DeviceKind) -> Self {
        DeviceRef { id: id.into(), kind }
    }
}

impl Display for DeviceRef {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// RAID level.  Determines the minimum number of active members, and whether
/// spares may be used at all.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "NumOrStr", into = "String")]
pub enum Level {
    Raid0,
    Raid1,
    Raid5,
    Raid6,
    Raid10,
}

impl Level {
    /// The name the controller uses for this level, like "raid-5"
    pub fn controller_name(self) -> String {
        format!("raid-{self}")
    }

    /// Minimum number of active members an array of this level may have.
    pub fn min_active(self) -> usize {
        match self {
            Level::Raid0 | Level::Raid1 => 2,
            Level::Raid5 | Level::Raid10 => 3,
            Level::Raid6 => 4,
        }
    }

    pub fn allows_spares(self) -> bool {
        self != Level::Raid0
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let s = match self {
            Level::Raid0 => "0",
            Level::Raid1 => "1",
            Level::Raid5 => "5",
            Level::Raid6 => "6",
            Level::Raid10 => "10",
        };
        s.fmt(f)
    }
}

impl FromStr for Level {
    type Err = Error;

    /// Parse either the bare level ("5") or the controller's name ("raid-5")
    fn from_str(s: &str) -> Result<Self> {
        match s.strip_prefix("raid-").unwrap_or(s) {
            "0" => Ok(Level::Raid0),
            "1" => Ok(Level::Raid1),
            "5" => Ok(Level::Raid5),
            "6" => Ok(Level::Raid6),
            "10" => Ok(Level::Raid10),
            _ => Err(Error::InvalidLevel(s.to_owned()))
        }
    }
}

impl TryFrom<NumOrStr> for Level {
    type Error = Error;

    fn try_from(v: NumOrStr) -> Result<Self> {
        String::from(v).parse()
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.to_string()
    }
}

// LCOV_EXCL_STOP
