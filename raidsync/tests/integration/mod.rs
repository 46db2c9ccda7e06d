use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use assert_cmd::prelude::*;
use rstest::fixture;
use tempfile::{Builder, TempDir};

mod apply;

const INVENTORY: &str = r#"
machines:
  - system_id: abc123
    hostname: node1
    boot_disk: bd0
    block_devices:
      - {id: bd0, size: 10737418240,
         partitions: [{id: bd0p1, size: 10737418240}]}
      - {id: bd1, size: 10737418240}
      - {id: bd2, size: 10737418240,
         partitions: [{id: bd2p, size: 10737418240}]}
      - {id: bd3, size: 10737418240}
      - {id: bd4, size: 10737418240,
         partitions: [{id: bd4p, size: 10737418240}]}
      - {id: bd5, size: 10737418240}
arrays:
  - id: 1
    machine: abc123
    name: md0
    level: 1
    active: {devices: [bd1], partitions: [bd2p]}
    spare: {devices: [bd3], partitions: [bd4p]}
"#;

/// The declaration matching array 1 of the inventory
const MD0: &str = r#"
name: md0
machine: node1
level: 1
block_devices: [bd1]
partitions: [bd2p]
spare_devices: [bd3]
spare_partitions: [bd4p]
"#;

/// Array 1 with its active and spare members swapped
const MD0_SWAPPED: &str = r#"
name: md0
machine: node1
level: 1
block_devices: [bd3]
partitions: [bd4p]
spare_devices: [bd1]
spare_partitions: [bd2p]
"#;

pub fn raidsync() -> Command {
    let mut cmd = Command::cargo_bin("raidsync").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

/// A scratch directory with an inventory file in it
struct Harness {
    tempdir:   TempDir,
    inventory: PathBuf,
}

impl Harness {
    /// Write a file into the scratch directory
    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.tempdir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn inventory(&self) -> &Path {
        &self.inventory
    }
}

#[fixture]
fn harness() -> Harness {
    let tempdir = Builder::new()
        .prefix(concat!(module_path!(), "."))
        .tempdir()
        .unwrap();
    let inventory = tempdir.path().join("inventory.yaml");
    fs::write(&inventory, INVENTORY).unwrap();
    Harness { tempdir, inventory }
}
