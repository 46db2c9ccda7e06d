// vim: tw=80
use predicates::prelude::*;
use rstest::rstest;

use super::*;

#[rstest]
fn swap(harness: Harness) {
    let decl = harness.write("md0.yaml", MD0_SWAPPED);
    raidsync()
        .arg("apply")
        .arg("--inventory")
        .arg(harness.inventory())
        .args(["--array", "1"])
        .arg(&decl)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "apply batch to array 1: remove spares\n\
             apply batch to array 1: add moved members to active\n\
             apply batch to array 1: remove actives\n\
             apply batch to array 1: add moved members to spare\n"))
        .stdout(predicate::str::is_match(r"active\s+block device\s+bd3")
                .unwrap())
        .stdout(predicate::str::is_match(r"spare\s+partition\s+bd2p")
                .unwrap());
}

#[rstest]
fn rename_and_format(harness: Harness) {
    let decl = harness.write("md0.yaml", r#"
name: data
machine: node1
level: 1
block_devices: [bd1]
partitions: [bd2p]
spare_devices: [bd3]
spare_partitions: [bd4p]
fs_type: ext4
mount_point: /data
"#);
    raidsync()
        .arg("apply")
        .arg("-i")
        .arg(harness.inventory())
        .args(["-a", "1"])
        .arg(&decl)
        .assert()
        .success()
        .stdout(predicate::str::contains("rename array 1 to data"))
        .stdout(predicate::str::contains("format virtual device 1001 as ext4"))
        .stdout(predicate::str::contains("mount virtual device 1001 at /data"))
        .stdout(predicate::str::contains("apply batch").not());
}

#[rstest]
fn too_few_actives(harness: Harness) {
    let decl = harness.write("md0.yaml", r#"
name: md0
machine: node1
level: 1
partitions: [bd2p]
"#);
    raidsync()
        .arg("apply")
        .arg("-i")
        .arg(harness.inventory())
        .args(["-a", "1"])
        .arg(&decl)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("InsufficientActiveCount"));
}

#[rstest]
fn no_such_array(harness: Harness) {
    let decl = harness.write("md0.yaml", MD0);
    raidsync()
        .arg("apply")
        .arg("-i")
        .arg(harness.inventory())
        .args(["-a", "2"])
        .arg(&decl)
        .assert()
        .failure()
        .stderr(predicate::str::contains("NotFound"));
}
