//! Reshape arrays between many random pairs of valid topologies, and verify
//! that every intermediate state is valid too.

use pretty_assertions::assert_eq;
use rand::{Rng, SeedableRng, seq::SliceRandom, thread_rng};
use rand_xorshift::XorShiftRng;
use rstest::rstest;
use tracing::debug;

use raidsync_core::{
    *,
    apply::apply,
    fake::{
        ArraySpec,
        BlockDeviceSpec,
        Inventory,
        MachineSpec,
        PartitionSpec,
        SimController
    },
};

/// Number of candidate whole devices, and also of partitions
const NDEVS: usize = 8;
const LEVELS: [Level; 5] =
    [Level::Raid0, Level::Raid1, Level::Raid5, Level::Raid6, Level::Raid10];

fn device_name(kind: DeviceKind, i: usize) -> String {
    match kind {
        DeviceKind::WholeDevice => format!("d{i}"),
        DeviceKind::Partition => format!("c0p{i}"),
    }
}

/// Generate a random topology that satisfies the level's constraints
fn gen_topology(rng: &mut XorShiftRng, level: Level) -> Topology {
    loop {
        let mut active = Members::default();
        let mut spare = Members::default();
        for kind in DeviceKind::ALL {
            for i in 0..NDEVS {
                let id = DeviceId::from(device_name(kind, i));
                let x: f64 = rng.gen();
                if x < 0.4 {
                    match kind {
                        DeviceKind::WholeDevice => active.devices.insert(id),
                        DeviceKind::Partition => active.partitions.insert(id),
                    };
                } else if x < 0.6 && level.allows_spares() {
                    match kind {
                        DeviceKind::WholeDevice => spare.devices.insert(id),
                        DeviceKind::Partition => spare.partitions.insert(id),
                    };
                }
            }
        }
        let t = Topology::new(level, active, spare);
        if validate(&t, &MachineFacts::default()).is_ok() {
            break t;
        }
    }
}

/// Build a simulated controller whose only array has topology `t`
fn simulator(t: &Topology) -> SimController {
    let block_devices = (0..NDEVS)
        .map(|i| BlockDeviceSpec {
            id: DeviceId::from(device_name(DeviceKind::WholeDevice, i)),
            name: None,
            size: 1 << 30,
            partitions: Vec::new()
        }).chain(std::iter::once(BlockDeviceSpec {
            id: DeviceId::from("c0"),
            name: None,
            size: NDEVS as u64 * (1 << 30),
            partitions: (0..NDEVS).map(|i| PartitionSpec {
                id: DeviceId::from(device_name(DeviceKind::Partition, i)),
                name: None,
                size: 1 << 30
            }).collect()
        })).collect();
    let inventory = Inventory {
        machines: vec![MachineSpec {
            system_id: "m".to_owned(),
            hostname: "m".to_owned(),
            fqdn: None,
            boot_disk: None,
            block_devices
        }],
        arrays: vec![ArraySpec {
            id: 1,
            machine: "m".to_owned(),
            name: "md".to_owned(),
            level: t.level(),
            active: t.active().clone(),
            spare: t.spare().clone(),
        }]
    };
    SimController::new(inventory).unwrap()
}

/// Check the planner's invariants for one pair of topologies
fn check_plan(old: &Topology, new: &Topology) -> ApplyPlan {
    assert!(plan(&diff(old, old)).is_empty());

    let p = plan(&diff(old, new));
    assert!(p.len() <= Phase::ALL.len());
    let mut t = old.clone();
    let mut last_phase = None;
    for batch in &p {
        assert!(Some(batch.phase) > last_phase, "phases out of order");
        last_phase = Some(batch.phase);
        assert!(!batch.is_empty());
        assert!(batch.collisions().is_empty(), "{batch}");
        t = batch.apply_to(&t);
        assert!(t.active_count() >= t.level().min_active(),
            "{batch} left {t} while reshaping {old} into {new}");
        assert_eq!(0, t.collisions().count(), "{batch} left {t}");
    }
    assert_eq!(new, &t);
    p
}

/// Plan many random reshapes without executing them
#[rstest]
#[case(None)]
#[case(Some(12345))]
fn plan_random(#[case] seed: Option<u64>) {
    let seed = seed.unwrap_or_else(|| thread_rng().gen());
    println!("Using seed {seed}");
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let iterations = (2000.0 * crate::test_scale()) as usize;
    for _ in 0..iterations {
        let level = *LEVELS.choose(&mut rng).unwrap();
        let old = gen_topology(&mut rng, level);
        let new = gen_topology(&mut rng, level);
        check_plan(&old, &new);
    }
}

/// Execute random reshapes against a simulated controller, which rejects any
/// batch that would leave the array invalid.
#[rstest]
#[case(None)]
#[case(Some(67890))]
#[test_log::test(tokio::test)]
async fn apply_random(#[case] seed: Option<u64>) {
    let seed = seed.unwrap_or_else(|| thread_rng().gen());
    println!("Using seed {seed}");
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let iterations = (200.0 * crate::test_scale()) as usize;
    for _ in 0..iterations {
        let level = *LEVELS.choose(&mut rng).unwrap();
        let mut current = gen_topology(&mut rng, level);
        let sim = simulator(&current);
        // Reshape the same array several times in a row
        for _ in 0..4 {
            let new = gen_topology(&mut rng, level);
            let p = check_plan(&current, &new);
            debug!(%current, %new, batches = p.len(), "reshaping");
            let r = apply(&sim, "m", 1, &p).await;
            assert_eq!(Ok(new.clone()), r);
            current = new;
        }
    }
}
