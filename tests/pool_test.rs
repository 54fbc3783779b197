use fleetctl::domain::model::ReleaseTarget;
use fleetctl::{FleetError, VmPool};
use tempfile::TempDir;

#[test]
fn test_reset_step_finish_lifecycle_persists_across_handles() {
    let dir = TempDir::new().unwrap();
    let state_dir = dir.path().join("vm_cache");

    // reset: allocate and start the idle timeout
    let server_a = VmPool::open(&state_dir, 50).unwrap();
    let vm_id = server_a.allocate().unwrap();
    server_a.set_timeout(vm_id, 180).unwrap();

    // step from another server process
    let server_b = VmPool::open(&state_dir, 50).unwrap();
    server_b.touch(vm_id).unwrap();
    assert!(server_b.sweep(60).unwrap().is_empty());
    assert_eq!(server_b.snapshot().unwrap().leases[&vm_id].lifetime, 180);

    // finish: release
    assert_eq!(server_a.release(ReleaseTarget::One(vm_id)).unwrap(), vec![vm_id]);
    let snapshot = server_b.snapshot().unwrap();
    assert!(snapshot.active.is_empty());
    assert_eq!(snapshot.available.last(), Some(&vm_id));

    assert!(matches!(server_b.touch(vm_id), Err(FleetError::VmNotActive { .. })));
}

#[test]
fn test_state_files_are_plain_json() {
    let dir = TempDir::new().unwrap();
    let pool = VmPool::open(dir.path(), 2).unwrap();
    let vm_id = pool.allocate().unwrap();
    pool.set_timeout(vm_id, 60).unwrap();

    let available: Vec<u32> =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("available.json")).unwrap())
            .unwrap();
    let vm_map: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("vm_map.json")).unwrap())
            .unwrap();

    assert_eq!(available, vec![2, 1]);
    assert_eq!(
        vm_map,
        serde_json::json!({ "0": { "timeout": 60, "lifetime": 60, "visited": false } })
    );
}

#[test]
fn test_timed_out_vm_is_reclaimed_after_enough_sweeps() {
    let dir = TempDir::new().unwrap();
    let pool = VmPool::open(dir.path(), 5).unwrap();
    let vm_id = pool.allocate().unwrap();
    pool.set_timeout(vm_id, 150).unwrap();

    assert!(pool.sweep(60).unwrap().is_empty());
    assert!(pool.sweep(60).unwrap().is_empty());
    assert_eq!(pool.sweep(60).unwrap(), vec![vm_id]);
    assert_eq!(pool.allocate().unwrap(), vm_id);
}
