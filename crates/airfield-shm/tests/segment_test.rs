//! Segment lifetime across handles: what an external reader sees once the
//! coordinator has closed its own mapping.

use airfield_config::testing::TestEnvironment;
use airfield_shm::{SharedState, ShmError, Slot};

#[test]
fn test_segment_outlives_coordinator_handle() {
    let env = TestEnvironment::new().unwrap();

    let mut coordinator = SharedState::create(&env.shm_name).unwrap();
    coordinator.write_slot(Slot::Radio, 31337);
    coordinator.close().unwrap();

    // close() must not unlink: a late reader still finds both pids
    let reader = SharedState::open(&env.shm_name).unwrap();
    assert_eq!(reader.read_slot(Slot::Air), std::process::id() as i32);
    assert_eq!(reader.read_slot(Slot::Radio), 31337);
    assert_eq!(reader.read_slot(Slot::Ground), 0);
    drop(reader);

    SharedState::remove(&env.shm_name).unwrap();
    assert!(matches!(
        SharedState::open(&env.shm_name),
        Err(ShmError::Open { .. })
    ));
}

#[test]
fn test_writes_through_one_mapping_are_seen_by_another() {
    let env = TestEnvironment::new().unwrap();

    let coordinator = SharedState::create(&env.shm_name).unwrap();
    let mut ground = SharedState::open(&env.shm_name).unwrap();
    ground.write_slot(Slot::Ground, 4040);

    assert_eq!(coordinator.read_slot(Slot::Ground), 4040);
    assert_eq!(ground.read_slot(Slot::Air), coordinator.read_slot(Slot::Air));

    ground.close().unwrap();
    coordinator.close().unwrap();
    SharedState::remove(&env.shm_name).unwrap();
}

#[test]
fn test_concurrent_readers_share_one_mapping() {
    let env = TestEnvironment::new().unwrap();
    let mut segment = SharedState::create(&env.shm_name).unwrap();
    segment.write_slot(Slot::Radio, 999);

    let segment = &segment;
    std::thread::scope(|s| {
        for _ in 0..5 {
            s.spawn(move || {
                for _ in 0..1000 {
                    assert_eq!(segment.read_slot(Slot::Radio), 999);
                }
            });
        }
    });

    SharedState::remove(&env.shm_name).unwrap();
}

#[test]
fn test_remove_twice_reports_missing_object() {
    let env = TestEnvironment::new().unwrap();
    SharedState::create(&env.shm_name).unwrap().close().unwrap();

    SharedState::remove(&env.shm_name).unwrap();
    let err = SharedState::remove(&env.shm_name).unwrap_err();
    assert_eq!(err.os_code(), Some(nix::errno::Errno::ENOENT as i32));
}
