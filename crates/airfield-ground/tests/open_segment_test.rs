use std::time::Duration;

use airfield_config::testing::TestEnvironment;
use airfield_ground::open_segment;
use airfield_shm::{SharedState, ShmError, Slot};

#[tokio::test]
async fn test_waits_for_coordinator_to_create_segment() {
    let env = TestEnvironment::new().unwrap();
    let name = env.shm_name.clone();

    let creator = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        let mut segment = SharedState::create(&name).unwrap();
        segment.write_slot(Slot::Radio, 4242);
        segment.close().unwrap();
    });

    let segment = open_segment(&env.shm_name, 50, Duration::from_millis(10))
        .await
        .unwrap();
    creator.join().unwrap();

    assert_eq!(segment.read_slot(Slot::Air), std::process::id() as i32);
    assert_eq!(segment.read_slot(Slot::Radio), 4242);
    segment.close().unwrap();
    SharedState::remove(&env.shm_name).unwrap();
}

#[tokio::test]
async fn test_gives_up_after_configured_attempts() {
    let env = TestEnvironment::new().unwrap();

    let started = tokio::time::Instant::now();
    let err = open_segment(&env.shm_name, 3, Duration::from_millis(20))
        .await
        .unwrap_err();

    assert!(matches!(err, ShmError::Open { .. }));
    assert_eq!(err.os_code(), Some(nix::errno::Errno::ENOENT as i32));
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_bad_name_fails_without_retrying() {
    let err = open_segment("missing_slash", 50, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ShmError::InvalidName(_)));
}
