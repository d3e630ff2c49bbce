//! End-to-end flow through the registry: report, merge, restart recovery,
//! delete, and the broadcasts each step produces.

use fleet_core::broadcast::{FanoutEvent, FanoutHub};
use fleet_core::{DeviceStore, Registry, Report};
use std::time::Duration;

fn full_report(machine_id: &str, cpu_percent: f64) -> Report {
    Report {
        machine_id: machine_id.to_string(),
        hostname: Some(format!("{}-host", machine_id)),
        os: Some("Linux 6.8".to_string()),
        ip: Some("192.168.1.10".to_string()),
        cpu_count: Some(8),
        cpu_percent: Some(cpu_percent),
        ram_used: Some(4.0),
        ram_total: Some(16.0),
        ram_percent: Some(25.0),
        ..Default::default()
    }
}

#[tokio::test]
async fn report_lifecycle_survives_restart() {
    let store = DeviceStore::new_in_memory().await.unwrap();

    // First process lifetime: register two machines, refresh one
    {
        let registry = Registry::new(store.clone(), FanoutHub::new());
        registry.apply_report(&full_report("m1", 10.0)).await.unwrap();
        registry.apply_report(&full_report("m2", 20.0)).await.unwrap();

        let partial = Report {
            machine_id: "m1".to_string(),
            cpu_percent: Some(55.0),
            ..Default::default()
        };
        registry.apply_report(&partial).await.unwrap();
    }

    // "Restart": fresh registry over the same store
    let registry = Registry::new(store, FanoutHub::new());
    registry.warm_load().await;

    assert_eq!(registry.count().await, 2);
    let m1 = registry.get("m1").await.unwrap();
    assert_eq!(m1.cpu_percent, 55.0);
    assert_eq!(m1.hostname, "m1-host");

    // A partial update straight after restart is accepted, not rejected
    let partial = Report {
        machine_id: "m2".to_string(),
        ram_percent: Some(90.0),
        ..Default::default()
    };
    registry.apply_report(&partial).await.unwrap();
    assert_eq!(registry.get("m2").await.unwrap().ram_percent, 90.0);
}

#[tokio::test]
async fn mutations_broadcast_in_order() {
    let store = DeviceStore::new_in_memory().await.unwrap();
    let registry = Registry::new(store, FanoutHub::new());
    let mut subscriber = registry.hub().subscribe();

    registry.apply_report(&full_report("m1", 10.0)).await.unwrap();
    let partial = Report {
        machine_id: "m1".to_string(),
        cpu_percent: Some(55.0),
        ..Default::default()
    };
    registry.apply_report(&partial).await.unwrap();
    registry.delete("m1").await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        let event = tokio::time::timeout(Duration::from_millis(200), subscriber.recv())
            .await
            .expect("broadcast expected")
            .expect("hub still open");
        seen.push(event);
    }

    match &seen[0] {
        FanoutEvent::Update(snapshot) => {
            assert_eq!(snapshot.get("m1").unwrap().cpu_percent, 10.0)
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match &seen[1] {
        FanoutEvent::Update(snapshot) => {
            assert_eq!(snapshot.get("m1").unwrap().cpu_percent, 55.0)
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match &seen[2] {
        FanoutEvent::Update(snapshot) => assert!(snapshot.is_empty()),
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(&seen[3], FanoutEvent::StopMonitor { machine_id } if machine_id == "m1"));
}
