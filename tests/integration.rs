use std::sync::{Arc, Mutex};
use std::time::Duration;

use rinnai_touch::{ConnectionState, Event, RinnaiClient};

/// Run with: cargo test --test integration -- --ignored
/// Requires a Rinnai Touch module on the local network. Set RINNAI_HOST to
/// skip discovery.
#[tokio::test]
#[ignore]
async fn discover_read_close() {
    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let events_clone = events.clone();

    let mut builder = RinnaiClient::builder()
        .idle_close_ms(0)
        .on_event(move |event| {
            events_clone.lock().unwrap().push(event.clone());
        });
    if let Ok(host) = std::env::var("RINNAI_HOST") {
        builder = builder.address(host.parse().expect("RINNAI_HOST is not an IP address"));
    }
    let client = builder.build().expect("build failed");

    let status = client.get_status().await.expect("get failed");
    let zones = status.zones();
    assert!(!zones.is_empty(), "should have at least one zone");
    for zone in zones {
        println!("zone {zone}: {}", status.zone_name(zone));
    }

    let mut state = client.watch_connection_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Closed),
    )
    .await
    .expect("session did not close")
    .expect("worker stopped");

    let captured = events.lock().unwrap();
    assert!(
        captured
            .iter()
            .any(|e| matches!(e, Event::ConnectionStateChanged { state: ConnectionState::Open })),
        "should have seen the session open"
    );
}

/// Toggles the fan speed up by one and back. Changes the unit's settings
/// briefly, so it is opt-in like the test above.
#[tokio::test]
#[ignore]
async fn command_round_trip() {
    let mut builder = RinnaiClient::builder();
    if let Ok(host) = std::env::var("RINNAI_HOST") {
        builder = builder.address(host.parse().expect("RINNAI_HOST is not an IP address"));
    }
    let client = builder.build().expect("build failed");

    let status = client.get_status().await.expect("get failed");
    let path = "{mode}.OOP.FL";
    let original = status
        .lookup(path)
        .unwrap()
        .and_then(|v| v.as_str())
        .expect("fan speed missing")
        .to_string();
    let speed: u32 = original.parse().expect("fan speed not numeric");
    let next = format!("{:02}", if speed >= 16 { speed - 1 } else { speed + 1 });

    let confirmed = client
        .send_command(&path.replace("{mode}", status.mode().as_key()), next.as_str())
        .await
        .expect("command not confirmed");
    assert_eq!(confirmed.lookup(path).unwrap().and_then(|v| v.as_str()), Some(next.as_str()));

    client
        .send_command(&path.replace("{mode}", status.mode().as_key()), original.as_str())
        .await
        .expect("restore not confirmed");
    client.close().await.expect("close failed");
}
