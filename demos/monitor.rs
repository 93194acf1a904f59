use std::env;
use std::time::Duration;

use rinnai_touch::{Event, Field, RinnaiClient};

#[tokio::main]
async fn main() -> rinnai_touch::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let mut builder = RinnaiClient::builder()
        .idle_close_ms(-1)
        .on_event(|event| match event {
            Event::StatusChanged { changes, .. } => {
                for change in changes {
                    println!("{}: {} -> {}", change.path, change.old, change.new);
                }
            }
            other => println!("{other:?}"),
        });

    match args.get(1) {
        Some(ip) => {
            let host = ip.parse::<std::net::IpAddr>().map_err(|_| {
                rinnai_touch::Error::Protocol(format!("not an IP address: {ip}"))
            })?;
            println!("Connecting to {ip}...");
            builder = builder.address(host);
        }
        None => println!("Waiting for unit announcement..."),
    }

    let client = builder.build()?;
    let table = *client.path_table();

    loop {
        match client.get_status().await {
            Ok(status) => {
                for zone in status.zones() {
                    let measured = status
                        .field(&table, Field::CurrentTemp, Some(zone))
                        .and_then(|t| t.parse::<f32>().ok())
                        .map(|t| t / 10.0);
                    println!(
                        "[{}] mode: {:?} | set point: {} | measured: {}",
                        status.zone_name(zone),
                        status.mode(),
                        status.field(&table, Field::TargetTemp, Some(zone)).unwrap_or("-"),
                        measured.map_or("-".to_string(), |t| format!("{t:.1}\u{00b0}C")),
                    );
                }
            }
            Err(e) => eprintln!("Status error: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}
