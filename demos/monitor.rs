use ct200_bridge::{BridgeBuilder, Config, MessageLogMode};
use std::env;
use std::process;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(String::as_str).unwrap_or("ct200.json");
    let log_frames = args.iter().position(|a| a == "--log").and_then(|i| args.get(i + 1));

    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error ({path}): {e}");
            process::exit(1);
        }
    };

    let mut builder = match BridgeBuilder::from_config(&config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Cannot set up gateway transport: {e}");
            process::exit(1);
        }
    };
    builder = builder
        .on_event(|event| println!("{event:?}"))
        .on_snapshot(|zone| {
            println!(
                "[{}] {:.1}\u{00b0} -> {:.1}\u{00b0} | {:?} | {:?}",
                zone.name, zone.current_temp, zone.wanted_temp, zone.mode, zone.heating,
            );
        });
    if let Some(log_path) = log_frames {
        builder = builder.message_log(MessageLogMode::Diffed, log_path.clone());
    }

    let bridge = match builder.build() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Cannot build bridge: {e}");
            process::exit(1);
        }
    };

    println!("Connecting to device {}...", config.serial);
    if let Err(e) = bridge.connect().await {
        eprintln!("Failed to connect: {e}. Double-check serial, access key and password.");
        process::exit(1);
    }
    if let Err(e) = bridge.start().await {
        eprintln!("Failed to start polling: {e}");
        process::exit(1);
    }
    println!("Connected. Polling for updates...");

    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let global = bridge.global_snapshot();
        println!(
            "Humidity: {:.0}% | Units: {:?} | Away: {}",
            global.humidity, global.localization, global.away
        );
    }
}
