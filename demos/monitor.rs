use std::env;
use std::sync::Arc;
use std::time::Duration;

use infinity_zones::{ClimateZone, HttpSystemClient, MessageLogMode, SystemRegistry, ZoneView};

fn print_zone(view: &ZoneView) {
    let unit = view.temperature_unit.symbol();
    let target = match (view.target_temperature(), view.target_temperature_low()) {
        (Some(t), _) => format!("{t:.1}{unit}"),
        (None, Some(low)) => format!(
            "{low:.1}..{:.1}{unit}",
            view.target_temperature_high().unwrap_or(low)
        ),
        (None, None) => "-".to_string(),
    };
    println!(
        "[{}] {:.1}{unit} {:.0}% | {} -> {} | preset: {} | fan: {} | {}",
        view.name,
        view.current_temperature,
        view.current_humidity,
        view.hvac_mode.label(),
        target,
        view.preset,
        view.fan_mode.label(),
        view.hvac_action,
    );
}

async fn watch_zone(mut zone: ClimateZone) {
    print_zone(zone.view());
    loop {
        match zone.changed().await {
            Ok(view) => print_zone(view),
            Err(infinity_zones::Error::Stopped) => break,
            Err(e) => eprintln!("[{}] {e}", zone.name()),
        }
    }
}

#[tokio::main]
async fn main() -> infinity_zones::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let (Some(base_url), Some(system_id)) = (args.get(1), args.get(2)) else {
        eprintln!("usage: monitor <base-url> <system-id> [--log <path>]");
        std::process::exit(2);
    };

    let mut builder = HttpSystemClient::builder(base_url).timeout(Duration::from_secs(15));
    if let Some(pos) = args.iter().position(|a| a == "--log")
        && let Some(path) = args.get(pos + 1)
    {
        builder = builder.message_log(MessageLogMode::Diffed, path);
    }

    let mut registry = SystemRegistry::new(Arc::new(builder.build()?))
        .interval(Duration::from_secs(30))
        .refresh_at_hold_expiry(true);

    println!("Fetching {system_id} from {base_url}...");
    let zones = registry.add_system(system_id).await?;
    println!("Found {} zone(s). Watching for updates...", zones.len());

    let sensors = registry.sensors(system_id)?;
    println!(
        "Outdoor: {:.1}{} | airflow: {:.0} | humidifier: {}",
        sensors.outside_temperature,
        sensors.temperature_unit.symbol(),
        sensors.airflow,
        if sensors.humidifier_active { "on" } else { "off" },
    );

    let tasks: Vec<_> = registry
        .climate_zones(system_id)?
        .into_iter()
        .map(|zone| tokio::spawn(watch_zone(zone)))
        .collect();

    let _ = tokio::signal::ctrl_c().await;
    println!("Stopping...");
    registry.remove_system(system_id);
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
