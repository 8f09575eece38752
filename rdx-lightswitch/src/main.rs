use anyhow::{Context, Result};
use colored::Colorize;
use lightswitch::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the world description, or fall back to the built-in demo.
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => LightSwitchConfig::load(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => LightSwitchConfig::default(),
    };

    // 3. Create the host and watch what it reports.
    let host = SimulationHost::new(config);
    spawn_event_listeners(&host)?;

    // 4. Load plugins; failures are logged and leave that plugin inert.
    host.load_plugins();

    // 5. Run the world.
    host.run().await?;

    Ok(())
}

/// Spawns tasks printing system events and every switch message on the
/// configured namespaces.
fn spawn_event_listeners(host: &SimulationHost) -> Result<()> {
    let mut system_rx = host.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut topics: Vec<String> = host
        .config()
        .models
        .iter()
        .chain(host.config().visuals.iter())
        .filter_map(|slot| slot.plugin.namespace().ok().map(lightswitcher_topic))
        .collect();
    topics.sort();
    topics.dedup();

    for topic in topics {
        let mut rx = host.node().receiver::<msgs::Int>(&topic)?;
        let clock = host.clone();
        tokio::spawn(async move {
            while let Ok(msg) = rx.recv().await {
                let state = match msg.data {
                    LIGHT_ON_RANGE => "ON".green().bold(),
                    LIGHT_OFF_RANGE => "OFF".red().bold(),
                    _ => "??".yellow().bold(),
                };
                info!("[{}] {} range={} at {}", topic, state, msg.data, clock.sim_time());
            }
        });
    }
    Ok(())
}
