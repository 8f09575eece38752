use lightswitch::prelude::*;
use std::time::Duration;
use tokio::sync::broadcast;

const TOPIC: &str = "/lightswitch/lightswitcher";
const LIGHT: &str = "user_spot_light_0";

fn seeded_host() -> SimulationHost {
    let mut config = LightSwitchConfig::default();
    config.models[0].plugin.seed = Some(2024);
    config.world.resolution = ClockResolution::Custom {
        ticks_per_second: 20,
    };
    SimulationHost::new(config)
}

async fn wait_for_range(host: &SimulationHost, expected: f64) {
    for _ in 0..200 {
        if host.scene().range(LIGHT) == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "light range never reached {}, still {:?}",
        expected,
        host.scene().range(LIGHT)
    );
}

fn drain(rx: &mut broadcast::Receiver<msgs::Int>) -> Vec<i32> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg.data);
    }
    out
}

#[tokio::test]
async fn first_step_switches_the_light_off() {
    let host = seeded_host();
    let mut rx = host.node().receiver::<msgs::Int>(TOPIC).unwrap();
    assert_eq!(host.load_plugins(), 2);
    assert_eq!(host.scene().range(LIGHT), Some(5.0));

    host.step();
    assert_eq!(drain(&mut rx), vec![LIGHT_OFF_RANGE]);
    wait_for_range(&host, 1000.0).await;
}

#[tokio::test]
async fn light_follows_alternating_switches() {
    let host = seeded_host();
    let mut rx = host.node().receiver::<msgs::Int>(TOPIC).unwrap();
    host.load_plugins();

    let mut sent = Vec::new();
    for _ in 0..400 {
        host.step();
        sent.extend(drain(&mut rx));
    }

    assert!(sent.len() >= 4, "expected several switches, got {:?}", sent);
    assert!(sent.windows(2).all(|pair| pair[0] != pair[1]));
    assert!(sent
        .iter()
        .all(|&v| v == LIGHT_ON_RANGE || v == LIGHT_OFF_RANGE));

    let last = *sent.last().unwrap();
    wait_for_range(&host, f64::from(last)).await;
}

#[tokio::test]
async fn reset_switches_on_the_next_step() {
    let host = seeded_host();
    let mut rx = host.node().receiver::<msgs::Int>(TOPIC).unwrap();
    host.load_plugins();

    host.step();
    assert_eq!(drain(&mut rx), vec![LIGHT_OFF_RANGE]);

    // Whatever delay is pending, a reset makes the very next step switch.
    host.reset_time();
    assert_eq!(host.sim_time(), SimTime::ZERO);
    host.step();
    assert_eq!(drain(&mut rx), vec![LIGHT_ON_RANGE]);
    wait_for_range(&host, 0.0).await;
}

#[tokio::test]
async fn removed_light_keeps_subscriber_alive() {
    let host = seeded_host();
    let mut rx = host.node().receiver::<msgs::Int>(TOPIC).unwrap();
    host.load_plugins();

    host.scene().remove_light(LIGHT);
    host.step();
    assert_eq!(drain(&mut rx), vec![LIGHT_OFF_RANGE]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(host.scene().range(LIGHT), None);

    // Both the publisher and the subscriber remain attached.
    let publisher = host.node().advertise::<msgs::Int>(TOPIC).unwrap();
    assert_eq!(publisher.subscriber_count(), 2);
    assert_eq!(host.plugin_status().len(), 2);
}

#[tokio::test]
async fn publisher_without_namespace_stays_inert() {
    let mut config = LightSwitchConfig::default();
    config.models[0].plugin.namespace = Some(String::new());
    let host = SimulationHost::new(config);
    let mut rx = host.node().receiver::<msgs::Int>(TOPIC).unwrap();

    assert_eq!(host.load_plugins(), 1);
    for _ in 0..10 {
        host.step();
    }
    assert!(drain(&mut rx).is_empty());
    assert_eq!(host.scene().range(LIGHT), Some(5.0));
}

#[test]
fn loads_world_file() {
    let path = std::env::temp_dir().join(format!("lightswitch-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
        [world]
        resolution = "low"

        [[models]]
        name = "box"
        [models.plugin]
        name = "switcher"
        filename = "libLightPublisher.so"
        namespace = "garage"
        "#,
    )
    .unwrap();

    let config = LightSwitchConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.world.resolution, ClockResolution::Low);
    assert_eq!(config.models[0].plugin.namespace().unwrap(), "garage");
    assert!(config.visuals.is_empty());
    assert!(config.scene.lights.is_empty());
}
