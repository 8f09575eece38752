//! Defines all configuration structures for the lightswitch host and plugins.
//!
//! These structs are deserialized from a TOML file (plus `LIGHTSWITCH__*`
//! environment overrides) using `serde` and the `config` crate. The file
//! declares the world step rate, which plugins to load, and which lights the
//! scene starts with.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Library name under which the publisher registers itself.
pub const PUBLISHER_LIBRARY: &str = "libLightPublisher.so";
/// Library name under which the subscriber registers itself.
pub const SUBSCRIBER_LIBRARY: &str = "libLightSubscriber.so";
/// Light the subscriber drives when the config does not name one.
pub const DEFAULT_LIGHT: &str = "user_spot_light_0";

/// The top-level configuration for the `SimulationHost`.
#[derive(Debug, Clone, Deserialize)]
pub struct LightSwitchConfig {
    /// World stepping settings.
    #[serde(default)]
    pub world: WorldConfig,

    /// Plugins attached to models; these are driven by world events.
    #[serde(default)]
    pub models: Vec<PluginSlot>,

    /// Plugins attached to visuals; these see the rendering scene.
    #[serde(default)]
    pub visuals: Vec<PluginSlot>,

    /// Initial scene contents.
    #[serde(default)]
    pub scene: SceneConfig,
}

/// World stepping settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorldConfig {
    #[serde(default)]
    pub resolution: ClockResolution,
}

/// Defines how many world steps the host runs per second of simulated time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// ~60 steps per second.
    High,
    /// ~30 steps per second.
    #[default]
    Medium,
    /// ~1 step per second.
    Low,
    /// A user-defined rate in steps per second.
    Custom { ticks_per_second: u64 },
}

impl ClockResolution {
    /// Length of one world step, never shorter than one nanosecond.
    ///
    /// Rates beyond `u32::MAX` steps per second saturate rather than wrap.
    pub fn period(&self) -> Duration {
        let ticks_per_second = match self {
            ClockResolution::High => 60,
            ClockResolution::Medium => 30,
            ClockResolution::Low => 1,
            ClockResolution::Custom { ticks_per_second } => (*ticks_per_second).max(1),
        };
        let ticks_per_second = u32::try_from(ticks_per_second).unwrap_or(u32::MAX);
        (Duration::from_secs(1) / ticks_per_second).max(Duration::from_nanos(1))
    }
}

/// A named plugin instance attached to a model or a visual.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSlot {
    /// Name of the model or visual owning the plugin.
    pub name: String,
    pub plugin: PluginConfig,
}

/// The `<plugin>` element of a model or visual.
///
/// Only `namespace` (and `light` for the subscriber) drive behavior. The
/// colors, `period` and `use_wall_time` are accepted so existing world
/// descriptions parse, but the switch interval is always randomized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Scene light driven by the subscriber.
    #[serde(default)]
    pub light: Option<String>,
    /// First RGBA color, each channel in `0..=1`.
    #[serde(default)]
    pub color_a: Option<[f32; 4]>,
    /// Second RGBA color.
    #[serde(default)]
    pub color_b: Option<[f32; 4]>,
    /// Period in seconds.
    #[serde(default)]
    pub period: Option<f64>,
    #[serde(default)]
    pub use_wall_time: bool,
    /// Seeds the interval generator so runs can be replayed.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl PluginConfig {
    /// Returns the required, non-empty namespace.
    pub fn namespace(&self) -> Result<&str, ConfigError> {
        match self.namespace.as_deref().map(str::trim) {
            Some(ns) if !ns.is_empty() => Ok(ns),
            _ => Err(ConfigError::MissingParameter("namespace")),
        }
    }

    pub fn light_name(&self) -> &str {
        self.light.as_deref().unwrap_or(DEFAULT_LIGHT)
    }
}

/// Initial scene contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub lights: Vec<LightConfig>,
}

/// A light placed in the scene at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct LightConfig {
    pub name: String,
    #[serde(default)]
    pub range: f64,
}

impl LightSwitchConfig {
    /// Loads configuration from `path`, applying `LIGHTSWITCH__*` environment
    /// overrides on top (e.g. `LIGHTSWITCH__WORLD__RESOLUTION=high`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("LIGHTSWITCH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parses configuration from an in-memory TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

impl Default for LightSwitchConfig {
    /// One publisher and one subscriber sharing the `lightswitch` namespace,
    /// driving a single spot light.
    fn default() -> Self {
        let namespace = Some("lightswitch".to_string());
        Self {
            world: WorldConfig::default(),
            models: vec![PluginSlot {
                name: "switch_box".to_string(),
                plugin: PluginConfig {
                    name: "lightswitcher".to_string(),
                    filename: PUBLISHER_LIBRARY.to_string(),
                    namespace: namespace.clone(),
                    ..Default::default()
                },
            }],
            visuals: vec![PluginSlot {
                name: "lamp_visual".to_string(),
                plugin: PluginConfig {
                    name: "lightreceiver".to_string(),
                    filename: SUBSCRIBER_LIBRARY.to_string(),
                    namespace,
                    light: Some(DEFAULT_LIGHT.to_string()),
                    ..Default::default()
                },
            }],
            scene: SceneConfig {
                lights: vec![LightConfig {
                    name: DEFAULT_LIGHT.to_string(),
                    range: 5.0,
                }],
            },
        }
    }
}
