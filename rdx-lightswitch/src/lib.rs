//! # Lightswitch
//!
//! A light that switches on and off at random simulation-time intervals,
//! built as two plugins that only talk over a pub/sub topic.
//!
//! ## Core Concepts
//!
//! - **LightPublisher**: A model plugin. On every world step it checks the
//!   sim clock against its next deadline; when due, it flips the light,
//!   draws a fresh interval in `[0, 5)` seconds and publishes the new range
//!   (`0` for on, `1000` for off). A world time reset re-arms it so the next
//!   step switches immediately.
//! - **LightSubscriber**: A visual plugin. It copies every value received on
//!   the topic into a scene light's range, through a handle that is
//!   re-validated on each message.
//! - **Topic**: `/<namespace>/lightswitcher`. The publisher never knows how
//!   many subscribers there are, if any.
//! - **SimulationHost**: Owns the world clock, scene and transport, loads the
//!   plugins named in a `LightSwitchConfig`, and steps the world.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lightswitch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. One publisher, one subscriber, one spot light.
//!     let host = SimulationHost::new(LightSwitchConfig::default());
//!
//!     // 2. Load the plugins inside the runtime so subscribers can spawn.
//!     host.load_plugins();
//!
//!     // 3. Step the world until Ctrl+C.
//!     host.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Lightswitch";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod msgs;
pub mod plugin;
pub mod scene;
pub mod time;
pub mod transport;

/// A prelude module for easy importing of the most common Lightswitch types.
pub mod prelude {
    pub use crate::common::{lightswitcher_topic, ConnectionId, LightId};
    pub use crate::components::publisher::{
        IntervalSampler, LightPublisher, ToggleState, UniformInterval, LIGHT_OFF_RANGE,
        LIGHT_ON_RANGE,
    };
    pub use crate::components::subscriber::LightSubscriber;
    pub use crate::config::{ClockResolution, LightSwitchConfig, PluginConfig};
    pub use crate::engine::SimulationHost;
    pub use crate::error::{ConfigError, PluginError, SceneError, TransportError};
    pub use crate::events::{SystemEvent, UpdateInfo, WorldEvents};
    pub use crate::msgs;
    pub use crate::plugin::{ModelPlugin, PluginRegistry, VisualPlugin};
    pub use crate::scene::{LightHandle, RangeTarget, Scene};
    pub use crate::time::{SimClock, SimTime, WorldClock};
    pub use crate::transport::{Node, Publisher, Subscriber};
}
