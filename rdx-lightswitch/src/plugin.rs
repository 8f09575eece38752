//! Plugin capabilities and the registry the host loads them through.
//!
//! A plugin is named in the world description by its library `filename`.
//! The host looks that name up in a `PluginRegistry` and calls the factory
//! with the handles the plugin is allowed to use. Factories receive those
//! handles explicitly; there is no global transport or world.

use crate::components::publisher::LightPublisher;
use crate::components::subscriber::LightSubscriber;
use crate::config::{PluginConfig, PUBLISHER_LIBRARY, SUBSCRIBER_LIBRARY};
use crate::error::PluginError;
use crate::events::WorldEvents;
use crate::msgs;
use crate::scene::Scene;
use crate::time::SimClock;
use crate::transport::Node;
use std::collections::HashMap;
use std::sync::Arc;

/// Handles available to a plugin attached to a model.
pub struct ModelContext<'a> {
    pub world: Option<Arc<dyn SimClock>>,
    pub events: &'a WorldEvents,
    pub node: &'a Node,
}

/// Handles available to a plugin attached to a visual.
pub struct VisualContext<'a> {
    pub scene: Option<&'a Scene>,
    pub node: &'a Node,
}

/// A loaded model plugin, driven by world events.
///
/// Loading connects the plugin to the `WorldEvents` it was given, and
/// `SimulationHost` drives it only through those connections. `on_tick` and
/// `on_clock_reset` are manual entry points for hosts that run without
/// `WorldEvents`. Calling them alongside `SimulationHost::step` runs the
/// plugin twice per step.
pub trait ModelPlugin: Send + Sync {
    /// Runs the plugin's per-step work once, outside of any world event.
    fn on_tick(&self);
    /// Applies a clock reset, outside of any world event.
    fn on_clock_reset(&self);
    /// One-line description of the plugin's current state.
    fn status(&self) -> String;
}

/// A loaded visual plugin, driven by messages.
pub trait VisualPlugin: Send + Sync {
    /// Called for each message delivered to the plugin's topic.
    fn on_message(&self, msg: msgs::Int);
    fn status(&self) -> String;
}

impl ModelPlugin for LightPublisher {
    fn on_tick(&self) {
        LightPublisher::on_tick(self);
    }

    fn on_clock_reset(&self) {
        LightPublisher::on_clock_reset(self);
    }

    fn status(&self) -> String {
        let state = self.state();
        format!(
            "{}: light {}, next switch at {}",
            self.topic(),
            if state.is_on { "on" } else { "off" },
            state.next_deadline
        )
    }
}

impl VisualPlugin for LightSubscriber {
    fn on_message(&self, msg: msgs::Int) {
        LightSubscriber::on_message(self, msg);
    }

    fn status(&self) -> String {
        format!("listening on {}", self.topic())
    }
}

pub type ModelFactory =
    fn(&PluginConfig, &ModelContext<'_>) -> Result<Box<dyn ModelPlugin>, PluginError>;
pub type VisualFactory =
    fn(&PluginConfig, &VisualContext<'_>) -> Result<Box<dyn VisualPlugin>, PluginError>;

fn load_light_publisher(
    config: &PluginConfig,
    ctx: &ModelContext<'_>,
) -> Result<Box<dyn ModelPlugin>, PluginError> {
    let publisher = LightPublisher::load(config, ctx.world.clone(), ctx.events, ctx.node)?;
    Ok(Box::new(publisher))
}

fn load_light_subscriber(
    config: &PluginConfig,
    ctx: &VisualContext<'_>,
) -> Result<Box<dyn VisualPlugin>, PluginError> {
    let subscriber = LightSubscriber::load(config, ctx.scene, ctx.node)?;
    Ok(Box::new(subscriber))
}

/// Maps plugin library names to factories.
#[derive(Default)]
pub struct PluginRegistry {
    models: HashMap<String, ModelFactory>,
    visuals: HashMap<String, VisualFactory>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the light publisher and subscriber.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_model(PUBLISHER_LIBRARY, load_light_publisher);
        registry.register_visual(SUBSCRIBER_LIBRARY, load_light_subscriber);
        registry
    }

    pub fn register_model(&mut self, library: &str, factory: ModelFactory) {
        self.models.insert(library.to_string(), factory);
    }

    pub fn register_visual(&mut self, library: &str, factory: VisualFactory) {
        self.visuals.insert(library.to_string(), factory);
    }

    pub fn load_model(
        &self,
        config: &PluginConfig,
        ctx: &ModelContext<'_>,
    ) -> Result<Box<dyn ModelPlugin>, PluginError> {
        let factory = self
            .models
            .get(&config.filename)
            .ok_or_else(|| PluginError::UnknownPlugin(config.filename.clone()))?;
        factory(config, ctx)
    }

    pub fn load_visual(
        &self,
        config: &PluginConfig,
        ctx: &VisualContext<'_>,
    ) -> Result<Box<dyn VisualPlugin>, PluginError> {
        let factory = self
            .visuals
            .get(&config.filename)
            .ok_or_else(|| PluginError::UnknownPlugin(config.filename.clone()))?;
        factory(config, ctx)
    }
}
