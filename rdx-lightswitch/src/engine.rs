//! The simulation host that owns the world, the scene and the transport, and
//! drives loaded plugins.

use crate::config::{LightSwitchConfig, PluginSlot};
use crate::events::{SystemEvent, UpdateInfo, WorldEvents};
use crate::plugin::{ModelContext, ModelPlugin, PluginRegistry, VisualContext, VisualPlugin};
use crate::scene::Scene;
use crate::time::{SimClock, SimTime, WorldClock};
use crate::transport::Node;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, trace, warn};

struct Loaded<P: ?Sized> {
    owner: String,
    name: String,
    plugin: Box<P>,
}

/// The main simulation host.
///
/// This struct is the central point of control. It holds the configuration,
/// owns the world clock, scene and transport node, keeps loaded plugins
/// alive, and steps the world. The host is cheap to clone; clones share the
/// same running instance.
#[derive(Clone)]
pub struct SimulationHost {
    config: Arc<LightSwitchConfig>,
    registry: Arc<PluginRegistry>,
    clock: Arc<WorldClock>,
    events: WorldEvents,
    scene: Scene,
    node: Node,
    system_event_sender: broadcast::Sender<SystemEvent>,
    step_count: Arc<AtomicU64>,

    // --- Loaded plugins; dropping them disconnects their callbacks ---
    models: Arc<Mutex<Vec<Loaded<dyn ModelPlugin>>>>,
    visuals: Arc<Mutex<Vec<Loaded<dyn VisualPlugin>>>>,
}

impl SimulationHost {
    /// Creates a host with the built-in plugins registered.
    pub fn new(config: LightSwitchConfig) -> Self {
        Self::with_registry(config, PluginRegistry::with_builtin())
    }

    /// Creates a host resolving plugins through `registry`.
    ///
    /// The scene is populated from `config.scene`; duplicate light names are
    /// skipped with a warning.
    pub fn with_registry(config: LightSwitchConfig, registry: PluginRegistry) -> Self {
        let (system_event_sender, _) = broadcast::channel(64);
        let scene = Scene::new();
        for light in &config.scene.lights {
            if let Err(err) = scene.add_light(&light.name, light.range) {
                warn!("Skipping light: {}", err);
            }
        }

        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            clock: Arc::new(WorldClock::new()),
            events: WorldEvents::new(),
            scene,
            node: Node::new(),
            system_event_sender,
            step_count: Arc::new(AtomicU64::new(0)),
            models: Arc::new(Mutex::new(Vec::new())),
            visuals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Loads every plugin named in the configuration.
    ///
    /// A plugin that fails to load is logged, reported as
    /// `SystemEvent::PluginFailed` and skipped; the rest still load. Visual
    /// plugins subscribe to topics, so this must run inside a tokio runtime
    /// for them to load. Returns the number of plugins loaded.
    pub fn load_plugins(&self) -> usize {
        let mut loaded = 0;

        let model_ctx = ModelContext {
            world: Some(self.clock.clone() as Arc<dyn SimClock>),
            events: &self.events,
            node: &self.node,
        };
        for slot in &self.config.models {
            let result = self.registry.load_model(&slot.plugin, &model_ctx);
            if let Some(plugin) = self.record(slot, result) {
                self.models
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(plugin);
                loaded += 1;
            }
        }

        let visual_ctx = VisualContext {
            scene: Some(&self.scene),
            node: &self.node,
        };
        for slot in &self.config.visuals {
            let result = self.registry.load_visual(&slot.plugin, &visual_ctx);
            if let Some(plugin) = self.record(slot, result) {
                self.visuals
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(plugin);
                loaded += 1;
            }
        }

        info!("Loaded {} plugin(s)", loaded);
        loaded
    }

    fn record<P: ?Sized, E: std::fmt::Display>(
        &self,
        slot: &PluginSlot,
        result: Result<Box<P>, E>,
    ) -> Option<Loaded<P>> {
        match result {
            Ok(plugin) => {
                info!("Plugin '{}' loaded for '{}'", slot.plugin.name, slot.name);
                self.system_event_sender
                    .send(SystemEvent::PluginLoaded {
                        owner: slot.name.clone(),
                        plugin: slot.plugin.name.clone(),
                    })
                    .ok();
                Some(Loaded {
                    owner: slot.name.clone(),
                    name: slot.plugin.name.clone(),
                    plugin,
                })
            }
            Err(err) => {
                error!(
                    "Plugin '{}' for '{}' won't load: {}",
                    slot.plugin.name, slot.name, err
                );
                self.system_event_sender
                    .send(SystemEvent::PluginFailed {
                        owner: slot.name.clone(),
                        plugin: slot.plugin.name.clone(),
                        reason: err.to_string(),
                    })
                    .ok();
                None
            }
        }
    }

    /// Drops every loaded plugin, disconnecting their callbacks and
    /// subscriptions.
    pub fn unload_plugins(&self) {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.visuals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("All plugins unloaded");
    }

    /// Runs one world step: fires "world update begin" at the current sim
    /// time, then advances the clock by one resolution period.
    pub fn step(&self) -> UpdateInfo {
        let info = UpdateInfo {
            step: self.step_count.fetch_add(1, Ordering::AcqRel) + 1,
            sim_time: self.clock.sim_time(),
        };
        trace!("Step #{} at {}", info.step, info.sim_time);
        self.events.fire_world_update_begin(&info);
        self.clock.advance(self.step_period());
        info
    }

    /// Sets the world clock back to zero and notifies plugins.
    pub fn reset_time(&self) {
        self.clock.reset();
        info!("World time reset");
        self.events.fire_time_reset();
        self.system_event_sender.send(SystemEvent::TimeReset).ok();
    }

    /// Steps the world at the configured resolution until Ctrl+C.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("SimulationHost starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let stepper = self.clone();
        let stepper_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { stepper.step_loop(stepper_shutdown_rx).await });

        info!(
            "World running at {:?}. Press Ctrl+C to shut down.",
            self.config.world.resolution
        );
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received. Broadcasting to all tasks...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. The world may keep stepping.");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.unload_plugins();
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("SimulationHost has shut down.");
        Ok(())
    }

    #[doc(hidden)]
    async fn step_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.step_period());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: tokio::time::Instant::now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    self.step();
                }
            }
        }
    }

    fn step_period(&self) -> Duration {
        self.config.world.resolution.period()
    }
}

// Accessors and observation API.
impl SimulationHost {
    pub fn sim_time(&self) -> SimTime {
        self.clock.sim_time()
    }

    pub fn step_count(&self) -> u64 {
        self.step_count.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &LightSwitchConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn events(&self) -> &WorldEvents {
        &self.events
    }

    /// Status lines of every loaded plugin as `(owner, plugin, status)`.
    pub fn plugin_status(&self) -> Vec<(String, String, String)> {
        let mut lines = Vec::new();
        for loaded in self
            .models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            lines.push((loaded.owner.clone(), loaded.name.clone(), loaded.plugin.status()));
        }
        for loaded in self
            .visuals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            lines.push((loaded.owner.clone(), loaded.name.clone(), loaded.plugin.status()));
        }
        lines
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }
}
