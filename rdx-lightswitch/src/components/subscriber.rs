//! The receiving side: applies announced ranges to a light.

use crate::common::lightswitcher_topic;
use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::msgs;
use crate::scene::{RangeTarget, Scene};
use crate::transport::{Node, Subscriber};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, trace};

struct Shared {
    target: Mutex<Box<dyn RangeTarget>>,
}

impl Shared {
    fn on_message(&self, msg: msgs::Int) -> bool {
        let target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        trace!("Got message: {}", msg.data);
        match target.set_range(msg.data) {
            Ok(()) => true,
            Err(err) => {
                error!("The Light is null ({}): {}", target.label(), err);
                false
            }
        }
    }
}

/// Visual plugin that listens on `/<namespace>/lightswitcher` and copies each
/// received value into a light's range.
///
/// Dropping it cancels the subscription.
pub struct LightSubscriber {
    shared: Arc<Shared>,
    subscription: Subscriber,
}

fn fail(err: PluginError) -> PluginError {
    error!("{}", err);
    err
}

impl LightSubscriber {
    /// Resolves the configured light in `scene` and subscribes to the switch
    /// channel. Must be called inside a tokio runtime.
    ///
    /// Fails, logging the reason, when the scene or the light is missing or
    /// the config has no namespace.
    pub fn load(
        config: &PluginConfig,
        scene: Option<&Scene>,
        node: &Node,
    ) -> Result<Self, PluginError> {
        let scene = scene.ok_or(PluginError::MissingHandle("scene")).map_err(fail)?;
        let light_name = config.light_name();
        let light = scene
            .light(light_name)
            .ok_or_else(|| PluginError::LightNotFound(light_name.to_string()))
            .map_err(fail)?;
        Self::load_with_target(config, Box::new(light), node)
    }

    /// Subscribes to the switch channel, driving an already resolved target.
    pub fn load_with_target(
        config: &PluginConfig,
        target: Box<dyn RangeTarget>,
        node: &Node,
    ) -> Result<Self, PluginError> {
        let namespace = config.namespace().map_err(PluginError::from).map_err(fail)?;
        let shared = Arc::new(Shared {
            target: Mutex::new(target),
        });
        let handler = shared.clone();
        let subscription = node
            .subscribe(&lightswitcher_topic(namespace), move |msg: msgs::Int| {
                handler.on_message(msg);
            })
            .map_err(PluginError::from)
            .map_err(fail)?;

        info!("LightSubscriber started on {}", subscription.topic());
        Ok(Self {
            shared,
            subscription,
        })
    }

    /// Applies one notification. The value is used as-is, without clamping.
    ///
    /// Returns `false` if the target is gone; the message is dropped and the
    /// subscription stays active.
    pub fn on_message(&self, msg: msgs::Int) -> bool {
        self.shared.on_message(msg)
    }

    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }
}
