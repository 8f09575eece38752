//! Contains common, primitive types shared across the lightswitch crate.
//!
//! This module defines the key types used to identify callback connections,
//! subscriptions and scene objects, plus the channel naming rule both plugins
//! agree on. Using distinct types keeps the handles from being mixed up.

use slotmap::new_key_type;

new_key_type! {
    /// Uniquely and safely identifies a callback connected to a world event.
    ///
    /// Keys are never reused while the table is alive, so a stale
    /// `ConnectionId` can never disconnect somebody else's callback.
    pub struct ConnectionId;

    /// Identifies a light inside a `Scene`.
    pub struct LightId;
}

/// Suffix appended to the configured namespace to form the switch channel.
pub const LIGHTSWITCHER_SUFFIX: &str = "lightswitcher";

/// Builds the channel name shared by the publisher and the subscriber:
/// `"/" + namespace + "/lightswitcher"`.
pub fn lightswitcher_topic(namespace: &str) -> String {
    format!("/{}/{}", namespace, LIGHTSWITCHER_SUFFIX)
}
