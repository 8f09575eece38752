//! Defines the event types broadcast by the simulation host, and the world
//! callback tables plugins connect to.
//!
//! `SystemEvent`s are informational: observers subscribe to them through the
//! host. `WorldEvents` is the plugin-facing side: a plugin connects a callback
//! to "world update begin" or "time reset" and keeps the returned
//! `Connection` alive for as long as it wants to be called.

use crate::common::ConnectionId;
use crate::time::SimTime;
use slotmap::SlotMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::time::Instant;

/// Events related to the lifecycle and state of the host itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the host's `run` loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the host's `run` loop is about to exit.
    EngineShutdown,
    /// Fired for each plugin that loaded successfully.
    PluginLoaded { owner: String, plugin: String },
    /// Fired for each plugin that failed to load and was left inert.
    PluginFailed {
        owner: String,
        plugin: String,
        reason: String,
    },
    /// Fired after the world clock was set back to zero.
    TimeReset,
}

/// Information handed to world-update callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Number of steps since the host started. Not affected by time resets.
    pub step: u64,
    /// Simulation time at the beginning of this step.
    pub sim_time: SimTime,
}

type UpdateCallback = Arc<dyn Fn(&UpdateInfo) + Send + Sync>;
type ResetCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Tables {
    update_begin: RwLock<SlotMap<ConnectionId, UpdateCallback>>,
    time_reset: RwLock<SlotMap<ConnectionId, ResetCallback>>,
}

#[derive(Clone, Copy, Debug)]
enum Table {
    UpdateBegin,
    TimeReset,
}

/// Callback tables for the world events plugins can hook.
///
/// Cloning yields another handle to the same tables.
#[derive(Clone, Default)]
pub struct WorldEvents {
    tables: Arc<Tables>,
}

impl WorldEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a callback fired at the beginning of every world step.
    pub fn connect_world_update_begin(
        &self,
        callback: impl Fn(&UpdateInfo) + Send + Sync + 'static,
    ) -> Connection {
        let id = self
            .tables
            .update_begin
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Arc::new(callback));
        Connection::new(&self.tables, Table::UpdateBegin, id)
    }

    /// Connects a callback fired whenever the world clock is reset.
    pub fn connect_time_reset(&self, callback: impl Fn() + Send + Sync + 'static) -> Connection {
        let id = self
            .tables
            .time_reset
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Arc::new(callback));
        Connection::new(&self.tables, Table::TimeReset, id)
    }

    /// Invokes every world-update callback.
    ///
    /// The table lock is released before callbacks run, so a callback may
    /// connect or disconnect without deadlocking.
    pub fn fire_world_update_begin(&self, info: &UpdateInfo) {
        let callbacks: Vec<UpdateCallback> = self
            .tables
            .update_begin
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(info);
        }
    }

    /// Invokes every time-reset callback.
    pub fn fire_time_reset(&self) {
        let callbacks: Vec<ResetCallback> = self
            .tables
            .time_reset
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    /// Number of live connections as `(update_begin, time_reset)`.
    pub fn connection_counts(&self) -> (usize, usize) {
        let update = self
            .tables
            .update_begin
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let reset = self
            .tables
            .time_reset
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        (update, reset)
    }
}

/// A live callback registration. Dropping it disconnects the callback.
///
/// A callback already running when the connection drops finishes normally;
/// it is simply not invoked again.
#[must_use = "dropping a Connection disconnects its callback immediately"]
pub struct Connection {
    tables: Weak<Tables>,
    table: Table,
    id: ConnectionId,
}

impl Connection {
    fn new(tables: &Arc<Tables>, table: Table, id: ConnectionId) -> Self {
        Self {
            tables: Arc::downgrade(tables),
            table,
            id,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let Some(tables) = self.tables.upgrade() else {
            return;
        };
        match self.table {
            Table::UpdateBegin => {
                tables
                    .update_begin
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(self.id);
            }
            Table::TimeReset => {
                tables
                    .time_reset
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(self.id);
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("table", &self.table)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callbacks_fire_until_connection_drops() {
        let events = WorldEvents::new();
        let updates = Arc::new(AtomicUsize::new(0));
        let resets = Arc::new(AtomicUsize::new(0));

        let u = updates.clone();
        let update_conn = events.connect_world_update_begin(move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        });
        let r = resets.clone();
        let reset_conn = events.connect_time_reset(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(events.connection_counts(), (1, 1));

        let info = UpdateInfo {
            step: 1,
            sim_time: SimTime::ZERO,
        };
        events.fire_world_update_begin(&info);
        events.fire_time_reset();
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(resets.load(Ordering::SeqCst), 1);

        drop(update_conn);
        drop(reset_conn);
        assert_eq!(events.connection_counts(), (0, 0));

        events.fire_world_update_begin(&info);
        events.fire_time_reset();
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_outliving_tables_is_harmless() {
        let events = WorldEvents::new();
        let conn = events.connect_time_reset(|| {});
        drop(events);
        drop(conn);
    }
}
