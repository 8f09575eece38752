//! The switching side: flips a light on and off at random sim-time intervals.

use crate::common::lightswitcher_topic;
use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::events::{Connection, WorldEvents};
use crate::msgs;
use crate::time::{SimClock, SimTime};
use crate::transport::{Node, Publisher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

/// Range announced when the light turns on.
pub const LIGHT_ON_RANGE: i32 = 0;
/// Range announced when the light turns off; far enough to light nothing.
pub const LIGHT_OFF_RANGE: i32 = 1000;
/// Upper bound (exclusive) of the random switch interval, in sim seconds.
pub const MAX_INTERVAL_SECS: f64 = 5.0;

/// Source of the delay before the next switch.
pub trait IntervalSampler: Send {
    fn next_interval(&mut self) -> Duration;
}

/// Draws intervals uniformly from `[0, MAX_INTERVAL_SECS)`.
#[derive(Debug)]
pub struct UniformInterval {
    rng: StdRng,
}

impl UniformInterval {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IntervalSampler for UniformInterval {
    fn next_interval(&mut self) -> Duration {
        Duration::from_secs_f64(self.rng.gen_range(0.0..MAX_INTERVAL_SECS))
    }
}

/// The switch state owned by a `LightPublisher`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleState {
    pub is_on: bool,
    /// Sim time at which the next switch is due. `SimTime::ZERO` means the
    /// next tick switches regardless of the clock.
    pub next_deadline: SimTime,
}

impl ToggleState {
    fn initial() -> Self {
        Self {
            is_on: true,
            next_deadline: SimTime::ZERO,
        }
    }

    /// Wire encoding of the current state.
    pub fn range(&self) -> i32 {
        if self.is_on {
            LIGHT_ON_RANGE
        } else {
            LIGHT_OFF_RANGE
        }
    }
}

// Both fields are only touched with the mutex held, once per callback.
struct Schedule {
    state: ToggleState,
    sampler: Box<dyn IntervalSampler>,
}

struct Shared {
    world: Arc<dyn SimClock>,
    schedule: Mutex<Schedule>,
    publisher: Publisher<msgs::Int>,
}

impl Shared {
    fn on_tick(&self) -> Option<i32> {
        let range = {
            let mut schedule = self.schedule.lock().unwrap_or_else(PoisonError::into_inner);
            let now = self.world.sim_time();
            if schedule.state.next_deadline > now {
                return None;
            }
            let interval = schedule.sampler.next_interval();
            schedule.state.next_deadline = now + interval;
            schedule.state.is_on = !schedule.state.is_on;
            debug!(
                "Light switched {} at {}, next switch at {}",
                if schedule.state.is_on { "on" } else { "off" },
                now,
                schedule.state.next_deadline
            );
            schedule.state.range()
        };
        self.publisher.publish(msgs::Int::from(range));
        Some(range)
    }

    fn on_clock_reset(&self) {
        let mut schedule = self.schedule.lock().unwrap_or_else(PoisonError::into_inner);
        info!("LightPublisher::ResetTime");
        schedule.state.next_deadline = SimTime::ZERO;
    }
}

/// Model plugin that announces light switches on `/<namespace>/lightswitcher`.
///
/// Dropping the publisher disconnects it from the world events.
pub struct LightPublisher {
    shared: Arc<Shared>,
    _update_connection: Connection,
    _reset_connection: Connection,
}

fn fail(err: PluginError) -> PluginError {
    error!("{}", err);
    err
}

impl LightPublisher {
    /// Loads the publisher with an interval generator seeded from
    /// `config.seed`, or from entropy when no seed is configured.
    pub fn load(
        config: &PluginConfig,
        world: Option<Arc<dyn SimClock>>,
        events: &WorldEvents,
        node: &Node,
    ) -> Result<Self, PluginError> {
        let sampler: Box<dyn IntervalSampler> = match config.seed {
            Some(seed) => Box::new(UniformInterval::seeded(seed)),
            None => Box::new(UniformInterval::from_entropy()),
        };
        Self::load_with_sampler(config, world, events, node, sampler)
    }

    /// Loads the publisher with an explicit interval source.
    ///
    /// Fails, logging the reason, when the world is missing or the config has
    /// no namespace. Nothing is connected in that case.
    pub fn load_with_sampler(
        config: &PluginConfig,
        world: Option<Arc<dyn SimClock>>,
        events: &WorldEvents,
        node: &Node,
        sampler: Box<dyn IntervalSampler>,
    ) -> Result<Self, PluginError> {
        let world = world.ok_or(PluginError::MissingHandle("world")).map_err(fail)?;
        let namespace = config.namespace().map_err(PluginError::from).map_err(fail)?;
        let publisher = node
            .advertise::<msgs::Int>(&lightswitcher_topic(namespace))
            .map_err(PluginError::from)
            .map_err(fail)?;

        let shared = Arc::new(Shared {
            world,
            schedule: Mutex::new(Schedule {
                state: ToggleState::initial(),
                sampler,
            }),
            publisher,
        });

        let on_update = shared.clone();
        let update_connection = events.connect_world_update_begin(move |_| {
            on_update.on_tick();
        });
        let on_reset = shared.clone();
        let reset_connection = events.connect_time_reset(move || on_reset.on_clock_reset());

        info!("LightPublisher started on {}", shared.publisher.topic());
        Ok(Self {
            shared,
            _update_connection: update_connection,
            _reset_connection: reset_connection,
        })
    }

    /// Runs one switch check against the world clock.
    ///
    /// Returns the range that was published, or `None` if the switch was not
    /// yet due.
    pub fn on_tick(&self) -> Option<i32> {
        self.shared.on_tick()
    }

    /// Re-arms the timer so the next tick switches immediately. The on/off
    /// state carries over.
    pub fn on_clock_reset(&self) {
        self.shared.on_clock_reset()
    }

    /// Snapshot of the current switch state.
    pub fn state(&self) -> ToggleState {
        self.shared
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn topic(&self) -> &str {
        self.shared.publisher.topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::WorldClock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::broadcast;

    struct FixedIntervals(VecDeque<Duration>);

    impl FixedIntervals {
        fn secs(values: &[f64]) -> Box<Self> {
            Box::new(Self(
                values.iter().map(|s| Duration::from_secs_f64(*s)).collect(),
            ))
        }
    }

    impl IntervalSampler for FixedIntervals {
        fn next_interval(&mut self) -> Duration {
            let next = self.0.pop_front().unwrap_or(Duration::from_secs(1));
            self.0.push_back(next);
            next
        }
    }

    struct Recording {
        inner: UniformInterval,
        drawn: Arc<Mutex<Vec<Duration>>>,
    }

    impl IntervalSampler for Recording {
        fn next_interval(&mut self) -> Duration {
            let interval = self.inner.next_interval();
            self.drawn.lock().unwrap().push(interval);
            interval
        }
    }

    struct Rig {
        clock: Arc<WorldClock>,
        events: WorldEvents,
        node: Node,
        config: PluginConfig,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                clock: Arc::new(WorldClock::new()),
                events: WorldEvents::new(),
                node: Node::new(),
                config: PluginConfig {
                    namespace: Some("demo".to_string()),
                    ..Default::default()
                },
            }
        }

        fn world(&self) -> Option<Arc<dyn SimClock>> {
            Some(self.clock.clone() as Arc<dyn SimClock>)
        }

        fn load(&self, sampler: Box<dyn IntervalSampler>) -> LightPublisher {
            LightPublisher::load_with_sampler(
                &self.config,
                self.world(),
                &self.events,
                &self.node,
                sampler,
            )
            .unwrap()
        }

        fn channel(&self) -> broadcast::Receiver<msgs::Int> {
            self.node.receiver("/demo/lightswitcher").unwrap()
        }

        fn at(&self, secs: f64) {
            self.clock.set(SimTime::from_secs_f64(secs));
        }
    }

    #[test]
    fn load_requires_world() {
        let rig = Rig::new();
        let result = LightPublisher::load(&rig.config, None, &rig.events, &rig.node);
        assert!(matches!(result, Err(PluginError::MissingHandle("world"))));
        assert_eq!(rig.events.connection_counts(), (0, 0));
    }

    #[test]
    fn load_requires_namespace() {
        let rig = Rig::new();
        let config = PluginConfig::default();
        let result = LightPublisher::load(&config, rig.world(), &rig.events, &rig.node);
        assert!(matches!(result, Err(PluginError::Config(_))));
        assert_eq!(rig.events.connection_counts(), (0, 0));
        assert!(rig.node.topics().is_empty());
    }

    #[test]
    fn starts_on_and_due() {
        let rig = Rig::new();
        let publisher = rig.load(FixedIntervals::secs(&[1.0]));
        assert_eq!(publisher.topic(), "/demo/lightswitcher");
        assert_eq!(
            publisher.state(),
            ToggleState {
                is_on: true,
                next_deadline: SimTime::ZERO
            }
        );
        assert_eq!(rig.events.connection_counts(), (1, 1));
    }

    #[test]
    fn switches_at_deadlines_and_rearms_on_reset() {
        let rig = Rig::new();
        let mut rx = rig.channel();
        let publisher = rig.load(FixedIntervals::secs(&[1.5, 2.0, 0.5]));

        // Due immediately: on -> off.
        assert_eq!(publisher.on_tick(), Some(LIGHT_OFF_RANGE));
        assert_eq!(rx.try_recv().unwrap().data, LIGHT_OFF_RANGE);
        assert_eq!(publisher.state().next_deadline, SimTime::from_secs_f64(1.5));

        rig.at(1.0);
        assert_eq!(publisher.on_tick(), None);
        assert!(rx.try_recv().is_err());

        rig.at(1.5);
        assert_eq!(publisher.on_tick(), Some(LIGHT_ON_RANGE));
        assert_eq!(rx.try_recv().unwrap().data, LIGHT_ON_RANGE);
        assert_eq!(publisher.state().next_deadline, SimTime::from_secs_f64(3.5));

        // Reset with 2s still pending: the next tick at t=0 switches anyway.
        rig.clock.reset();
        publisher.on_clock_reset();
        let state = publisher.state();
        assert!(state.is_on);
        assert!(state.next_deadline.is_epoch());

        assert_eq!(publisher.on_tick(), Some(LIGHT_OFF_RANGE));
        assert_eq!(rx.try_recv().unwrap().data, LIGHT_OFF_RANGE);
        assert_eq!(publisher.state().next_deadline, SimTime::from_secs_f64(0.5));
    }

    #[test]
    fn world_events_drive_the_publisher() {
        let rig = Rig::new();
        let mut rx = rig.channel();
        let publisher = rig.load(FixedIntervals::secs(&[10.0]));
        let info = crate::events::UpdateInfo {
            step: 1,
            sim_time: SimTime::ZERO,
        };

        rig.events.fire_world_update_begin(&info);
        assert_eq!(rx.try_recv().unwrap().data, LIGHT_OFF_RANGE);
        rig.events.fire_world_update_begin(&info);
        assert!(rx.try_recv().is_err());

        rig.events.fire_time_reset();
        rig.events.fire_world_update_begin(&info);
        assert_eq!(rx.try_recv().unwrap().data, LIGHT_ON_RANGE);

        drop(publisher);
        assert_eq!(rig.events.connection_counts(), (0, 0));
        rig.events.fire_time_reset();
        rig.events.fire_world_update_begin(&info);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn switches_alternate_and_respect_drawn_intervals() {
        let rig = Rig::new();
        let mut rx = rig.channel();
        let drawn = Arc::new(Mutex::new(Vec::new()));
        let publisher = rig.load(Box::new(Recording {
            inner: UniformInterval::seeded(42),
            drawn: drawn.clone(),
        }));

        let step = Duration::from_millis(50);
        let mut switches: Vec<(SimTime, i32)> = Vec::new();
        for _ in 0..2_000 {
            let now = rig.clock.sim_time();
            if publisher.on_tick().is_some() {
                let msg = rx.try_recv().unwrap();
                switches.push((now, msg.data));
            }
            rig.clock.advance(step);
        }

        assert!(switches.len() > 10);
        let drawn = drawn.lock().unwrap();
        assert_eq!(drawn.len(), switches.len());
        for (i, pair) in switches.windows(2).enumerate() {
            let (t0, r0) = pair[0];
            let (t1, r1) = pair[1];
            assert_ne!(r0, r1);
            assert!(t1 >= t0 + drawn[i]);
        }
        assert!(drawn
            .iter()
            .all(|d| d.as_secs_f64() >= 0.0 && d.as_secs_f64() < MAX_INTERVAL_SECS));
    }

    #[test]
    fn concurrent_resets_keep_switches_alternating() {
        let rig = Rig::new();
        let mut rx = rig.channel();
        let publisher = rig.load(FixedIntervals::secs(&[0.3, 1.2, 4.9, 0.05]));
        let done = AtomicBool::new(false);

        let mut sent = Vec::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    publisher.on_clock_reset();
                    std::thread::yield_now();
                }
            });

            for _ in 0..5_000 {
                publisher.on_tick();
                while let Ok(msg) = rx.try_recv() {
                    sent.push(msg.data);
                }
                rig.clock.advance(Duration::from_millis(10));
            }
            done.store(true, Ordering::Release);
        });
        while let Ok(msg) = rx.try_recv() {
            sent.push(msg.data);
        }

        assert!(!sent.is_empty());
        assert_eq!(sent[0], LIGHT_OFF_RANGE);
        assert!(sent.windows(2).all(|pair| pair[0] != pair[1]));
        assert_eq!(publisher.state().range(), *sent.last().unwrap());
    }

    #[test]
    fn seeded_intervals_are_reproducible() {
        let mut a = UniformInterval::seeded(9);
        let mut b = UniformInterval::seeded(9);
        for _ in 0..20 {
            assert_eq!(a.next_interval(), b.next_interval());
        }
    }
}
