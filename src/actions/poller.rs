//! Shared poll timer per action kind
//!
//! One timer per action *kind*, not per instance: however many zoom buttons
//! are on the deck, the device sees one snapshot fetch per interval. The
//! timer exists exactly while the kind's registry is non-empty.
//!
//! Each tick is a fetch-and-diff cycle: fetch the snapshot through the
//! first-registered instance's client, extract this kind's quantity, and
//! re-render only the instances whose cached value actually differs. Once
//! every instance matches the remote value, ticks are no-ops — convergence
//! is eventual and idempotent.

use super::registry::{Registry, SyncTarget};
use crate::device::CameraInfo;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Default interval between snapshot fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Tolerance for float change detection; discrete modes use exact equality
pub const FLOAT_EPSILON: f64 = 0.001;

/// Which quantity a poller watches and how it diffs it
#[derive(Clone, Copy)]
pub struct QuantitySpec {
    pub name: &'static str,
    pub interval: Duration,
    /// 0.0 means exact comparison (discrete modes)
    pub epsilon: f64,
    /// Extract `(value, min, max)` from the snapshot
    pub extract: fn(&CameraInfo) -> (f64, f64, f64),
}

impl QuantitySpec {
    pub fn zoom(interval: Duration) -> Self {
        Self {
            name: "zoom",
            interval,
            epsilon: FLOAT_EPSILON,
            extract: |info| (info.zm_value, info.zm_min, info.zm_max),
        }
    }

    pub fn exposure(interval: Duration) -> Self {
        Self {
            name: "exposure",
            interval,
            epsilon: FLOAT_EPSILON,
            extract: |info| (info.ev_value, info.ev_min, info.ev_max),
        }
    }

    pub fn wb_mode(interval: Duration) -> Self {
        Self {
            name: "wb-mode",
            interval,
            epsilon: 0.0,
            extract: |info| (info.wb_mode as f64, 0.0, 8.0),
        }
    }

    pub fn focus_mode(interval: Duration) -> Self {
        Self {
            name: "focus-mode",
            interval,
            epsilon: 0.0,
            extract: |info| (info.focus_mode as f64, 0.0, 3.0),
        }
    }
}

/// Registry plus its shared timer
///
/// Invariant: the timer task is live iff the registry is non-empty. The
/// first registration starts it, removing the last instance aborts it.
pub struct SharedPoller {
    spec: QuantitySpec,
    registry: Registry,
    timer: Mutex<Option<JoinHandle<()>>>,
    // Handle on ourselves for spawning the timer task from &self
    self_weak: Weak<Self>,
}

impl SharedPoller {
    pub fn new(spec: QuantitySpec) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            spec,
            registry: Registry::new(),
            timer: Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    pub fn quantity_name(&self) -> &'static str {
        self.spec.name
    }

    /// Register an instance, starting the timer if it is the first
    pub fn register(&self, instance: Arc<dyn SyncTarget>) {
        self.registry.add(instance);

        let mut timer = self.timer.lock();
        if timer.is_none() {
            debug!("Starting {} polling", self.spec.name);
            *timer = Some(self.spawn_timer());
        }
    }

    /// Unregister an instance, stopping the timer if it was the last
    pub fn unregister(&self, id: &str) {
        let now_empty = self.registry.remove(id);
        if now_empty {
            if let Some(handle) = self.timer.lock().take() {
                debug!("Stopping {} polling", self.spec.name);
                handle.abort();
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        self.timer.lock().is_some()
    }

    pub fn instance_count(&self) -> usize {
        self.registry.len()
    }

    /// Fan a locally-confirmed value out to every registered instance
    pub async fn broadcast(&self, value: f64, min: f64, max: f64) {
        self.registry.broadcast(value, min, max).await;
    }

    /// One fetch-and-diff cycle
    ///
    /// Fetch failures are transient: log, skip the tick, let the interval
    /// retry. No instance state is touched on failure.
    pub async fn tick(&self) {
        let Some(client) = self.registry.first_client() else {
            trace!("{} poll: no configured instance", self.spec.name);
            return;
        };

        let info = match client.camera_info().await {
            Ok(info) => info,
            Err(e) => {
                debug!("{} poll fetch failed: {}", self.spec.name, e);
                return;
            }
        };

        let (value, min, max) = (self.spec.extract)(&info);

        for target in self.registry.targets() {
            if self.differs(target.cached_value(), value) {
                debug!(
                    "[{}] {} drifted: {} -> {}",
                    target.sync_id(),
                    self.spec.name,
                    target.cached_value(),
                    value
                );
                target.apply_remote_value(value, min, max).await;
            }
        }
    }

    fn differs(&self, cached: f64, fetched: f64) -> bool {
        if self.spec.epsilon > 0.0 {
            (cached - fetched).abs() > self.spec.epsilon
        } else {
            cached != fetched
        }
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let weak = self.self_weak.clone();
        let interval = self.spec.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; the first real tick comes later
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(poller) = weak.upgrade() else { break };
                poller.tick().await;
            }
        })
    }
}

impl Drop for SharedPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}
