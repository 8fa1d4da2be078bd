//! Instance registry and broadcast fan-out
//!
//! One registry per action kind holds every currently-appeared instance of
//! that kind, in registration order. Broadcasts go through the narrow
//! [`SyncTarget`] interface — never through field pokes — so the registry
//! needs to know nothing about the concrete action type.

use crate::device::DeviceClient;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// What a registered instance exposes to its registry and poller
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Placement context of the instance
    fn sync_id(&self) -> &str;

    /// Client the shared poller may fetch through; `None` while unconfigured
    fn poll_client(&self) -> Option<DeviceClient>;

    /// Value this instance currently has cached, for change detection
    fn cached_value(&self) -> f64;

    /// Adopt a remotely-confirmed value (and bounds) and re-render
    async fn apply_remote_value(&self, value: f64, min: f64, max: f64);
}

/// Ordered set of live instances of one action kind
///
/// Mutated only on appear/disappear; iterated during poll ticks and
/// broadcasts. Instances are held as non-owning-in-spirit `Arc`s used solely
/// for fan-out and liveness counting.
#[derive(Default)]
pub struct Registry {
    instances: Mutex<Vec<Arc<dyn SyncTarget>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance; returns true when it was the first one.
    ///
    /// Re-registering an id replaces the previous entry in place so a
    /// re-appearing control does not change the registration order.
    pub fn add(&self, instance: Arc<dyn SyncTarget>) -> bool {
        let mut instances = self.instances.lock();
        let was_empty = instances.is_empty();
        if let Some(slot) = instances
            .iter_mut()
            .find(|i| i.sync_id() == instance.sync_id())
        {
            *slot = instance;
        } else {
            instances.push(instance);
        }
        was_empty
    }

    /// Unregister by id; returns true when the registry is now empty
    pub fn remove(&self, id: &str) -> bool {
        let mut instances = self.instances.lock();
        instances.retain(|i| i.sync_id() != id);
        instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }

    /// Client of the first registered instance that has one configured
    pub fn first_client(&self) -> Option<DeviceClient> {
        self.instances
            .lock()
            .iter()
            .find_map(|i| i.poll_client())
    }

    /// Snapshot of the registered instances for iteration outside the lock
    pub fn targets(&self) -> Vec<Arc<dyn SyncTarget>> {
        self.instances.lock().clone()
    }

    /// Fan a confirmed value out to every registered instance
    pub async fn broadcast(&self, value: f64, min: f64, max: f64) {
        for target in self.targets() {
            target.apply_remote_value(value, min, max).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Recording target for registry/poller tests
    pub(crate) struct FakeTarget {
        id: String,
        client: Option<DeviceClient>,
        pub(crate) cached: Mutex<f64>,
        pub(crate) applied: Mutex<Vec<(f64, f64, f64)>>,
    }

    impl FakeTarget {
        pub(crate) fn new(id: &str, cached: f64, client: Option<DeviceClient>) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                client,
                cached: Mutex::new(cached),
                applied: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn apply_count(&self) -> usize {
            self.applied.lock().len()
        }
    }

    #[async_trait]
    impl SyncTarget for FakeTarget {
        fn sync_id(&self) -> &str {
            &self.id
        }

        fn poll_client(&self) -> Option<DeviceClient> {
            self.client.clone()
        }

        fn cached_value(&self) -> f64 {
            *self.cached.lock()
        }

        async fn apply_remote_value(&self, value: f64, min: f64, max: f64) {
            *self.cached.lock() = value;
            self.applied.lock().push((value, min, max));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeTarget;
    use super::*;

    #[test]
    fn add_reports_first_and_remove_reports_empty() {
        let registry = Registry::new();
        assert!(registry.add(FakeTarget::new("a", 0.0, None)));
        assert!(!registry.add(FakeTarget::new("b", 0.0, None)));
        assert_eq!(registry.len(), 2);

        assert!(!registry.remove("a"));
        assert!(registry.remove("b"));
        assert!(registry.is_empty());
    }

    #[test]
    fn re_adding_same_id_does_not_duplicate() {
        let registry = Registry::new();
        registry.add(FakeTarget::new("a", 0.0, None));
        registry.add(FakeTarget::new("a", 1.0, None));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.targets()[0].cached_value(), 1.0);
    }

    #[test]
    fn first_client_skips_unconfigured_instances() {
        let registry = Registry::new();
        registry.add(FakeTarget::new("a", 0.0, None));
        registry.add(FakeTarget::new(
            "b",
            0.0,
            Some(DeviceClient::new("10.0.0.2", 4747)),
        ));

        let client = registry.first_client().unwrap();
        assert_eq!(client.host(), "10.0.0.2");
    }

    #[tokio::test]
    async fn broadcast_reaches_every_instance() {
        let registry = Registry::new();
        let a = FakeTarget::new("a", 1.0, None);
        let b = FakeTarget::new("b", 2.0, None);
        registry.add(a.clone());
        registry.add(b.clone());

        registry.broadcast(3.5, 1.0, 8.0).await;

        assert_eq!(*a.cached.lock(), 3.5);
        assert_eq!(*b.cached.lock(), 3.5);
        assert_eq!(a.applied.lock().as_slice(), &[(3.5, 1.0, 8.0)]);
        assert_eq!(b.applied.lock().as_slice(), &[(3.5, 1.0, 8.0)]);
    }
}
