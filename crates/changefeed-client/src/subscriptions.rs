//! Local fan-out of received events to subscriber callbacks.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use changefeed_core::record::ChangeEvent;

/// Key under which subscribers to every event are registered.
pub const WILDCARD_KEY: &str = "*";

/// A subscriber callback. Runs synchronously on the receive path.
pub type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Returns the registry key for a set of event names: the sorted, de-duplicated
/// names joined with commas, or `*` when the set is empty.
#[must_use]
pub fn subscription_key(names: &[&str]) -> String {
    let mut names: Vec<&str> = names.iter().copied().filter(|n| !n.is_empty()).collect();
    if names.is_empty() {
        return WILDCARD_KEY.to_owned();
    }
    names.sort_unstable();
    names.dedup();
    names.join(",")
}

fn key_matches(key: &str, name: &str) -> bool {
    key == WILDCARD_KEY || key.split(',').any(|n| n == name)
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<String, BTreeMap<u64, Callback>>,
}

/// Subscribers grouped by key. Clones share the same registry.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events named in `names` (every event when
    /// `names` is empty).
    pub fn subscribe<F>(&self, names: &[&str], callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let key = subscription_key(names);
        let mut registry = lock(&self.inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .entries
            .entry(key.clone())
            .or_default()
            .insert(id, Arc::new(callback));

        Subscription {
            registry: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    /// Delivers `event` to every matching subscriber and returns how many
    /// callbacks ran. Callbacks run after the registry lock is released, so
    /// they may subscribe or unsubscribe.
    pub fn dispatch(&self, event: &ChangeEvent) -> usize {
        let callbacks: Vec<Callback> = {
            let registry = lock(&self.inner);
            registry
                .entries
                .iter()
                .filter(|(key, _)| key_matches(key, event.name.as_str()))
                .flat_map(|(_, callbacks)| callbacks.values().cloned())
                .collect()
        };
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Returns the registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.inner).entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of callbacks registered under `key`.
    #[must_use]
    pub fn callback_count(&self, key: &str) -> usize {
        lock(&self.inner).entries.get(key).map_or(0, BTreeMap::len)
    }
}

/// A live subscription. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    key: String,
    id: u64,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// The registry key this subscription lives under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Removes the callback. Equivalent to dropping the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        if let Some(callbacks) = registry.entries.get_mut(&self.key) {
            callbacks.remove(&self.id);
            if callbacks.is_empty() {
                registry.entries.remove(&self.key);
            }
        }
    }
}
