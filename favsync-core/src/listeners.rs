use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type Listener<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Inner<V> {
    next_id: u64,
    // key -> listeners in registration order
    by_key: HashMap<String, Vec<(ListenerId, Listener<V>)>>,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &str, id: ListenerId) -> bool {
        let Some(listeners) = self.by_key.get_mut(key) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }
}

/// Key -> callbacks fan-out. A notification for one key never reaches the
/// listeners of another.
pub struct ListenerRegistry<V> {
    inner: Arc<Mutex<Inner<V>>>,
}

impl<V> Clone for ListenerRegistry<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for ListenerRegistry<V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                by_key: HashMap::new(),
            })),
        }
    }
}

impl<V: 'static> fmt::Debug for ListenerRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("keys", &self.counts())
            .finish()
    }
}

impl<V: 'static> ListenerRegistry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, key: &str, listener: F) -> Subscription
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner
            .by_key
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        drop(inner);

        let weak: Weak<Mutex<Inner<V>>> = Arc::downgrade(&self.inner);
        Subscription {
            key: key.to_string(),
            id,
            detach: Some(Box::new(move |key: &str, id: ListenerId| {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().unwrap_or_else(PoisonError::into_inner).remove(key, id);
                }
            })),
        }
    }

    /// Calls every listener for `key` in registration order. Listeners run
    /// without the registry lock held, so they may subscribe or unsubscribe.
    pub fn notify(&self, key: &str, value: &V) -> usize {
        let listeners: Vec<Listener<V>> = match self.lock().by_key.get(key) {
            Some(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };
        for listener in &listeners {
            listener(key, value);
        }
        listeners.len()
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.lock().by_key.get(key).map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, key: &str) -> bool {
        self.lock().by_key.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().by_key.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.lock()
            .by_key
            .iter()
            .map(|(key, listeners)| (key.clone(), listeners.len()))
            .collect()
    }
}

type Detach = Box<dyn FnOnce(&str, ListenerId) + Send + Sync>;

/// Registration handle. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    key: String,
    id: ListenerId,
    detach: Option<Detach>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach(&self.key, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.detach.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notifications_stay_on_their_key() {
        let registry: ListenerRegistry<bool> = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = registry.subscribe("a", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.notify("b", &true), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.notify("a", &true), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let registry: ListenerRegistry<bool> = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();
        for n in 0..3 {
            let order = Arc::clone(&order);
            subs.push(registry.subscribe("p1", move |_, _| order.lock().unwrap().push(n)));
        }
        registry.notify("p1", &false);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn last_unsubscribe_removes_the_key() {
        let registry: ListenerRegistry<bool> = ListenerRegistry::new();
        let first = registry.subscribe("p1", |_, _| {});
        let second = registry.subscribe("p1", |_, _| {});
        assert_eq!(registry.listener_count("p1"), 2);

        first.unsubscribe();
        assert_eq!(registry.listener_count("p1"), 1);
        drop(second);
        assert!(!registry.has_listeners("p1"));
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry: ListenerRegistry<bool> = ListenerRegistry::new();
        let sub = registry.subscribe("p1", |_, _| {});
        drop(registry);
        drop(sub);
    }
}
