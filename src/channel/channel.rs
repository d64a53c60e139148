use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// A change announced on a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// The key now holds this serialized value.
    Set(String),
    /// The key's entry was removed; listeners fall back to their own default.
    Unset,
}

type Callback = Arc<dyn Fn(&Change) + Send + Sync>;

#[derive(Default)]
struct ChannelInner {
    // key -> subscribers in registration order
    subscribers: HashMap<String, Vec<(usize, Callback)>>,
}

impl ChannelInner {
    fn is_registered(&self, key: &str, id: usize) -> bool {
        self.subscribers
            .get(key)
            .is_some_and(|subs| subs.iter().any(|(sub_id, _)| *sub_id == id))
    }

    fn remove(&mut self, key: &str, id: usize) {
        if let Some(subs) = self.subscribers.get_mut(key) {
            subs.retain(|(sub_id, _)| *sub_id != id);
            if subs.is_empty() {
                self.subscribers.remove(key);
            }
        }
    }
}

/// Publish/subscribe registry keyed by storage key.
///
/// Callbacks run synchronously inside [`broadcast`](Self::broadcast), in the
/// order they subscribed. The registry lock is never held while a callback
/// runs, so callbacks may subscribe, drop subscriptions or broadcast again.
///
/// # Examples
///
/// ```
/// use tincan_session::channel::{BroadcastChannel, Change};
/// use std::sync::{Arc, Mutex};
///
/// let channel = BroadcastChannel::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
///
/// let subscription = channel.subscribe("theme", move |change| {
///     seen_clone.lock().unwrap().push(change.clone());
/// });
///
/// channel.broadcast("theme", &Change::Set("\"dark\"".into()));
/// drop(subscription);
/// channel.broadcast("theme", &Change::Unset);
///
/// assert_eq!(*seen.lock().unwrap(), vec![Change::Set("\"dark\"".into())]);
/// ```
pub struct BroadcastChannel {
    next_id: AtomicUsize,
    inner: Arc<RwLock<ChannelInner>>,
}

impl BroadcastChannel {
    /// Create a channel with no subscribers.
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(0),
            inner: Arc::new(RwLock::new(ChannelInner::default())),
        }
    }

    /// Register `callback` for changes on `key`.
    ///
    /// The callback stays registered until the returned guard is dropped.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .entry(key.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        tracing::trace!(key, id, "subscribed");

        Subscription {
            key: key.to_string(),
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `change` to every subscriber of `key`.
    ///
    /// The subscriber list is snapshotted first; a subscriber removed by an
    /// earlier callback in the same broadcast is skipped.
    pub fn broadcast(&self, key: &str, change: &Change) {
        let snapshot: Vec<(usize, Callback)> = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            match inner.subscribers.get(key) {
                Some(subs) => subs.clone(),
                None => return,
            }
        };
        tracing::trace!(key, subscribers = snapshot.len(), ?change, "broadcast");

        for (id, callback) in snapshot {
            let registered = self
                .inner
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_registered(key, id);
            if registered {
                callback(change);
            }
        }
    }

    /// Number of live subscribers on `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Drop every subscriber on every key.
    ///
    /// Outstanding [`Subscription`] guards become no-ops.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .clear();
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a channel subscription.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    key: String,
    id: usize,
    channel: Weak<RwLock<ChannelInner>>,
}

impl Subscription {
    /// The key this subscription listens on.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            channel
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.key, self.id);
            tracing::trace!(key = %self.key, id = self.id, "unsubscribed");
        }
    }
}
