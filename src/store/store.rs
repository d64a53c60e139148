use crate::channel::{Change, Subscription};
use crate::codec;
use crate::context::SessionContext;
use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

/// Per-binding state shared with the channel callback.
struct BindingState {
    key: String,
    // serialized default, captured once at bind time
    default_raw: String,
    raw: RwLock<String>,
}

impl BindingState {
    /// The serialized value a change resolves to for this binding.
    fn resolve(&self, change: &Change) -> String {
        match change {
            Change::Set(raw) => raw.clone(),
            Change::Unset => self.default_raw.clone(),
        }
    }

    fn apply(&self, change: &Change) {
        let next = self.resolve(change);
        *self.raw.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn raw(&self) -> String {
        self.raw
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct BindingInner {
    state: Arc<BindingState>,
    context: Arc<SessionContext>,
    // unsubscribes when the last handle goes away
    _subscription: Subscription,
}

impl BindingInner {
    fn write(&self, raw: String) {
        let _gate = self.context.write_gate();
        let key = self.state.key.as_str();
        if let Some(storage) = self.context.storage() {
            storage.set_item(key, &raw);
        }
        self.context.channel().broadcast(key, &Change::Set(raw));
    }

    fn unset(&self) {
        let _gate = self.context.write_gate();
        let key = self.state.key.as_str();
        tracing::debug!(key, default = %self.state.default_raw, "unset_value");
        if let Some(storage) = self.context.storage() {
            storage.remove_item(key);
        }
        self.context.channel().broadcast(key, &Change::Unset);
    }
}

/// A live association between a storage key and a value of type `T`.
///
/// Cloning a binding yields another handle to the same binding; the channel
/// subscription is released when the last handle is dropped. The stored
/// entry is never touched by teardown.
///
/// # Examples
///
/// ```
/// use tincan_session::context::SessionContext;
/// use tincan_session::SessionStore;
///
/// let store = SessionStore::new(SessionContext::new());
/// let theme = store.bind("theme", "light".to_string()).unwrap();
/// assert_eq!(theme.get().as_deref(), Some("light"));
///
/// theme.set("dark".to_string()).unwrap();
/// let other = store.bind("theme", "light".to_string()).unwrap();
/// assert_eq!(other.get().as_deref(), Some("dark"));
///
/// other.unset();
/// assert_eq!(theme.get().as_deref(), Some("light"));
/// ```
pub struct Binding<T> {
    inner: Arc<BindingInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Binding<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn new(context: Arc<SessionContext>, key: &str, default: T) -> Result<Self, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let default_raw = codec::serialize(&default).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;

        // Read, subscribe and seed without a concurrent write slipping between.
        let gate_owner = Arc::clone(&context);
        let _gate = gate_owner.write_gate();

        let stored = context
            .storage()
            .filter(|storage| storage.contains_key(key))
            .and_then(|storage| storage.get_item(key));
        let existed = stored.is_some();
        tracing::debug!(key, default = %default_raw, existed, "init");

        let state = Arc::new(BindingState {
            key: key.to_string(),
            raw: RwLock::new(stored.unwrap_or_else(|| default_raw.clone())),
            default_raw,
        });

        let subscription = context.channel().subscribe(key, {
            let state = Arc::clone(&state);
            move |change| state.apply(change)
        });

        let inner = BindingInner {
            state,
            context,
            _subscription: subscription,
        };

        // Without storage there is nothing to seed; peers keep their values.
        if !existed && inner.context.has_storage() {
            inner.write(inner.state.default_raw.clone());
        }

        Ok(Self {
            inner: Arc::new(inner),
            _marker: PhantomData,
        })
    }

    /// The storage key this binding is attached to.
    pub fn key(&self) -> &str {
        &self.inner.state.key
    }

    /// The current value, or `None` if the stored text is empty or
    /// does not decode as `T`.
    pub fn get(&self) -> Option<T> {
        codec::deserialize(&self.inner.state.raw())
    }

    /// The current serialized value.
    pub fn raw(&self) -> String {
        self.inner.state.raw()
    }

    /// Store `value` and announce it to every binding of this key,
    /// this one included.
    pub fn set(&self, value: T) -> Result<(), StoreError> {
        let raw = codec::serialize(&value).map_err(|source| StoreError::Serialize {
            key: self.key().to_string(),
            source,
        })?;
        tracing::debug!(key = self.key(), value = %raw, "set_value");
        self.inner.write(raw);
        Ok(())
    }

    /// Read-modify-write against this binding's current value.
    ///
    /// Writes from other threads wait until the update has been broadcast.
    pub fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(Option<T>) -> T,
    {
        let _gate = self.inner.context.write_gate();
        self.set(f(self.get()))
    }

    /// Remove the stored entry and reset every binding of this key to its
    /// own default. Nothing is written until the next `set`.
    pub fn unset(&self) {
        self.inner.unset();
    }

    /// Always `false`; storage access is synchronous.
    pub fn is_loading(&self) -> bool {
        false
    }

    /// Call `callback` with the value this binding resolves from every
    /// change broadcast on its key.
    ///
    /// # Examples
    ///
    /// ```
    /// use tincan_session::context::SessionContext;
    /// use tincan_session::SessionStore;
    /// use std::sync::{Arc, Mutex};
    ///
    /// let store = SessionStore::new(SessionContext::new());
    /// let count = store.bind("count", 0).unwrap();
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let seen_clone = seen.clone();
    /// let _watch = count.watch(move |value| seen_clone.lock().unwrap().push(value));
    ///
    /// count.update(|n| n.unwrap_or(0) + 5).unwrap();
    /// count.unset();
    /// assert_eq!(*seen.lock().unwrap(), vec![Some(5), Some(0)]);
    /// ```
    pub fn watch<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        let state = Arc::clone(&self.inner.state);
        self.inner
            .context
            .channel()
            .subscribe(self.key(), move |change| {
                callback(codec::deserialize(&state.resolve(change)));
            })
    }

    /// Split into the `(value, set_value, unset_value, is_loading)` tuple.
    pub fn split(self) -> (SessionValue<T>, SetValue<T>, UnsetValue, bool) {
        let is_loading = self.is_loading();
        (
            SessionValue {
                binding: self.clone(),
            },
            SetValue {
                binding: self.clone(),
            },
            UnsetValue { inner: self.inner },
            is_loading,
        )
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

/// Read half of a split binding.
pub struct SessionValue<T> {
    binding: Binding<T>,
}

impl<T> SessionValue<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// The current value; see [`Binding::get`].
    pub fn get(&self) -> Option<T> {
        self.binding.get()
    }

    /// The current serialized value.
    pub fn raw(&self) -> String {
        self.binding.raw()
    }

    /// The storage key this value is bound to.
    pub fn key(&self) -> &str {
        self.binding.key()
    }

    /// Observe changes; see [`Binding::watch`].
    pub fn watch<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<T>) + Send + Sync + 'static,
    {
        self.binding.watch(callback)
    }
}

impl<T> Clone for SessionValue<T> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
        }
    }
}

/// Setter half of a split binding.
pub struct SetValue<T> {
    binding: Binding<T>,
}

impl<T> SetValue<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Store `value`; see [`Binding::set`].
    pub fn set(&self, value: T) -> Result<(), StoreError> {
        self.binding.set(value)
    }

    /// Read-modify-write; see [`Binding::update`].
    pub fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(Option<T>) -> T,
    {
        self.binding.update(f)
    }
}

impl<T> Clone for SetValue<T> {
    fn clone(&self) -> Self {
        Self {
            binding: self.binding.clone(),
        }
    }
}

/// Unsetter of a split binding.
#[derive(Clone)]
pub struct UnsetValue {
    inner: Arc<BindingInner>,
}

impl UnsetValue {
    /// Remove the entry; see [`Binding::unset`].
    pub fn unset(&self) {
        self.inner.unset();
    }
}

/// Entry point for creating bindings against one context.
#[derive(Clone)]
pub struct SessionStore {
    context: Arc<SessionContext>,
}

impl SessionStore {
    /// A store creating bindings in `context`.
    pub fn new(context: Arc<SessionContext>) -> Self {
        Self { context }
    }

    /// A store over [`SessionContext::current`].
    pub fn current() -> Self {
        Self::new(SessionContext::current())
    }

    /// The context bindings are created in.
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Bind `key`, seeding storage with `default` if it has no entry.
    ///
    /// `default` is captured once; it is what this binding falls back to
    /// whenever the key is unset.
    pub fn bind<T>(&self, key: &str, default: T) -> Result<Binding<T>, StoreError>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Binding::new(Arc::clone(&self.context), key, default)
    }
}

/// Bind `key` in the current context and split the binding.
///
/// # Examples
///
/// ```
/// use tincan_session::context::SessionContext;
/// use tincan_session::use_session_store;
///
/// SessionContext::scope(|| {
///     let (value, set_value, unset_value, is_loading) =
///         use_session_store("theme", "light".to_string()).unwrap();
///     assert!(!is_loading);
///
///     set_value.set("dark".to_string()).unwrap();
///     assert_eq!(value.get().as_deref(), Some("dark"));
///
///     unset_value.unset();
///     assert_eq!(value.get().as_deref(), Some("light"));
/// });
/// ```
pub fn use_session_store<T>(
    key: &str,
    default: T,
) -> Result<(SessionValue<T>, SetValue<T>, UnsetValue, bool), StoreError>
where
    T: Serialize + DeserializeOwned + 'static,
{
    use_session_store_in(&SessionContext::current(), key, default)
}

/// Bind `key` in an explicit context and split the binding.
pub fn use_session_store_in<T>(
    context: &Arc<SessionContext>,
    key: &str,
    default: T,
) -> Result<(SessionValue<T>, SetValue<T>, UnsetValue, bool), StoreError>
where
    T: Serialize + DeserializeOwned + 'static,
{
    Ok(SessionStore::new(Arc::clone(context)).bind(key, default)?.split())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, SessionStorage};
    use serde::Deserialize;
    use std::sync::{mpsc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Cart {
        items: Vec<String>,
    }

    fn store() -> SessionStore {
        SessionStore::new(SessionContext::new())
    }

    fn stored(store: &SessionStore, key: &str) -> Option<String> {
        store.context().storage().and_then(|s| s.get_item(key))
    }

    #[test]
    fn fresh_key_seeds_storage_with_default() {
        let store = store();
        let binding = store.bind("count", 3).unwrap();
        assert_eq!(binding.get(), Some(3));
        assert_eq!(stored(&store, "count").as_deref(), Some("3"));
    }

    #[test]
    fn existing_entry_wins_over_default() {
        let session = MemoryStorage::new();
        session.set_item("count", "41");
        let store = SessionStore::new(SessionContext::builder().storage(session).build());

        let binding = store.bind("count", 0).unwrap();
        assert_eq!(binding.get(), Some(41));
        assert_eq!(stored(&store, "count").as_deref(), Some("41"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = store().bind("", 1).err();
        assert!(matches!(err, Some(StoreError::EmptyKey)));
    }

    #[test]
    fn set_reaches_every_binding() {
        let store = store();
        let a = store.bind("cart", Cart { items: vec![] }).unwrap();
        let b = store.bind("cart", Cart { items: vec![] }).unwrap();

        a.update(|prev| {
            let mut cart = prev.unwrap_or(Cart { items: vec![] });
            cart.items.push("apple".into());
            cart
        })
        .unwrap();

        let expected = Cart {
            items: vec!["apple".into()],
        };
        assert_eq!(a.get(), Some(expected.clone()));
        assert_eq!(b.get(), Some(expected));
    }

    #[test]
    fn chained_updates_compose() {
        let store = store();
        let counter = store.bind("n", 0u32).unwrap();
        for _ in 0..3 {
            counter.update(|n| n.unwrap_or(0) + 1).unwrap();
        }
        assert_eq!(counter.get(), Some(3));
    }

    #[test]
    fn unset_resets_each_binding_to_its_own_default() {
        let store = store();
        let a = store.bind("mode", "a".to_string()).unwrap();
        let b = store.bind("mode", "b".to_string()).unwrap();
        assert_eq!(b.get().as_deref(), Some("a"));

        b.set("x".to_string()).unwrap();
        a.unset();

        assert_eq!(a.get().as_deref(), Some("a"));
        assert_eq!(b.get().as_deref(), Some("b"));
        assert_eq!(stored(&store, "mode"), None);
    }

    #[test]
    fn corrupt_entry_reads_as_none() {
        let session = MemoryStorage::new();
        session.set_item("n", "{broken");
        let store = SessionStore::new(SessionContext::builder().storage(session).build());

        let binding = store.bind("n", 1).unwrap();
        assert_eq!(binding.get(), None);
        assert_eq!(binding.raw(), "{broken");

        binding.update(|prev| prev.unwrap_or(10)).unwrap();
        assert_eq!(binding.get(), Some(10));
    }

    #[test]
    fn none_stores_empty_string() {
        let store = store();
        let binding = store.bind("maybe", Some(5)).unwrap();
        binding.set(None).unwrap();

        assert_eq!(stored(&store, "maybe").as_deref(), Some(""));
        assert_eq!(binding.get(), None);
    }

    #[test]
    fn detached_context_keeps_values_in_memory() {
        let store = SessionStore::new(SessionContext::builder().detached().build());
        let a = store.bind("k", 1).unwrap();
        a.set(2).unwrap();

        let b = store.bind("k", 1).unwrap();
        assert_eq!(b.get(), Some(1));
        assert_eq!(a.get(), Some(2));

        b.set(3).unwrap();
        assert_eq!(a.get(), Some(3));
    }

    /// Storage that parks the writer of `"1"` until released.
    struct ParkingStorage {
        entries: MemoryStorage,
        parked: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl SessionStorage for ParkingStorage {
        fn contains_key(&self, key: &str) -> bool {
            self.entries.contains_key(key)
        }

        fn get_item(&self, key: &str) -> Option<String> {
            self.entries.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) {
            self.entries.set_item(key, value);
            if value == "1" {
                if let Some(parked) = self.parked.lock().unwrap().take() {
                    parked.send(()).unwrap();
                }
                if let Some(release) = self.release.lock().unwrap().take() {
                    release.recv().unwrap();
                }
            }
        }

        fn remove_item(&self, key: &str) {
            self.entries.remove_item(key)
        }

        fn keys(&self) -> Vec<String> {
            self.entries.keys()
        }

        fn clear(&self) {
            self.entries.clear()
        }
    }

    #[test]
    fn concurrent_sets_leave_bindings_matching_storage() {
        let (parked_tx, parked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let context = SessionContext::builder()
            .storage(ParkingStorage {
                entries: MemoryStorage::new(),
                parked: Mutex::new(Some(parked_tx)),
                release: Mutex::new(Some(release_rx)),
            })
            .build();
        let store = SessionStore::new(context);
        let binding = store.bind("n", 0).unwrap();

        let first = {
            let binding = binding.clone();
            thread::spawn(move || binding.set(1).unwrap())
        };
        parked_rx.recv().unwrap();

        let second = {
            let binding = binding.clone();
            thread::spawn(move || binding.set(2).unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        first.join().unwrap();
        second.join().unwrap();

        let entry = stored(&store, "n");
        assert_eq!(entry.as_deref(), Some("2"));
        assert_eq!(Some(binding.raw()), entry);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = store();
        let counter = store.bind("hits", 0u32).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        counter.update(|n| n.unwrap_or(0) + 1).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(counter.get(), Some(400));
        assert_eq!(stored(&store, "hits").as_deref(), Some("400"));
    }

    #[test]
    fn dropping_last_handle_unsubscribes() {
        let store = store();
        let binding = store.bind("k", 0).unwrap();
        let (value, set_value, unset_value, _) = binding.split();
        assert_eq!(store.context().channel().subscriber_count("k"), 1);

        drop(value);
        drop(set_value);
        assert_eq!(store.context().channel().subscriber_count("k"), 1);

        drop(unset_value);
        assert_eq!(store.context().channel().subscriber_count("k"), 0);
        assert_eq!(stored(&store, "k").as_deref(), Some("0"));
    }
}
