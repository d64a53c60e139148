use crate::channel::BroadcastChannel;
use crate::storage::{MemoryStorage, SessionStorage};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::sync::Arc;

/// Shared state behind every binding: the change channel and, when
/// available, the session storage.
///
/// Supports both a global context (default) and scoped contexts for
/// isolation.
///
/// # Examples
///
/// Using the default global context:
///
/// ```
/// use tincan_session::use_session_store;
///
/// let (value, _set, _unset, _loading) =
///     use_session_store("doc-global", 7).unwrap();
/// assert_eq!(value.get(), Some(7));
/// ```
///
/// Using scoped contexts for isolation:
///
/// ```
/// use tincan_session::context::SessionContext;
/// use tincan_session::use_session_store;
///
/// SessionContext::scope(|| {
///     let (value, _set, _unset, _loading) =
///         use_session_store("count", 0).unwrap();
///     assert_eq!(value.get(), Some(0));
/// });
/// // Context, channel and storage are dropped here
/// ```
pub struct SessionContext {
    channel: BroadcastChannel,
    storage: Option<Arc<dyn SessionStorage>>,
    // Serializes storage write + broadcast; reentrant so callbacks may write.
    write_gate: ReentrantMutex<()>,
}

// Thread-local stack for scoped contexts
thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<SessionContext>>> = RefCell::new(vec![]);
}

impl SessionContext {
    /// Create an isolated context backed by a fresh [`MemoryStorage`].
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Start configuring a context.
    pub fn builder() -> SessionContextBuilder {
        SessionContextBuilder::default()
    }

    /// Run a function with a fresh isolated context.
    ///
    /// Useful for testing. The context and everything it stores is
    /// dropped when the function returns, unless a binding outlives it.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_context(Self::new(), f)
    }

    /// Get or create the global context (fallback).
    pub fn global() -> Arc<Self> {
        use std::sync::OnceLock;
        static CONTEXT: OnceLock<Arc<SessionContext>> = OnceLock::new();
        Arc::clone(CONTEXT.get_or_init(Self::new))
    }

    /// The innermost scoped context on this thread, or the global one.
    pub fn current() -> Arc<Self> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::global)
        })
    }

    /// Run a function with `context` as the current context.
    ///
    /// The previous context is restored even if `f` panics.
    ///
    /// # Examples
    ///
    /// ```
    /// use tincan_session::context::SessionContext;
    /// use tincan_session::use_session_store;
    ///
    /// let context = SessionContext::new();
    /// SessionContext::with_context(context.clone(), || {
    ///     let (_value, set, _unset, _loading) =
    ///         use_session_store("greeting", "hi".to_string()).unwrap();
    ///     set.set("hello".to_string()).unwrap();
    /// });
    ///
    /// let stored = context.storage().and_then(|s| s.get_item("greeting"));
    /// assert_eq!(stored.as_deref(), Some("\"hello\""));
    /// ```
    pub fn with_context<F, R>(context: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(context);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// The change channel shared by this context's bindings.
    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    /// The storage backend, or `None` when the context is detached.
    pub fn storage(&self) -> Option<&dyn SessionStorage> {
        self.storage.as_deref()
    }

    /// Whether this context persists values (false when detached).
    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Hold the context's write gate.
    ///
    /// While held, no other thread can write storage or broadcast through
    /// this context, so a storage write and its broadcast land together.
    pub(crate) fn write_gate(&self) -> ReentrantMutexGuard<'_, ()> {
        self.write_gate.lock()
    }

    /// Drop every subscriber and every stored entry.
    ///
    /// Live bindings keep their last value but stop receiving changes.
    pub fn clear(&self) {
        let _gate = self.write_gate();
        self.channel.clear();
        if let Some(storage) = self.storage() {
            storage.clear();
        }
    }
}

/// Builder for [`SessionContext`].
///
/// # Examples
///
/// ```
/// use tincan_session::context::SessionContext;
/// use tincan_session::storage::MemoryStorage;
///
/// let session = MemoryStorage::new();
/// let first = SessionContext::builder().storage(session.clone()).build();
/// let second = SessionContext::builder().storage(session).build();
/// assert!(first.has_storage() && second.has_storage());
///
/// let offline = SessionContext::builder().detached().build();
/// assert!(!offline.has_storage());
/// ```
pub struct SessionContextBuilder {
    storage: Option<Arc<dyn SessionStorage>>,
}

impl Default for SessionContextBuilder {
    fn default() -> Self {
        Self {
            storage: Some(Arc::new(MemoryStorage::new())),
        }
    }
}

impl SessionContextBuilder {
    /// Use `storage` as the backing session store.
    pub fn storage<S: SessionStorage + 'static>(mut self, storage: S) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    /// Use an already shared storage handle.
    pub fn shared_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Build without any storage; bindings hold defaults and in-memory
    /// updates only.
    pub fn detached(mut self) -> Self {
        self.storage = None;
        self
    }

    /// Finish the context.
    pub fn build(self) -> Arc<SessionContext> {
        Arc::new(SessionContext {
            channel: BroadcastChannel::new(),
            storage: self.storage,
            write_gate: ReentrantMutex::new(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_overrides_global() {
        let global = SessionContext::global();
        SessionContext::scope(|| {
            assert!(!Arc::ptr_eq(&SessionContext::current(), &global));
        });
        assert!(Arc::ptr_eq(&SessionContext::current(), &global));
    }

    #[test]
    fn nested_contexts_unwind_in_order() {
        let outer = SessionContext::new();
        let inner = SessionContext::new();
        SessionContext::with_context(outer.clone(), || {
            SessionContext::with_context(inner.clone(), || {
                assert!(Arc::ptr_eq(&SessionContext::current(), &inner));
            });
            assert!(Arc::ptr_eq(&SessionContext::current(), &outer));
        });
    }

    #[test]
    fn stack_restored_after_panic() {
        let global = SessionContext::global();
        let result = std::panic::catch_unwind(|| {
            SessionContext::scope(|| panic!("boom"));
        });
        assert!(result.is_err());
        assert!(Arc::ptr_eq(&SessionContext::current(), &global));
    }

    #[test]
    fn clear_empties_storage_and_channel() {
        let context = SessionContext::new();
        let _sub = context.channel().subscribe("k", |_| {});
        if let Some(storage) = context.storage() {
            storage.set_item("k", "1");
        }

        context.clear();
        assert_eq!(context.channel().subscriber_count("k"), 0);
        assert!(context.storage().is_some_and(|s| s.is_empty()));
    }
}
