//! # Tincan Session
//!
//! Session-scoped keyed values for Rust, kept in sync across every binding
//! of the same key.
//!
//! ## Bindings (High-level)
//!
//! - `use_session_store(key, default)` - Bind a key and get back
//!   `(value, set_value, unset_value, is_loading)`
//! - `SessionStore` / `Binding<T>` - The same binding as a single handle,
//!   with `watch` for change callbacks
//!
//! ## Plumbing (Low-level)
//!
//! - `SessionContext` - Injectable context: broadcast channel plus storage
//! - `BroadcastChannel` - Per-key publish/subscribe with RAII subscriptions
//! - `SessionStorage` - Storage backend trait, `MemoryStorage` default
//! - `codec` - JSON text encoding, empty string for absent values

pub mod channel;
pub mod codec;
pub mod context;
mod error;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use channel::{BroadcastChannel, Change, Subscription};
pub use context::SessionContext;
pub use error::StoreError;
pub use storage::{MemoryStorage, SessionStorage};
pub use store::{
    use_session_store, use_session_store_in, Binding, SessionStore, SessionValue, SetValue,
    UnsetValue,
};
