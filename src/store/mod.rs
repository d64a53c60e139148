//! Keyed session value store.
//!
//! A binding ties a storage key to a live value. Every binding of the same
//! key in a context sees the latest write, and unsetting resets each one to
//! the default it was created with.

mod store;

pub use store::{
    use_session_store, use_session_store_in, Binding, SessionStore, SessionValue, SetValue,
    UnsetValue,
};
