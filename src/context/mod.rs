//! Binding contexts.
//!
//! A context bundles the broadcast channel and the storage backend that
//! bindings use. There is one process-wide default, and isolated contexts
//! can be scoped per thread or passed explicitly.

mod context;

pub use context::{SessionContext, SessionContextBuilder};
