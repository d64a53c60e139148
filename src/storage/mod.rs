//! Session-scoped key-value storage backends.
//!
//! The store talks to storage only through the [`SessionStorage`] trait, so
//! hosts can plug in their own backend. [`MemoryStorage`] is the in-process
//! default.

mod storage;

pub use storage::{MemoryStorage, SessionStorage};
