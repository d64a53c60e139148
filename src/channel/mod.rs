//! In-memory change broadcast between bindings that share a key.

mod channel;

pub use channel::{BroadcastChannel, Change, Subscription};
