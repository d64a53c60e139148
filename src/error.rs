use thiserror::Error;

/// Errors raised by the session store.
///
/// Corrupt stored text and a missing storage backend are not errors; they
/// degrade to an absent value or to default-only behavior respectively.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A binding was requested with an empty key.
    #[error("session store key must not be empty")]
    EmptyKey,

    /// A value could not be encoded for storage.
    #[error("failed to serialize value for key `{key}`")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
