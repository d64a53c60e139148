//! Text encoding of stored values.
//!
//! Values are stored as JSON. Anything that encodes to JSON `null`
//! (`None`, `()`, unit structs serialized as null) is stored as the empty
//! string, and the empty string decodes back to an absent value.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value into its stored text form.
///
/// Field order and integer width are preserved as serde emits them.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let encoded = serde_json::to_string(value)?;
    if encoded == "null" {
        return Ok(String::new());
    }
    Ok(encoded)
}

/// Decode stored text, yielding `None` for empty or unreadable input.
pub fn deserialize<T: DeserializeOwned>(raw: &str) -> Option<T> {
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::trace!(%error, raw, "discarding undecodable stored value");
            None
        }
    }
}
