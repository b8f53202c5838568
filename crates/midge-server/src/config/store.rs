//! Datastore configuration.

use serde::Deserialize;

/// Which key representation the datastore is built around. The server
/// monomorphises on this choice at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRepr {
    /// Topics packed into a single 64-bit word. Cheapest, but topics are
    /// limited to eight bytes.
    Packed,
    /// Owned topic strings, unrestricted length.
    String,
}

/// Datastore configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub keys: KeyRepr,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            keys: KeyRepr::String,
        }
    }
}
