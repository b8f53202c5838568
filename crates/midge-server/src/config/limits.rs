//! Resource limits.

use serde::Deserialize;

/// Default ceiling on a single PUBLISH payload (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest PUBLISH payload accepted, checked before the body is read
    /// off the wire. Oversized publishes fail dispatch; the packet drain
    /// keeps the stream aligned.
    pub max_payload_size: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_payload_size == 0 {
            return Err("limits.max_payload_size must be non-zero".to_string());
        }
        if self.max_payload_size > midge_core::varint::MAX {
            return Err(format!(
                "limits.max_payload_size cannot exceed {}",
                midge_core::varint::MAX
            ));
        }
        Ok(())
    }
}
