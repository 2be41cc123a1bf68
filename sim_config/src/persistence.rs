//! Configuration persistence
//!
//! Configuration documents are pretty-printed JSON carrying a format
//! version. Sections and keys that are missing take their defaults.

use crate::{ConfigError, SimConfig};

/// Serializes a configuration to JSON bytes
pub fn serialize_config(config: &SimConfig) -> Result<Vec<u8>, ConfigError> {
    serde_json::to_vec_pretty(config).map_err(|e| ConfigError::SerializationFailed(e.to_string()))
}

/// Deserializes a configuration from JSON bytes
pub fn deserialize_config(bytes: &[u8]) -> Result<SimConfig, ConfigError> {
    let config: SimConfig = serde_json::from_slice(bytes)
        .map_err(|e| ConfigError::DeserializationFailed(e.to_string()))?;

    if config.version != SimConfig::CURRENT_VERSION {
        return Err(ConfigError::UnsupportedVersion(config.version));
    }

    Ok(config)
}
