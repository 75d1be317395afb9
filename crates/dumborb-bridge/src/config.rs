use serde::{Deserialize, Serialize};

use dumborb_common::{DumborbError, Result};
use dumborb_serializer::SerializerConfig;

/// Configuration for a bridge.
///
/// Scoped bridges inherit the configuration of the global bridge they are
/// created from.
///
/// # Example
///
/// ```rust
/// use dumborb_bridge::BridgeConfig;
///
/// let config = BridgeConfig::from_json_str(r#"{
///     "include_traces": true,
///     "serializer": { "fixup_policy": "circular_only" }
/// }"#).unwrap();
/// assert!(config.include_traces);
/// assert!(config.serializer.marshal_class_hints);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub serializer: SerializerConfig,
    /// Attach traces to every application error, not only for callers that
    /// ask for diagnostics
    pub include_traces: bool,
}

impl BridgeConfig {
    /// Loads a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `DumborbError::Json` if the text is not a valid configuration.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(DumborbError::from)
    }
}
