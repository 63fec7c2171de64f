//! Configuration for the hosted model behind the insight panels.

use serde::{Deserialize, Serialize};

/// Default model for all four insight calls
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default API root for the hosted generative language service
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model selection for the insight provider
///
/// ## Example
/// ```rust,ignore
/// use apex_core::insight::{GeminiInsight, InsightConfig};
///
/// // Defaults
/// let config = InsightConfig::default();
///
/// // Specific model, self-hosted gateway
/// let config = InsightConfig::new("gemini-2.0-flash-exp")
///     .with_base_url("http://localhost:9099/v1beta");
///
/// let provider = GeminiInsight::from_env(&config)?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsightConfig {
    /// Model name (e.g. "gemini-2.0-flash")
    pub model: String,
    /// API root, overridable for gateways and tests
    pub base_url: String,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl InsightConfig {
    /// Config for a specific model with the default endpoint
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API root
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InsightConfig::default();
        assert!(config.model.contains("gemini"));
        assert!(config.base_url.starts_with("https://"));
    }

    #[test]
    fn test_base_url_override() {
        let config = InsightConfig::new("gemini-2.0-flash-exp")
            .with_base_url("http://localhost:9099/v1beta");
        assert_eq!(config.base_url, "http://localhost:9099/v1beta");
        assert_eq!(config.model, "gemini-2.0-flash-exp");
    }

    #[test]
    fn test_config_serialization() {
        let config = InsightConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("gemini"));
    }
}
