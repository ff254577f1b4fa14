// src/config/oracle.rs
use serde::{Deserialize, Serialize};

pub const DEFAULT_ORACLE_ENDPOINT: &str = "https://api.mistral.ai/v1/chat/completions";
pub const DEFAULT_ORACLE_MODEL: &str = "mistral-tiny";

fn default_endpoint() -> String {
    DEFAULT_ORACLE_ENDPOINT.to_string()
}
fn default_model() -> String {
    DEFAULT_ORACLE_MODEL.to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_timeout_secs() -> u64 {
    10
}

/// Relevance oracle settings. The API key never comes from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Custom template for free-form analysis; see `oracle::prompts`.
    #[serde(default)]
    pub analysis_template: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            analysis_template: None,
        }
    }
}

impl OracleConfig {
    /// A usable key: present and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Clamp out-of-range values back to defaults.
    pub fn sanitize(&mut self) {
        if !(0.0..=2.0).contains(&self.temperature) || self.temperature.is_nan() {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        if self.endpoint.trim().is_empty() {
            self.endpoint = default_endpoint();
        }
        if self.model.trim().is_empty() {
            self.model = default_model();
        }
        if self
            .analysis_template
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            self.analysis_template = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_counts_as_missing() {
        let mut cfg = OracleConfig::default();
        assert!(cfg.api_key().is_none());
        cfg.api_key = Some("   ".into());
        assert!(cfg.api_key().is_none());
        cfg.api_key = Some(" k-123 ".into());
        assert_eq!(cfg.api_key(), Some("k-123"));
    }

    #[test]
    fn sanitize_restores_defaults() {
        let mut cfg = OracleConfig {
            temperature: 9.0,
            max_tokens: 0,
            timeout_secs: 0,
            model: " ".into(),
            analysis_template: Some("".into()),
            ..Default::default()
        };
        cfg.sanitize();
        assert_eq!(cfg.temperature, 0.7);
        assert_eq!(cfg.max_tokens, 500);
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.model, DEFAULT_ORACLE_MODEL);
        assert!(cfg.analysis_template.is_none());
    }
}
