//! Application configuration from environment variables.
//!
//! Validated once at process startup — a missing credential is a fatal
//! startup condition, never a per-request error.

use thiserror::Error;

/// Configuration loading or validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    #[error("{name} environment variable is required")]
    MissingRequired { name: &'static str },

    /// A variable is present but unusable.
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// OpenAI credentials and model.
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,

    /// MCP / RapidAPI tool-server credentials.
    pub rapidapi_key: String,
    pub rapidapi_host: String,
    pub mcp_server_url: String,

    /// Listen address.
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an injected lookup. Lets tests supply values
    /// without touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let required = |name: &'static str| {
            get(name).ok_or(ConfigError::MissingRequired { name })
        };

        let or_default =
            |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                name: "PORT",
                reason: format!("{e}"),
            })?,
            None => 8000,
        };

        Ok(Self {
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_model: or_default("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            rapidapi_key: required("RAPIDAPI_KEY")?,
            rapidapi_host: or_default("RAPIDAPI_HOST", "irctc1.p.rapidapi.com"),
            mcp_server_url: or_default("MCP_SERVER_URL", "https://mcp.rapidapi.com"),
            host: or_default("HOST", "0.0.0.0"),
            port,
        })
    }

    /// The socket address to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("RAPIDAPI_KEY", "rapid-test"),
        ]))
        .unwrap();

        assert_eq!(settings.openai_model, "gpt-4o-mini");
        assert_eq!(settings.rapidapi_host, "irctc1.p.rapidapi.com");
        assert_eq!(settings.mcp_server_url, "https://mcp.rapidapi.com");
        assert_eq!(settings.listen_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn test_missing_openai_key_is_fatal() {
        let err = Settings::from_lookup(lookup_from(&[("RAPIDAPI_KEY", "rapid-test")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRequired {
                name: "OPENAI_API_KEY"
            }
        ));
    }

    #[test]
    fn test_missing_rapidapi_key_is_fatal() {
        let err = Settings::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRequired {
                name: "RAPIDAPI_KEY"
            }
        ));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", ""),
            ("RAPIDAPI_KEY", "rapid-test"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn test_overrides_and_port_parse() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("RAPIDAPI_KEY", "rapid-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(settings.openai_model, "gpt-4o");
        assert_eq!(settings.listen_addr(), "127.0.0.1:9100");
    }

    #[test]
    fn test_bad_port_is_rejected() {
        let err = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("RAPIDAPI_KEY", "rapid-test"),
            ("PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));
    }
}
