//! Settings read from the environment (and `.env`) at startup.

use crate::error::{Error, Result};
use crate::fetch::BrowserConfig;
use std::path::PathBuf;

pub const DEFAULT_LOWER_CHAMBER_URL: &str = "https://votaciones.hcdn.gob.ar";
pub const DEFAULT_UPPER_CHAMBER_URL: &str = "https://www.senado.gov.ar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Remote import API access.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    /// Base URI; endpoints are joined onto it.
    pub uri: Option<String>,
    pub token: Option<String>,
    pub accept_invalid_certs: bool,
}

/// Where each chamber's site lives.
#[derive(Debug, Clone, PartialEq)]
pub struct Sites {
    pub lower_chamber: String,
    pub upper_chamber: String,
}

impl Default for Sites {
    fn default() -> Self {
        Self {
            lower_chamber: DEFAULT_LOWER_CHAMBER_URL.to_string(),
            upper_chamber: DEFAULT_UPPER_CHAMBER_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub api: ApiSettings,
    pub sites: Sites,
    pub step_delay_ms: Option<u64>,
}

impl Settings {
    /// Read settings from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Build settings from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = match get("APP_ENV").as_deref() {
            Some("production") => Environment::Production,
            _ => Environment::Development,
        };
        let step_delay_ms = match get("BROWSER_STEP_DELAY_MS") {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("BROWSER_STEP_DELAY_MS must be a number, got `{raw}`"))
            })?),
            None => None,
        };
        let accept_invalid_certs = match get("API_ACCEPT_INVALID_CERTS").as_deref() {
            None => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(Error::Config(format!(
                    "API_ACCEPT_INVALID_CERTS must be true or false, got `{other}`"
                )))
            }
        };

        Ok(Self {
            environment,
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            api: ApiSettings {
                uri: get("API_URI"),
                token: get("API_TOKEN"),
                accept_invalid_certs,
            },
            sites: Sites {
                lower_chamber: get("LOWER_CHAMBER_URL")
                    .unwrap_or_else(|| DEFAULT_LOWER_CHAMBER_URL.to_string()),
                upper_chamber: get("UPPER_CHAMBER_URL")
                    .unwrap_or_else(|| DEFAULT_UPPER_CHAMBER_URL.to_string()),
            },
            step_delay_ms,
        })
    }

    pub fn browser_config(&self) -> BrowserConfig {
        let mut config = BrowserConfig::for_environment(self.environment.is_production());
        if let Some(delay) = self.step_delay_ms {
            config.step_delay_ms = delay;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_to_development() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.environment, Environment::Development);
        assert_eq!(s.data_dir, PathBuf::from("data"));
        assert_eq!(s.sites, Sites::default());
        assert_eq!(s.browser_config().step_delay_ms, 100);
        assert!(s.browser_config().diagnostics);
    }

    #[test]
    fn production_is_quiet_unless_overridden() {
        let s = settings(&[("APP_ENV", "production")]).unwrap();
        assert_eq!(s.browser_config().step_delay_ms, 0);
        assert!(!s.browser_config().diagnostics);

        let s = settings(&[("APP_ENV", "production"), ("BROWSER_STEP_DELAY_MS", "250")]).unwrap();
        assert_eq!(s.browser_config().step_delay_ms, 250);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            settings(&[("BROWSER_STEP_DELAY_MS", "soon")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            settings(&[("API_ACCEPT_INVALID_CERTS", "maybe")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn reads_api_settings() {
        let s = settings(&[
            ("API_URI", "https://api.example.org"),
            ("API_TOKEN", "secret"),
            ("API_ACCEPT_INVALID_CERTS", "true"),
        ])
        .unwrap();
        assert_eq!(s.api.uri.as_deref(), Some("https://api.example.org"));
        assert_eq!(s.api.token.as_deref(), Some("secret"));
        assert!(s.api.accept_invalid_certs);
    }
}
