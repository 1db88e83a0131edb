//! Configuration management for the certificate controller
//!
//! - TOML configuration file parsing
//! - Environment variable overrides
//! - Configuration validation
//! - Default settings

use crate::error::{AcmeError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub challenge: ChallengeSettings,

    #[serde(default)]
    pub metrics: Option<MetricsSettings>,

    /// Reconciliation controller settings
    #[serde(default)]
    pub controller: ControllerSettings,
}

/// Reconciliation controller settings: worker pool size, resync cadence,
/// and the leader-election toggle gating worker startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Number of worker tasks draining the rate-limited queue
    #[serde(default = "default_controller_workers")]
    pub workers: usize,

    /// Full resync period in seconds, independent of event-driven enqueues
    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,

    /// Whether this process must hold a leader lease before workers start.
    /// Modeled as a toggle rather than a real lease since the cluster API
    /// client is out of scope.
    #[serde(default)]
    pub leader_election_enabled: bool,
}

/// Challenge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSettings {
    /// Default challenge type: "http-01", "dns-01"
    #[serde(default = "default_challenge_type")]
    pub challenge_type: String,

    /// HTTP-01 configuration
    #[serde(default)]
    pub http01: Option<Http01Config>,

    /// DNS-01 configuration
    #[serde(default)]
    pub dns01: Option<Dns01Config>,

    /// TLS-ALPN-01 configuration
    #[serde(default)]
    pub tls_alpn: Option<TlsAlpnConfig>,
}

/// HTTP-01 challenge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Http01Config {
    /// Listen address
    #[serde(default = "default_http_listen")]
    pub listen_addr: String,

    /// Domain for validation
    pub domain: Option<String>,

    /// Challenge token path
    #[serde(default = "default_challenge_path")]
    pub challenge_path: String,
}

/// DNS-01 challenge configuration. Concrete DNS provider wiring (API
/// tokens, zone ids, per-provider plumbing) is out of scope for this
/// crate; this only carries the propagation-timeout knob the DNS-01
/// driver's self-check loop reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dns01Config {
    /// DNS propagation timeout
    #[serde(default = "default_dns_timeout")]
    pub propagation_timeout_secs: u64,
}

/// TLS-ALPN-01 challenge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsAlpnConfig {
    /// Listen address
    #[serde(default = "default_tls_listen")]
    pub listen_addr: String,

    /// Certificate path
    pub cert_path: Option<String>,

    /// Key path
    pub key_path: Option<String>,
}

/// Metrics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Enable metrics
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics listen address
    #[serde(default = "default_metrics_listen")]
    pub listen_addr: String,

    /// Metrics prefix
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

// Default values
fn default_true() -> bool {
    true
}

fn default_challenge_type() -> String {
    "dns-01".to_string()
}

fn default_http_listen() -> String {
    "0.0.0.0:80".to_string()
}

fn default_challenge_path() -> String {
    ".well-known/acme-challenge".to_string()
}

fn default_tls_listen() -> String {
    "0.0.0.0:443".to_string()
}

fn default_dns_timeout() -> u64 {
    300
}

fn default_metrics_listen() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_metrics_prefix() -> String {
    "certctl".to_string()
}

fn default_controller_workers() -> usize {
    5
}

fn default_resync_period_secs() -> u64 {
    600
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            challenge_type: default_challenge_type(),
            http01: None,
            dns01: None,
            tls_alpn: None,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen(),
            prefix: default_metrics_prefix(),
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            workers: default_controller_workers(),
            resync_period_secs: default_resync_period_secs(),
            leader_election_enabled: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            challenge: ChallengeSettings::default(),
            metrics: None,
            controller: ControllerSettings::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AcmeError::configuration(&format!("Failed to read config file: {}", e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AcmeError::configuration(&format!("Failed to parse TOML: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Override challenge type
        if let Ok(challenge_type) = env::var("CERTCTL_CHALLENGE_TYPE") {
            self.challenge.challenge_type = challenge_type;
        }

        // Override controller worker count
        if let Ok(workers) = env::var("CERTCTL_CONTROLLER_WORKERS") {
            if let Ok(w) = workers.parse::<usize>() {
                self.controller.workers = w;
            }
        }

        // Override controller resync period
        if let Ok(secs) = env::var("CERTCTL_CONTROLLER_RESYNC_PERIOD") {
            if let Ok(s) = secs.parse::<u64>() {
                self.controller.resync_period_secs = s;
            }
        }

        Ok(())
    }

    /// Expand environment variables in format ${VAR}
    pub fn expand_env_var(value: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|_| AcmeError::configuration("Invalid regex pattern"))?;

        let result = re
            .replace_all(value, |caps: &regex::Captures| {
                let var_name = &caps[1];
                env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string();

        Ok(result)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate challenge type
        match self.challenge.challenge_type.as_str() {
            "http-01" | "dns-01" | "tls-alpn-01" => {}
            challenge_type => {
                return Err(AcmeError::configuration(&format!(
                    "Invalid challenge type: {}",
                    challenge_type
                )));
            }
        }

        // Validate controller settings
        if self.controller.workers == 0 {
            return Err(AcmeError::configuration(
                "Controller worker count must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Get challenge type
    pub fn challenge_type(&self) -> &str {
        &self.challenge.challenge_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(test)]
    use temp_env;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.challenge.challenge_type, "dns-01");
        assert_eq!(config.controller.workers, 5);
    }

    #[test]
    fn test_config_from_string() {
        let toml = r#"
[challenge]
challenge_type = "http-01"

[controller]
workers = 3
resync_period_secs = 120
"#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.challenge.challenge_type, "http-01");
        assert_eq!(config.controller.workers, 3);
        assert_eq!(config.controller.resync_period_secs, 120);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let mut invalid_config = Config::default();
        invalid_config.controller.workers = 0;
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_expand_env_var() {
        // Use temp-env to safely set environment variables in tests
        temp_env::with_var("TEST_VAR", Some("test_value"), || {
            let result = Config::expand_env_var("prefix_${TEST_VAR}_suffix").unwrap();
            assert_eq!(result, "prefix_test_value_suffix");
        });
    }
}
