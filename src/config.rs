//! Layered configuration: a TOML file (if present) overridden by `REGISTRY_`
//! prefixed environment variables, loaded with `figment`.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TracingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"api_registry=debug,tower_http=info"`.
    pub log_level: String,
    /// Emit newline-delimited JSON instead of the human-readable format.
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub tracing: TracingConfig,
    pub environment: String,
    pub grpc_port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::default(),
            environment: "dev".to_string(),
            grpc_port: 9091,
        }
    }
}

/// Builds the layered configuration source: `config/registry.toml` (if it
/// exists) as the base, overridden by `REGISTRY_*` environment variables
/// (double underscore as the nesting separator, e.g. `REGISTRY_TRACING__JSON`).
pub fn figment() -> Figment {
    Figment::from(figment::providers::Serialized::defaults(RegistryConfig::default()))
        .merge(Toml::file(PathBuf::from("config/registry.toml")))
        .merge(Env::prefixed("REGISTRY_").split("__"))
}

pub fn load_config() -> Result<RegistryConfig, figment::Error> {
    figment().extract()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_with_no_file_or_env() {
        let config = load_config().unwrap();
        assert_eq!(config.grpc_port, 9091);
        assert_eq!(config.environment, "dev");
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("REGISTRY_GRPC_PORT", "7000");
        let config = load_config().unwrap();
        std::env::remove_var("REGISTRY_GRPC_PORT");
        assert_eq!(config.grpc_port, 7000);
    }
}
