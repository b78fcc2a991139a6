//! Server configuration from environment variables

use thiserror::Error;

use crate::signaling::DEFAULT_SIGNALING_PORT;

pub const DEFAULT_HOST: &str = "0.0.0.0";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid port in {var}: {value:?}")]
    InvalidPort { var: &'static str, value: String },

    #[error("PORT {0} has no following port, set DIAGNOSTICS_PORT")]
    NoDiagnosticsPort(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub diagnostics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_SIGNALING_PORT,
            diagnostics_port: DEFAULT_SIGNALING_PORT + 1,
        }
    }
}

impl ServerConfig {
    /// `AIRBRIDGE_HOST`, `PORT`, `DIAGNOSTICS_PORT` (defaults to `PORT + 1`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("AIRBRIDGE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_port("PORT", lookup("PORT"))?.unwrap_or(DEFAULT_SIGNALING_PORT);
        let diagnostics_port = match parse_port("DIAGNOSTICS_PORT", lookup("DIAGNOSTICS_PORT"))? {
            Some(p) => p,
            None => port.checked_add(1).ok_or(ConfigError::NoDiagnosticsPort(port))?,
        };

        Ok(Self {
            host,
            port,
            diagnostics_port,
        })
    }

    pub fn signaling_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn diagnostics_addr(&self) -> String {
        format!("{}:{}", self.host, self.diagnostics_port)
    }
}

fn parse_port(var: &'static str, value: Option<String>) -> Result<Option<u16>, ConfigError> {
    match value {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidPort { var, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.signaling_addr(), "0.0.0.0:5000");
        assert_eq!(config.diagnostics_addr(), "0.0.0.0:5001");
    }

    #[test]
    fn diagnostics_port_follows_port() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "8080")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.diagnostics_port, 8081);
    }

    #[test]
    fn explicit_values_win() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("AIRBRIDGE_HOST", "127.0.0.1"),
            ("PORT", "7000"),
            ("DIAGNOSTICS_PORT", "9000"),
        ]))
        .unwrap();
        assert_eq!(config.signaling_addr(), "127.0.0.1:7000");
        assert_eq!(config.diagnostics_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn invalid_port_is_an_error() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidPort {
                var: "PORT",
                value: "http".to_string()
            }
        );
    }

    #[test]
    fn highest_port_needs_explicit_diagnostics_port() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "65535")])).unwrap_err();
        assert_eq!(err, ConfigError::NoDiagnosticsPort(65535));

        let config =
            ServerConfig::from_lookup(lookup(&[("PORT", "65535"), ("DIAGNOSTICS_PORT", "8000")])).unwrap();
        assert_eq!(config.diagnostics_port, 8000);
    }
}
