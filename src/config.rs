use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::planner::PlanningConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub planner: PlannerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            storage: StorageConfig::from_env(),
            planner: PlannerConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "LOAD_PLANNER_API_HOST";
    const PORT_VAR: &'static str = "LOAD_PLANNER_API_PORT";

    fn from_env() -> Self {
        Self::from_values(env_string(Self::HOST_VAR), env_string(Self::PORT_VAR))
    }

    fn from_values(host: Option<String>, port: Option<String>) -> Self {
        let host_value = host.unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                tracing::warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    Self::DEFAULT_HOST.to_string(),
                )
            }
        };

        let port = match port {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    tracing::warn!(
                        "{} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    tracing::warn!(
                        "Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// Where saved projects and board messages live.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    data_dir: PathBuf,
    persist: bool,
}

impl StorageConfig {
    const DEFAULT_DATA_DIR: &'static str = "data";
    const DATA_DIR_VAR: &'static str = "LOAD_PLANNER_DATA_DIR";
    const PERSIST_VAR: &'static str = "LOAD_PLANNER_PERSIST";

    fn from_env() -> Self {
        let data_dir = env_string(Self::DATA_DIR_VAR)
            .unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_string());
        let persist = env_string(Self::PERSIST_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PERSIST_VAR))
            .unwrap_or(true);
        Self {
            data_dir: PathBuf::from(data_dir),
            persist,
        }
    }

    /// Directory holding one JSON file per collection.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// When false, collections are kept in memory only.
    pub fn persist(&self) -> bool {
        self.persist
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(Self::DEFAULT_DATA_DIR),
            persist: true,
        }
    }
}

/// Configuration for the load planner.
#[derive(Clone, Debug, Default)]
pub struct PlannerConfig {
    planning: PlanningConfig,
}

impl PlannerConfig {
    const EFFICIENCY_VAR: &'static str = "LOAD_PLANNER_PACKING_EFFICIENCY";

    fn from_env() -> Self {
        let packing_efficiency = load_f64_with_warning(
            Self::EFFICIENCY_VAR,
            PlanningConfig::DEFAULT_PACKING_EFFICIENCY,
            |value| value > 0.0 && value <= 1.0,
            "must be greater than 0 and at most 1",
            "Adjusted packing efficiency changes how many containers are planned",
        );

        let planning = PlanningConfig::builder()
            .packing_efficiency(packing_efficiency)
            .build();

        Self { planning }
    }

    /// Returns the configured PlanningConfig.
    pub fn planning_config(&self) -> PlanningConfig {
        self.planning
    }
}

/// Log output settings. Read before the subscriber is installed.
#[derive(Clone, Debug, Default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl LoggingConfig {
    const JSON_VAR: &'static str = "LOAD_PLANNER_LOG_JSON";

    pub fn from_env() -> Self {
        let json = env_string(Self::JSON_VAR)
            .and_then(|raw| parse_bool(&raw, Self::JSON_VAR))
            .unwrap_or(false);
        Self { json }
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            tracing::warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            tracing::warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name,
                other
            );
            None
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => parse_f64_with_warning(var_name, &raw, default, validator, invalid_hint, warning),
        None => default,
    }
}

fn parse_f64_with_warning(
    var_name: &str,
    raw: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match raw.parse::<f64>() {
        Ok(value) => {
            if !validator(value) {
                tracing::warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name,
                    raw,
                    invalid_hint,
                    default
                );
                default
            } else {
                let tolerance = (default.abs().max(1.0)) * 1e-9;
                if (value - default).abs() > tolerance {
                    tracing::info!("{} ({} = {}).", warning, var_name, value);
                }
                value
            }
        }
        Err(err) => {
            tracing::warn!(
                "Could not parse {} ('{}') as number: {}. Using {}.",
                var_name,
                raw,
                err,
                default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        assert_eq!(parse_bool("1", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("true", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("yes", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("y", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("on", "TEST_VAR"), Some(true));

        // Test case insensitivity
        assert_eq!(parse_bool("TRUE", "TEST_VAR"), Some(true));
        assert_eq!(parse_bool("Yes", "TEST_VAR"), Some(true));

        // Test with whitespace
        assert_eq!(parse_bool(" true ", "TEST_VAR"), Some(true));
    }

    #[test]
    fn test_parse_bool_false_values() {
        assert_eq!(parse_bool("0", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("false", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("no", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("n", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("OFF", "TEST_VAR"), Some(false));
        assert_eq!(parse_bool("  0  ", "TEST_VAR"), Some(false));
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn test_api_config_defaults_and_fallbacks() {
        let config = ApiConfig::from_values(None, None);
        assert_eq!(config.port(), 8080);
        assert!(config.binds_to_all_interfaces());

        let config = ApiConfig::from_values(Some("127.0.0.1".into()), Some("9000".into()));
        assert_eq!(config.socket_addr(), "127.0.0.1:9000".parse().unwrap());
        assert!(!config.binds_to_all_interfaces());

        let config = ApiConfig::from_values(Some("not-an-ip".into()), Some("0".into()));
        assert_eq!(config.display_host(), "0.0.0.0");
        assert_eq!(config.port(), 8080);
    }

    #[test]
    fn test_packing_efficiency_validation() {
        let accept = |v: f64| v > 0.0 && v <= 1.0;
        assert_eq!(parse_f64_with_warning("V", "0.8", 0.95, accept, "", ""), 0.8);
        assert_eq!(parse_f64_with_warning("V", "1.5", 0.95, accept, "", ""), 0.95);
        assert_eq!(parse_f64_with_warning("V", "abc", 0.95, accept, "", ""), 0.95);
    }
}
