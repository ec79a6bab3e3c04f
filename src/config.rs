use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use crate::planner::PlannerConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub planner: PlannerConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            planner: planner_from_env(),
            simulation: SimulationConfig::from_env(),
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
    const HOST_VAR: &'static str = "STOWPLAN_API_HOST";
    const PORT_VAR: &'static str = "STOWPLAN_API_PORT";

    fn from_env() -> Self {
        let default_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let host_value =
            env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (default_ip, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match env_string(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!("{} must not be 0. Using {}.", Self::PORT_VAR, Self::DEFAULT_PORT);
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
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
            display_host: effective_host,
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

/// Simulation clock settings.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    start_date: NaiveDate,
}

impl SimulationConfig {
    const START_DATE_VAR: &'static str = "STOWPLAN_START_DATE";

    fn from_env() -> Self {
        let today = Local::now().date_naive();
        let start_date = match env_string(Self::START_DATE_VAR) {
            Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => date,
                Err(err) => {
                    warn!(
                        "Could not parse {} ('{}') as YYYY-MM-DD: {}. Using {}.",
                        Self::START_DATE_VAR,
                        raw,
                        err,
                        today
                    );
                    today
                }
            },
            None => today,
        };
        Self { start_date }
    }

    /// First day of the simulated clock.
    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }
}

const ALLOW_ROTATION_VAR: &str = "STOWPLAN_ALLOW_ROTATION";
const HIGH_PRIORITY_VAR: &str = "STOWPLAN_HIGH_PRIORITY_THRESHOLD";
const LOW_UTILIZATION_VAR: &str = "STOWPLAN_LOW_UTILIZATION_PERCENT";
const HIGH_UTILIZATION_VAR: &str = "STOWPLAN_HIGH_UTILIZATION_PERCENT";

fn planner_from_env() -> PlannerConfig {
    let allow_rotation = env_string(ALLOW_ROTATION_VAR)
        .and_then(|raw| parse_bool(&raw, ALLOW_ROTATION_VAR))
        .unwrap_or(PlannerConfig::DEFAULT_ALLOW_ROTATION);

    let high_priority_threshold = load_f64_with_warning(
        HIGH_PRIORITY_VAR,
        f64::from(PlannerConfig::DEFAULT_HIGH_PRIORITY_THRESHOLD),
        |value| (0.0..=100.0).contains(&value) && value.fract() == 0.0,
        "must be an integer between 0 and 100",
        "Adjusted priority threshold changes which items are kept near the open face",
    ) as u8;

    let low_utilization_percent = load_f64_with_warning(
        LOW_UTILIZATION_VAR,
        PlannerConfig::DEFAULT_LOW_UTILIZATION_PERCENT,
        |value| (0.0..=100.0).contains(&value),
        "must be between 0 and 100",
        "Adjusted consolidation threshold",
    );

    let high_utilization_percent = load_f64_with_warning(
        HIGH_UTILIZATION_VAR,
        PlannerConfig::DEFAULT_HIGH_UTILIZATION_PERCENT,
        |value| (0.0..=100.0).contains(&value),
        "must be between 0 and 100",
        "Adjusted load-balancing threshold",
    );

    let (low_utilization_percent, high_utilization_percent) =
        if low_utilization_percent > high_utilization_percent {
            warn!(
                "{} ({}) exceeds {} ({}). Using defaults.",
                LOW_UTILIZATION_VAR,
                low_utilization_percent,
                HIGH_UTILIZATION_VAR,
                high_utilization_percent
            );
            (
                PlannerConfig::DEFAULT_LOW_UTILIZATION_PERCENT,
                PlannerConfig::DEFAULT_HIGH_UTILIZATION_PERCENT,
            )
        } else {
            (low_utilization_percent, high_utilization_percent)
        };

    PlannerConfig::builder()
        .allow_rotation(allow_rotation)
        .high_priority_threshold(high_priority_threshold)
        .low_utilization_percent(low_utilization_percent)
        .high_utilization_percent(high_utilization_percent)
        .build()
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
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
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
    notice: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) if validator(value) => {
                let tolerance = default.abs().max(1.0) * 1e-9;
                if (value - default).abs() > tolerance {
                    info!("{} ({} = {}).", notice, var_name, value);
                }
                value
            }
            Ok(_) => {
                warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_true_values() {
        for raw in ["1", "true", "yes", "y", "on", "TRUE", "Yes", " true ", "  1  "] {
            assert_eq!(parse_bool(raw, "TEST_VAR"), Some(true), "{raw}");
        }
    }

    #[test]
    fn test_parse_bool_false_values() {
        for raw in ["0", "false", "no", "n", "off", "FALSE", "No", " false "] {
            assert_eq!(parse_bool(raw, "TEST_VAR"), Some(false), "{raw}");
        }
    }

    #[test]
    fn test_parse_bool_invalid_values() {
        assert_eq!(parse_bool("invalid", "TEST_VAR"), None);
        assert_eq!(parse_bool("2", "TEST_VAR"), None);
        assert_eq!(parse_bool("", "TEST_VAR"), None);
    }

    #[test]
    fn unset_numeric_variable_uses_default() {
        let value = load_f64_with_warning(
            "STOWPLAN_TEST_SURELY_UNSET",
            42.0,
            |value| value > 0.0,
            "must be positive",
            "notice",
        );
        assert_eq!(value, 42.0);
    }
}
