//! Daemon configuration from `BILLRUN_*` environment variables

use billrun_core::application::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use billrun_core::application::RetryPolicy;
use billrun_core::error::{AppError, Result};
use billrun_infra_payment::SimulationConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "sqlite://billrun.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 7000;
const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Demo store shape: 100 customers with 10 invoices each
pub const DEMO_CUSTOMERS: i64 = 100;
pub const DEMO_INVOICES_PER_CUSTOMER: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "BILLRUN_LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
    pub retry_policy: RetryPolicy,
    pub seed_demo_data: bool,
    pub payment: SimulationConfig,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup (the environment in
    /// production, a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_attempts: u32 = parse_or(&lookup, "BILLRUN_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(AppError::Config(
                "BILLRUN_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let retry_delay_ms: u64 = parse_or(
            &lookup,
            "BILLRUN_RETRY_DELAY_MS",
            DEFAULT_RETRY_DELAY.as_millis() as u64,
        )?;
        let mut retry_policy =
            RetryPolicy::bounded(max_attempts, Duration::from_millis(retry_delay_ms));
        if parse_or(&lookup, "BILLRUN_UNBOUNDED_RETRIES", false)? {
            retry_policy.unbounded = true;
        }
        if let Some(timeout_ms) = parse_opt::<u64, _>(&lookup, "BILLRUN_CHARGE_TIMEOUT_MS")? {
            retry_policy = retry_policy.with_charge_timeout(Duration::from_millis(timeout_ms));
        }

        let payment = SimulationConfig {
            success_rate: parse_or(&lookup, "BILLRUN_PAYMENT_SUCCESS_RATE", DEFAULT_SUCCESS_RATE)?,
            network_failure_rate: parse_or(&lookup, "BILLRUN_PAYMENT_NETWORK_FAILURE_RATE", 0.0)?,
            latency: Duration::ZERO,
        };
        payment.validate()?;

        Ok(Self {
            db_path: lookup("BILLRUN_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            rpc_host: lookup("BILLRUN_RPC_HOST").unwrap_or_else(|| DEFAULT_RPC_HOST.to_string()),
            rpc_port: parse_or(&lookup, "BILLRUN_RPC_PORT", DEFAULT_RPC_PORT)?,
            log_format: parse_or(&lookup, "BILLRUN_LOG_FORMAT", LogFormat::Pretty)?,
            log_dir: lookup("BILLRUN_LOG_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            retry_policy,
            seed_demo_data: parse_or(&lookup, "BILLRUN_SEED_DEMO_DATA", true)?,
            payment,
        })
    }
}

fn parse_opt<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<DaemonConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.db_path, "sqlite://billrun.db");
        assert_eq!(config.rpc_host, "127.0.0.1");
        assert_eq!(config.rpc_port, 7000);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.log_dir, None);
        assert_eq!(config.retry_policy, RetryPolicy::default());
        assert!(config.seed_demo_data);
        assert_eq!(config.payment, SimulationConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("BILLRUN_DB_PATH", "sqlite::memory:"),
            ("BILLRUN_RPC_PORT", "7100"),
            ("BILLRUN_LOG_FORMAT", "JSON"),
            ("BILLRUN_LOG_DIR", "/var/log/billrun"),
            ("BILLRUN_MAX_ATTEMPTS", "5"),
            ("BILLRUN_RETRY_DELAY_MS", "250"),
            ("BILLRUN_UNBOUNDED_RETRIES", "true"),
            ("BILLRUN_CHARGE_TIMEOUT_MS", "3000"),
            ("BILLRUN_SEED_DEMO_DATA", "false"),
            ("BILLRUN_PAYMENT_SUCCESS_RATE", "0.9"),
        ])
        .unwrap();

        assert_eq!(config.db_path, "sqlite::memory:");
        assert_eq!(config.rpc_port, 7100);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/billrun")));
        assert_eq!(config.retry_policy.max_attempts, 5);
        assert_eq!(config.retry_policy.retry_delay, Duration::from_millis(250));
        assert!(config.retry_policy.unbounded);
        assert_eq!(
            config.retry_policy.charge_timeout,
            Some(Duration::from_secs(3))
        );
        assert!(!config.seed_demo_data);
        assert_eq!(config.payment.success_rate, 0.9);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for vars in [
            [("BILLRUN_MAX_ATTEMPTS", "0")],
            [("BILLRUN_MAX_ATTEMPTS", "three")],
            [("BILLRUN_RPC_PORT", "70000")],
            [("BILLRUN_PAYMENT_SUCCESS_RATE", "1.5")],
            [("BILLRUN_PAYMENT_NETWORK_FAILURE_RATE", "-0.1")],
            [("BILLRUN_LOG_FORMAT", "xml")],
        ] {
            assert!(
                matches!(config(&vars), Err(AppError::Config(_))),
                "{:?} should be rejected",
                vars
            );
        }
    }

    #[test]
    fn test_blank_log_dir_is_unset() {
        let config = config(&[("BILLRUN_LOG_DIR", "  ")]).unwrap();
        assert_eq!(config.log_dir, None);
    }
}
