//! Command-line arguments.
//!
//! Every option can also be given through an environment variable with the
//! `SHELLY_PROMETHEUS_EXPORTER_` prefix; command-line values win.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, ExporterConfig};

/// Prometheus exporter for Shelly devices.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "shelly-exporter-prometheus")]
#[command(about = "Export Shelly device status as Prometheus metrics")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, env = "SHELLY_PROMETHEUS_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides config).
    #[arg(long, env = "SHELLY_PROMETHEUS_EXPORTER_PORT")]
    pub port: Option<u16>,

    /// Development mode with verbose logging.
    #[arg(long, env = "SHELLY_PROMETHEUS_EXPORTER_DEV_RELOAD")]
    pub dev_reload: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Build the effective configuration: file (or defaults), then overrides.
    pub fn into_config(self) -> Result<ExporterConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::load_from_file(path)?,
            None => ExporterConfig::default(),
        };

        if let Some(port) = self.port {
            config.set_port(port)?;
        }

        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }

        if self.dev_reload || config.dev_reload {
            config.enable_dev_mode(self.log_level.is_some());
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const PORT_VAR: &str = "SHELLY_PROMETHEUS_EXPORTER_PORT";
    const DEV_RELOAD_VAR: &str = "SHELLY_PROMETHEUS_EXPORTER_DEV_RELOAD";
    const CONFIG_VAR: &str = "SHELLY_PROMETHEUS_EXPORTER_CONFIG";

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Parse `argv` with exactly the given exporter variables in the environment.
    fn parse_with_env(env: &[(&str, &str)], argv: &[&str]) -> Result<Args, clap::Error> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        // SAFETY: every test touching these variables holds ENV_LOCK.
        unsafe {
            for var in [PORT_VAR, DEV_RELOAD_VAR, CONFIG_VAR] {
                std::env::remove_var(var);
            }
            for (key, value) in env {
                std::env::set_var(key, value);
            }
        }

        let result = Args::try_parse_from(argv.iter().copied());

        // SAFETY: still under ENV_LOCK.
        unsafe {
            for (key, _) in env {
                std::env::remove_var(key);
            }
        }

        result
    }

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        parse_with_env(&[], argv)
    }

    #[test]
    fn test_defaults_without_arguments() {
        let args = parse(&["shelly-exporter-prometheus"]).unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.http.listen, "0.0.0.0:8000");
        assert_eq!(config.logging.level, "info");
        assert!(!config.dev_reload);
    }

    #[test]
    fn test_port_override() {
        let args = parse(&["shelly-exporter-prometheus", "--port", "9924"]).unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.http.listen, "0.0.0.0:9924");
    }

    #[test]
    fn test_port_from_environment() {
        let args = parse_with_env(&[(PORT_VAR, "9924")], &["shelly-exporter-prometheus"]).unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.http.listen, "0.0.0.0:9924");
    }

    #[test]
    fn test_command_line_wins_over_environment() {
        let args = parse_with_env(
            &[(PORT_VAR, "9924")],
            &["shelly-exporter-prometheus", "--port", "9100"],
        )
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.http.listen, "0.0.0.0:9100");
    }

    #[test]
    fn test_dev_reload_from_environment() {
        let args =
            parse_with_env(&[(DEV_RELOAD_VAR, "true")], &["shelly-exporter-prometheus"]).unwrap();
        let config = args.into_config().unwrap();

        assert!(config.dev_reload);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_dev_reload_lowers_log_level() {
        let args = parse(&["shelly-exporter-prometheus", "--dev-reload"]).unwrap();
        let config = args.into_config().unwrap();

        assert!(config.dev_reload);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_explicit_log_level_wins_over_dev_mode() {
        let args = parse(&[
            "shelly-exporter-prometheus",
            "--dev-reload",
            "--log-level",
            "warn",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert!(config.dev_reload);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_invalid_port_rejected() {
        let result = parse(&["shelly-exporter-prometheus", "--port", "70000"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/exporter.json5")),
            ..Args::default()
        };
        assert!(args.into_config().is_err());
    }
}
