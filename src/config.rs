use anyhow::{bail, Context, Result};
#[cfg(test)]
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::ingest::INPUT_FILES;

#[derive(Debug, Clone)]
pub struct Config {
    // Directory holding timezones.csv, menu_hours.csv and store_status.csv
    pub data_dir: PathBuf,

    // HTTP API port
    pub http_port: u16,

    // Where --once writes the CSV report
    pub report_output: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            data_dir: get("DATA_DIR")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "./data/input".to_string())
                .into(),
            http_port: get("HTTP_PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse()
                .context("HTTP_PORT must be a valid port number")?,
            report_output: get("REPORT_OUTPUT")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "report.csv".to_string())
                .into(),
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.data_dir.is_dir() {
            errors.push(format!(
                "DATA_DIR '{}' is not a directory.",
                self.data_dir.display()
            ));
        } else {
            for name in INPUT_FILES {
                let path = self.data_dir.join(name);
                if !path.is_file() {
                    errors.push(format!("Input file not found at '{}'.", path.display()));
                }
            }
        }

        if self.http_port == 0 {
            errors.push("HTTP_PORT must be greater than 0.".to_string());
        }

        if let Some(parent) = self.report_output.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                errors.push(format!(
                    "REPORT_OUTPUT directory '{}' does not exist.",
                    parent.display()
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn valid_ports_parse(port in 1u16..=65535u16) {
            let port_str = port.to_string();
            let config = Config::from_getter(|key| match key {
                "HTTP_PORT" => Some(port_str.clone()),
                _ => None,
            }).unwrap();
            prop_assert_eq!(config.http_port, port);
        }

        #[test]
        fn port_parsing_never_panics(port_str in ".*") {
            // This should never panic, only return Ok or Err
            let _ = Config::from_getter(|key| match key {
                "HTTP_PORT" => Some(port_str.clone()),
                _ => None,
            });
        }

        #[test]
        fn data_dir_is_kept_verbatim(dir in "/[a-z]{1,12}(/[a-z0-9_]{1,12}){0,3}") {
            let config = Config::from_getter(|key| match key {
                "DATA_DIR" => Some(dir.clone()),
                _ => None,
            }).unwrap();
            prop_assert_eq!(config.data_dir, PathBuf::from(&dir));
        }
    }
}
