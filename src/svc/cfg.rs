//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration

use std::{convert::TryFrom, net::SocketAddr, path::PathBuf, time::Duration};

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_CONCURRENCY: u16 = 100;
pub const DEFAULT_REQUEUE_DELAY: u64 = 15;
pub const DEFAULT_SECRET_ATTEMPTS: u64 = 5;
pub const DEFAULT_SECRET_DELAY: u64 = 15;
pub const DEFAULT_STATUS_ATTEMPTS: u64 = 10;
pub const DEFAULT_STATUS_DELAY: u64 = 5;

// -----------------------------------------------------------------------------
// Operator structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Operator {
    #[serde(rename = "listen")]
    pub listen: SocketAddr,
    #[serde(rename = "concurrency")]
    pub concurrency: u16,
    /// delay in seconds before a requeued reconciliation
    #[serde(rename = "requeue_delay")]
    pub requeue_delay: u64,
}

// -----------------------------------------------------------------------------
// Teardown structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Teardown {
    #[serde(rename = "secret_attempts")]
    pub secret_attempts: usize,
    #[serde(rename = "secret_delay")]
    pub secret_delay: u64,
    #[serde(rename = "status_attempts")]
    pub status_attempts: usize,
    #[serde(rename = "status_delay")]
    pub status_delay: u64,
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to build configuration, {0}")]
    Build(ConfigError),
    #[error("failed to load configuration, {0}")]
    Cast(ConfigError),
    #[error("failed to set default for key '{0}', {1}")]
    Default(String, ConfigError),
}

// -----------------------------------------------------------------------------
// Configuration structures

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Configuration {
    #[serde(rename = "operator")]
    pub operator: Operator,
    #[serde(rename = "teardown")]
    pub teardown: Teardown,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            operator: Operator {
                listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
                concurrency: DEFAULT_CONCURRENCY,
                requeue_delay: DEFAULT_REQUEUE_DELAY,
            },
            teardown: Teardown {
                secret_attempts: DEFAULT_SECRET_ATTEMPTS as usize,
                secret_delay: DEFAULT_SECRET_DELAY,
                status_attempts: DEFAULT_STATUS_ATTEMPTS as usize,
                status_delay: DEFAULT_STATUS_DELAY,
            },
        }
    }
}

/// returns a configuration builder holding defaults and the environment source
fn builder() -> Result<ConfigBuilder<DefaultState>, Error> {
    let defaults: [(&str, config::Value); 7] = [
        ("operator.listen", DEFAULT_LISTEN.into()),
        ("operator.concurrency", u64::from(DEFAULT_CONCURRENCY).into()),
        ("operator.requeue_delay", DEFAULT_REQUEUE_DELAY.into()),
        ("teardown.secret_attempts", DEFAULT_SECRET_ATTEMPTS.into()),
        ("teardown.secret_delay", DEFAULT_SECRET_DELAY.into()),
        ("teardown.status_attempts", DEFAULT_STATUS_ATTEMPTS.into()),
        ("teardown.status_delay", DEFAULT_STATUS_DELAY.into()),
    ];

    let mut builder = Config::builder();
    for (key, value) in defaults {
        builder = builder
            .set_default(key, value)
            .map_err(|err| Error::Default(key.to_string(), err))?;
    }

    Ok(builder.add_source(
        Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_"))
            .prefix_separator("__")
            .separator("__"),
    ))
}

impl TryFrom<PathBuf> for Configuration {
    type Error = Error;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        builder()?
            .add_source(File::from(path).required(true))
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }
}

impl Configuration {
    pub fn try_default() -> Result<Self, Error> {
        let home = std::env::var("HOME").unwrap_or_default();
        let paths = [
            PathBuf::from(format!("/usr/share/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!("{}/.config/{}/config", home, env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!(
                "{}/.local/share/{}/config",
                home,
                env!("CARGO_PKG_NAME")
            )),
            PathBuf::from("config"),
        ];

        let mut builder = builder()?;
        for path in paths {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Cast)
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_secs(self.operator.requeue_delay)
    }

    pub fn secret_delay(&self) -> Duration {
        Duration::from_secs(self.teardown.secret_delay)
    }

    pub fn status_delay(&self) -> Duration {
        Duration::from_secs(self.teardown.status_delay)
    }

    /// prints a summary of the configuration in the logs
    pub fn help(&self) {
        tracing::debug!(
            listen = self.operator.listen.to_string(),
            concurrency = self.operator.concurrency,
            requeue_delay = self.operator.requeue_delay,
            "Loaded configuration",
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("ords-operator-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[operator]\nconcurrency = 4\n\n[teardown]\nsecret_attempts = 2").unwrap();

        let config = Configuration::try_from(path).unwrap();

        assert_eq!(config.operator.concurrency, 4);
        assert_eq!(config.teardown.secret_attempts, 2);
        assert_eq!(config.teardown.secret_delay, DEFAULT_SECRET_DELAY);
        assert_eq!(config.teardown.status_attempts, DEFAULT_STATUS_ATTEMPTS as usize);
        assert_eq!(config.secret_delay(), Duration::from_secs(15));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn environment_overrides_defaults() {
        std::env::set_var("ORDS_OPERATOR__OPERATOR__REQUEUE_DELAY", "42");
        std::env::set_var("ORDS_OPERATOR__TEARDOWN__STATUS_DELAY", "7");

        let dir = std::env::temp_dir().join(format!("ords-operator-env-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[teardown]\nstatus_attempts = 3").unwrap();

        let config = Configuration::try_from(path).unwrap();

        std::env::remove_var("ORDS_OPERATOR__OPERATOR__REQUEUE_DELAY");
        std::env::remove_var("ORDS_OPERATOR__TEARDOWN__STATUS_DELAY");
        std::fs::remove_dir_all(dir).unwrap();

        assert_eq!(config.operator.requeue_delay, 42);
        assert_eq!(config.requeue_delay(), Duration::from_secs(42));
        assert_eq!(config.status_delay(), Duration::from_secs(7));
        assert_eq!(config.teardown.status_attempts, 3);
    }
}
