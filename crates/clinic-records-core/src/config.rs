//! Runtime configuration and logging setup.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! then `CLINIC_*` environment variables (e.g. `CLINIC_DATABASE_PATH`).

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::access::AccessPolicy;

/// Core configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite file; `None` keeps everything in memory
    pub database_path: Option<String>,
    /// Administrator username
    pub admin_username: String,
    /// Hex SHA-256 of the administrator password; empty disables admin access
    pub admin_password_sha256: String,
    /// Lifetime of an administrative capability
    pub admin_grant_ttl_minutes: u32,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            admin_username: "admin".to_string(),
            admin_password_sha256: String::new(),
            admin_grant_ttl_minutes: 30,
            log_filter: "clinic_records_core=info".to_string(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix("CLINIC").try_parsing(true));

        builder
            .build()
            .context("failed to read configuration sources")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Access policy derived from the administrator settings.
    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            admin_username: self.admin_username.trim().to_string(),
            admin_password_sha256: self.admin_password_sha256.trim().to_lowercase(),
            grant_ttl_minutes: self.admin_grant_ttl_minutes,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_filter`. Returns false if a
/// subscriber was already installed.
pub fn init_tracing(log_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter)),
        )
        .try_init()
        .is_ok()
}
