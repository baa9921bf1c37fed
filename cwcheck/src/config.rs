//! The cwcheck configuration file
//!
//! Every section is optional and falls back to its defaults. A missing file
//! is equivalent to an empty one; a file that exists but cannot be read or
//! parsed is an error.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::retry;

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// Main configuration struct for this program
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How to reach the metrics backend
    #[serde(default)]
    pub aws: Aws,
    /// Default query window for value fetches
    #[serde(default)]
    pub query: Query,
    /// Retry policy for backend calls
    #[serde(default)]
    pub retry: retry::Config,
    /// How to discover the host the agent runs on
    #[serde(default)]
    pub environment: Environment,
    /// Names of the runners to execute, in registry order. Empty means all.
    #[serde(default)]
    pub runners: Vec<String>,
}

/// Backend connection settings layered over the ambient AWS configuration
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Aws {
    /// Region override. When absent the ambient provider chain decides.
    pub region: Option<String>,
    /// Endpoint override, useful against local CloudWatch emulators
    pub endpoint_url: Option<String>,
}

fn default_window_seconds() -> u64 {
    600
}

fn default_period_seconds() -> u64 {
    60
}

/// The window used when a fetch does not name one explicitly
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Query {
    /// Length of the trailing window ending now
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Aggregation period inside the window
    #[serde(default = "default_period_seconds")]
    pub period_seconds: u64,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            period_seconds: default_period_seconds(),
        }
    }
}

impl Query {
    /// Length of the trailing window
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Aggregation period
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }
}

fn default_imds_endpoint() -> String {
    "http://169.254.169.254".to_string()
}

fn default_imds_timeout_millis() -> u64 {
    1_000
}

fn default_imds_enabled() -> bool {
    true
}

/// Environment discovery settings
///
/// Any metadata value set here wins over the instance metadata service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    /// Whether to query the instance metadata service at all
    #[serde(default = "default_imds_enabled")]
    pub imds_enabled: bool,
    /// Base URI of the instance metadata service
    #[serde(default = "default_imds_endpoint")]
    pub imds_endpoint: String,
    /// Per-request timeout against the instance metadata service
    #[serde(default = "default_imds_timeout_millis")]
    pub imds_timeout_millis: u64,
    /// Fixed instance id
    pub instance_id: Option<String>,
    /// Fixed image id
    pub image_id: Option<String>,
    /// Fixed instance type
    pub instance_type: Option<String>,
    /// Fixed host name, as the agent reports it in the `host` dimension
    pub hostname: Option<String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            imds_enabled: default_imds_enabled(),
            imds_endpoint: default_imds_endpoint(),
            imds_timeout_millis: default_imds_timeout_millis(),
            instance_id: None,
            image_id: None,
            instance_type: None,
            hostname: None,
        }
    }
}

impl Config {
    /// Load configuration from the YAML file at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        serde_yaml::from_str(&contents).map_err(Error::from)
    }

    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        match Self::load(path) {
            Err(Error::ReadFile { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            res => res,
        }
    }
}
