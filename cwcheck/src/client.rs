//! The process-wide CloudWatch client
//!
//! The client is built on first use from the ambient AWS configuration and
//! cached for the life of the process. Construction happens at most once even
//! under concurrent first calls; a failed construction is not cached.

use aws_config::{BehaviorVersion, Region};
use tokio::sync::OnceCell;
use tracing::info;

use crate::{backend::cloudwatch::CloudWatch, config};

static CLIENT: OnceCell<MetricsClient> = OnceCell::const_new();

/// Errors produced while building the client
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The ambient AWS configuration is unusable
    #[error("AWS configuration could not be resolved: {0}")]
    Configuration(String),
}

/// The shared backend handle
#[derive(Debug)]
pub struct MetricsClient {
    backend: CloudWatch,
    region: String,
}

impl MetricsClient {
    async fn connect(settings: &config::Aws) -> Result<Self, Error> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;

        let region = sdk_config
            .region()
            .map(ToString::to_string)
            .ok_or_else(|| Error::Configuration("no region configured".to_string()))?;
        info!(%region, "CloudWatch client constructed");

        Ok(Self {
            backend: CloudWatch::new(aws_sdk_cloudwatch::Client::new(&sdk_config)),
            region,
        })
    }

    /// The backend to issue queries through
    #[must_use]
    pub fn backend(&self) -> &CloudWatch {
        &self.backend
    }

    /// The region the client talks to
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }
}

/// Return the shared client, constructing it on first call
///
/// `settings` only matter on the call that constructs the client; later calls
/// return the cached instance unchanged.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if no region can be resolved.
pub async fn get_client(settings: &config::Aws) -> Result<&'static MetricsClient, Error> {
    CLIENT
        .get_or_try_init(|| MetricsClient::connect(settings))
        .await
}
