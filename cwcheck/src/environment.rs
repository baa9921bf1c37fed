//! Discovery of the host the agent under test runs on
//!
//! Unknown dimension values are resolved against [`MetaData`]. Values come
//! from configuration overrides first and the EC2 instance metadata service
//! (IMDSv2) second. Discovery never fails the run outright: whatever cannot be
//! discovered stays unset and the scenarios that need it fail on their own.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    config,
    dimension::{Dimension, HOST, IMAGE_ID, INSTANCE_ID, INSTANCE_TYPE},
};

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: &str = "21600";

const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
const IMAGE_ID_PATH: &str = "/latest/meta-data/ami-id";
const INSTANCE_TYPE_PATH: &str = "/latest/meta-data/instance-type";
const HOSTNAME_PATH: &str = "/latest/meta-data/local-hostname";

/// Errors produced while talking to the instance metadata service
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wrapper for [`reqwest::Error`].
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status
    #[error("instance metadata request for {path} returned {status}")]
    Status {
        /// Requested path
        path: &'static str,
        /// Response status
        status: StatusCode,
    },
}

/// Facts about the host the agent runs on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    /// EC2 instance id
    pub instance_id: Option<String>,
    /// EC2 image id
    pub image_id: Option<String>,
    /// EC2 instance type
    pub instance_type: Option<String>,
    /// Host name as the agent reports it
    pub hostname: Option<String>,
}

impl MetaData {
    /// Discover metadata according to `config`
    ///
    /// Configured values are taken as-is; the remainder are fetched from the
    /// instance metadata service when it is enabled.
    pub async fn discover(config: &config::Environment) -> Self {
        let mut metadata = Self {
            instance_id: config.instance_id.clone(),
            image_id: config.image_id.clone(),
            instance_type: config.instance_type.clone(),
            hostname: config.hostname.clone(),
        };

        if metadata.is_complete() || !config.imds_enabled {
            return metadata;
        }

        match Imds::new(config) {
            Ok(imds) => {
                if let Err(err) = metadata.fill_from(&imds).await {
                    warn!("instance metadata unavailable: {err}");
                }
            }
            Err(err) => warn!("instance metadata client could not be built: {err}"),
        }

        info!(
            instance_id = ?metadata.instance_id,
            image_id = ?metadata.image_id,
            instance_type = ?metadata.instance_type,
            hostname = ?metadata.hostname,
            "environment metadata discovered"
        );
        metadata
    }

    fn is_complete(&self) -> bool {
        self.instance_id.is_some()
            && self.image_id.is_some()
            && self.instance_type.is_some()
            && self.hostname.is_some()
    }

    async fn fill_from(&mut self, imds: &Imds) -> Result<(), Error> {
        let token = imds.token().await?;
        for (slot, path) in [
            (&mut self.instance_id, INSTANCE_ID_PATH),
            (&mut self.image_id, IMAGE_ID_PATH),
            (&mut self.instance_type, INSTANCE_TYPE_PATH),
            (&mut self.hostname, HOSTNAME_PATH),
        ] {
            if slot.is_none() {
                *slot = Some(imds.get(&token, path).await?);
            }
        }
        Ok(())
    }

    /// The environment value for dimension `name`, if known
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            INSTANCE_ID => self.instance_id.as_deref(),
            IMAGE_ID => self.image_id.as_deref(),
            INSTANCE_TYPE => self.instance_type.as_deref(),
            HOST => self.hostname.as_deref(),
            _ => None,
        }
    }

    /// Concrete dimensions for a fixed list of names
    ///
    /// # Errors
    ///
    /// Returns the names that have no environment value.
    pub fn expected_dimensions(&self, names: &[&str]) -> Result<Vec<Dimension>, Vec<String>> {
        let mut dimensions = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.lookup(name) {
                Some(value) => dimensions.push(Dimension::new(*name, value)),
                None => missing.push((*name).to_string()),
            }
        }
        if missing.is_empty() {
            Ok(dimensions)
        } else {
            Err(missing)
        }
    }
}

/// A minimal IMDSv2 client
#[derive(Debug)]
struct Imds {
    client: Client,
    endpoint: String,
}

impl Imds {
    fn new(config: &config::Environment) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.imds_timeout_millis))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.imds_endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn token(&self) -> Result<String, Error> {
        let resp = self
            .client
            .put(format!("{}{TOKEN_PATH}", self.endpoint))
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Status {
                path: TOKEN_PATH,
                status: resp.status(),
            });
        }
        Ok(resp.text().await?)
    }

    async fn get(&self, token: &str, path: &'static str) -> Result<String, Error> {
        let resp = self
            .client
            .get(format!("{}{path}", self.endpoint))
            .header(TOKEN_HEADER, token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Status {
                path,
                status: resp.status(),
            });
        }
        let body = resp.text().await?;
        debug!(path, value = %body, "instance metadata fetched");
        Ok(body.trim().to_string())
    }
}
