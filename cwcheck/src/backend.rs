//! The metrics query backend
//!
//! [`MetricsBackend`] is the seam between the harness and the remote metrics
//! store. The production implementation in [`cloudwatch`] speaks to Amazon
//! CloudWatch; everything above this module is written against the trait.

use async_trait::async_trait;

use crate::{
    dimension::{Dimension, DimensionFilter},
    metric::{Datapoint, MetricIdentity, MetricSeries, QueryWindow, Statistic},
};

pub mod cloudwatch;

/// Errors produced by a [`MetricsBackend`]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The remote call failed
    #[error("{operation} failed: {message}")]
    Request {
        /// The backend operation
        operation: &'static str,
        /// Description of the failure
        message: String,
        /// Whether repeating the call may succeed
        transient: bool,
    },
    /// The remote call succeeded but the response could not be interpreted
    #[error("{operation} returned a malformed response: {message}")]
    Malformed {
        /// The backend operation
        operation: &'static str,
        /// Description of the problem
        message: String,
    },
}

impl Error {
    /// Whether repeating the failed call may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Request { transient, .. } => *transient,
            Error::Malformed { .. } => false,
        }
    }
}

/// A series listing request
#[derive(Debug, Clone, Copy)]
pub struct ListMetricsQuery<'a> {
    /// The metric to list series for
    pub identity: &'a MetricIdentity,
    /// Filters every returned series must satisfy
    pub filters: &'a [DimensionFilter],
}

/// A datapoint statistics request
#[derive(Debug, Clone, Copy)]
pub struct StatisticsQuery<'a> {
    /// The metric to aggregate
    pub identity: &'a MetricIdentity,
    /// The exact dimension set of the series
    pub dimensions: &'a [Dimension],
    /// Window and period of the aggregation
    pub window: &'a QueryWindow,
    /// The statistics to compute per period
    pub statistics: &'a [Statistic],
}

#[async_trait]
/// A store that can be queried for metric series and datapoints
pub trait MetricsBackend: Send + Sync {
    /// List the series of a metric that were recently active and match the
    /// query filters
    async fn list_metrics(&self, query: &ListMetricsQuery<'_>) -> Result<Vec<MetricSeries>, Error>;

    /// Fetch aggregated datapoints for one series. No ordering is promised.
    async fn get_metric_statistics(
        &self,
        query: &StatisticsQuery<'_>,
    ) -> Result<Vec<Datapoint>, Error>;
}
