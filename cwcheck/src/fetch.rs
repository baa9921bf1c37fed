//! Fetching metric values from the backend
//!
//! [`MetricValueFetcher`] shapes backend responses for the validators. Zero
//! matching datapoints is a valid, empty answer and is never an error; only a
//! failed backend call is. Datapoints are sorted by timestamp before values
//! are extracted, whatever order the backend returned them in.

use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::{
    backend::{self, ListMetricsQuery, MetricsBackend, StatisticsQuery},
    config,
    dimension::{self, Dimension, DimensionFilter},
    metric::{self, Datapoint, MetricIdentity, MetricSeries, QueryWindow, Statistic},
    retry::{self, with_retry},
};

/// Errors produced by [`MetricValueFetcher`]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The backend call failed
    #[error("query for {namespace}/{metric} failed: {source}")]
    Query {
        /// Namespace queried
        namespace: String,
        /// Metric queried
        metric: String,
        /// Underlying backend error
        #[source]
        source: backend::Error,
    },
    /// The dimension set was rejected before any call was made
    #[error(transparent)]
    Dimension(#[from] dimension::Error),
    /// The query window was rejected before any call was made
    #[error(transparent)]
    Window(#[from] metric::Error),
}

impl Error {
    fn query(identity: &MetricIdentity, source: backend::Error) -> Self {
        Error::Query {
            namespace: identity.namespace().to_string(),
            metric: identity.name().to_string(),
            source,
        }
    }
}

/// Queries a [`MetricsBackend`] for series and datapoints
#[derive(Clone, Copy)]
pub struct MetricValueFetcher<'a> {
    backend: &'a dyn MetricsBackend,
    retry: retry::Config,
    window: Duration,
    period: Duration,
}

impl std::fmt::Debug for MetricValueFetcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricValueFetcher")
            .field("retry", &self.retry)
            .field("window", &self.window)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl<'a> MetricValueFetcher<'a> {
    /// Create a new [`MetricValueFetcher`]
    ///
    /// `query` sets the trailing window used by [`MetricValueFetcher::fetch`].
    #[must_use]
    pub fn new(
        backend: &'a dyn MetricsBackend,
        query: &config::Query,
        retry: retry::Config,
    ) -> Self {
        Self {
            backend,
            retry,
            window: query.window(),
            period: query.period(),
        }
    }

    /// The default window, ending now
    ///
    /// # Errors
    ///
    /// Returns an error if the configured window or period is unusable.
    pub fn default_window(&self) -> Result<QueryWindow, Error> {
        Ok(QueryWindow::trailing(
            SystemTime::now(),
            self.window,
            self.period,
        )?)
    }

    /// Fetch the `statistic` series of a metric over the default window
    ///
    /// Values are returned in timestamp order. Datapoints lacking the
    /// statistic are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] if the backend call fails, or a validation
    /// error if `dimensions` repeats a name.
    pub async fn fetch(
        &self,
        namespace: &str,
        metric_name: &str,
        dimensions: &[Dimension],
        statistic: Statistic,
    ) -> Result<Vec<f64>, Error> {
        let identity = MetricIdentity::new(namespace, metric_name);
        let window = self.default_window()?;
        let datapoints = self
            .fetch_datapoints(&identity, dimensions, &window, &[statistic])
            .await?;
        let values: Vec<f64> = datapoints
            .iter()
            .filter_map(|datapoint| datapoint.value(statistic))
            .collect();
        debug!(
            namespace,
            metric = metric_name,
            ?statistic,
            count = values.len(),
            "fetched metric values"
        );
        Ok(values)
    }

    /// Fetch raw datapoints over an explicit window, sorted by timestamp
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] if the backend call fails, or a validation
    /// error if `dimensions` repeats a name.
    pub async fn fetch_datapoints(
        &self,
        identity: &MetricIdentity,
        dimensions: &[Dimension],
        window: &QueryWindow,
        statistics: &[Statistic],
    ) -> Result<Vec<Datapoint>, Error> {
        dimension::ensure_unique(dimensions.iter().map(Dimension::name))?;

        let query = &StatisticsQuery {
            identity,
            dimensions,
            window,
            statistics,
        };
        let backend = self.backend;
        let mut datapoints = with_retry(&self.retry, "GetMetricStatistics", move || {
            backend.get_metric_statistics(query)
        })
        .await
        .map_err(|source| Error::query(identity, source))?;

        datapoints.sort_by_key(|datapoint| datapoint.timestamp);
        Ok(datapoints)
    }

    /// List the recently active series of a metric matching `filters`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] if the backend call fails, or a validation
    /// error if `filters` repeats a name.
    pub async fn list(
        &self,
        identity: &MetricIdentity,
        filters: &[DimensionFilter],
    ) -> Result<Vec<MetricSeries>, Error> {
        dimension::ensure_unique(filters.iter().map(DimensionFilter::name))?;

        let query = &ListMetricsQuery { identity, filters };
        let backend = self.backend;
        with_retry(&self.retry, "ListMetrics", move || backend.list_metrics(query))
            .await
            .map_err(|source| Error::query(identity, source))
    }
}
