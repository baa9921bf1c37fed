//! The [CloudWatch](https://aws.amazon.com/cloudwatch/) backend.
//!
//! Series listing goes through `ListMetrics`, restricted to series active in
//! the last three hours, and follows pagination to exhaustion. Datapoints come
//! from `GetMetricStatistics`.

use std::time::SystemTime;

use async_trait::async_trait;
use aws_sdk_cloudwatch::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::DateTime,
    types::{self, RecentlyActive},
};
use tracing::debug;

use super::{Error, ListMetricsQuery, MetricsBackend, StatisticsQuery};
use crate::{
    dimension::{Dimension, DimensionFilter, FilterValue},
    metric::{Datapoint, MetricSeries, Statistic},
};

const LIST_METRICS: &str = "ListMetrics";
const GET_METRIC_STATISTICS: &str = "GetMetricStatistics";

/// Service error codes worth another attempt
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "InternalServiceFault",
    "InternalFailure",
    "ServiceUnavailable",
];

/// A [`MetricsBackend`] over an `aws-sdk-cloudwatch` client
#[derive(Debug, Clone)]
pub struct CloudWatch {
    client: Client,
}

impl CloudWatch {
    /// Create a new [`CloudWatch`] backend
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn request_error<E, R>(operation: &'static str, err: &SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let transient = match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => context
            .err()
            .code()
            .is_some_and(|code| TRANSIENT_CODES.contains(&code)),
        _ => false,
    };
    Error::Request {
        operation,
        message: DisplayErrorContext(err).to_string(),
        transient,
    }
}

fn to_filter(filter: &DimensionFilter) -> types::DimensionFilter {
    let builder = types::DimensionFilter::builder().name(filter.name());
    match filter.value() {
        FilterValue::Exact(value) => builder.value(value).build(),
        FilterValue::Any => builder.build(),
    }
}

fn to_dimension(dimension: &Dimension) -> types::Dimension {
    types::Dimension::builder()
        .name(dimension.name())
        .value(dimension.value())
        .build()
}

fn to_statistic(statistic: Statistic) -> types::Statistic {
    match statistic {
        Statistic::Average => types::Statistic::Average,
        Statistic::Sum => types::Statistic::Sum,
        Statistic::SampleCount => types::Statistic::SampleCount,
        Statistic::Minimum => types::Statistic::Minimum,
        Statistic::Maximum => types::Statistic::Maximum,
    }
}

fn from_datapoint(datapoint: &types::Datapoint) -> Result<Datapoint, Error> {
    let timestamp = datapoint.timestamp().ok_or_else(|| Error::Malformed {
        operation: GET_METRIC_STATISTICS,
        message: "datapoint without timestamp".to_string(),
    })?;
    let timestamp = SystemTime::try_from(*timestamp).map_err(|err| Error::Malformed {
        operation: GET_METRIC_STATISTICS,
        message: format!("datapoint timestamp {timestamp} out of range: {err}"),
    })?;

    Ok(Datapoint {
        timestamp,
        sample_count: datapoint.sample_count(),
        average: datapoint.average(),
        sum: datapoint.sum(),
        minimum: datapoint.minimum(),
        maximum: datapoint.maximum(),
    })
}

fn from_metric(metric: &types::Metric) -> MetricSeries {
    MetricSeries {
        namespace: metric.namespace().unwrap_or_default().to_string(),
        name: metric.metric_name().unwrap_or_default().to_string(),
        dimensions: metric
            .dimensions()
            .iter()
            .map(|d| Dimension::new(d.name().unwrap_or_default(), d.value().unwrap_or_default()))
            .collect(),
    }
}

#[async_trait]
impl MetricsBackend for CloudWatch {
    async fn list_metrics(&self, query: &ListMetricsQuery<'_>) -> Result<Vec<MetricSeries>, Error> {
        let filters: Vec<types::DimensionFilter> = query.filters.iter().map(to_filter).collect();
        let mut series = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_metrics()
                .namespace(query.identity.namespace())
                .metric_name(query.identity.name())
                .set_dimensions(Some(filters.clone()))
                .recently_active(RecentlyActive::Pt3H)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| request_error(LIST_METRICS, &err))?;

            series.extend(output.metrics().iter().map(from_metric));

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(
            namespace = query.identity.namespace(),
            metric = query.identity.name(),
            series = series.len(),
            "listed metric series"
        );
        Ok(series)
    }

    async fn get_metric_statistics(
        &self,
        query: &StatisticsQuery<'_>,
    ) -> Result<Vec<Datapoint>, Error> {
        let output = self
            .client
            .get_metric_statistics()
            .namespace(query.identity.namespace())
            .metric_name(query.identity.name())
            .set_dimensions(Some(query.dimensions.iter().map(to_dimension).collect()))
            .start_time(DateTime::from(query.window.start()))
            .end_time(DateTime::from(query.window.end()))
            .period(query.window.period_seconds())
            .set_statistics(Some(
                query.statistics.iter().copied().map(to_statistic).collect(),
            ))
            .send()
            .await
            .map_err(|err| request_error(GET_METRIC_STATISTICS, &err))?;

        output.datapoints().iter().map(from_datapoint).collect()
    }
}
