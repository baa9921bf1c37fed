//! Metrics carrying the maximum number of dimensions
//!
//! The agent appends synthetic dimensions up to the backend's per-metric
//! ceiling. The series must still be accepted and listable with the full
//! filter set.

use async_trait::async_trait;

use super::{Context, Error, TestRunner};
use crate::{
    dimension::{self, INSTANCE_ID, MAX_DIMENSIONS},
    metric::MetricIdentity,
    validate,
};

/// Namespace the agent writes into for this scenario
pub const NAMESPACE: &str = "MetricNumberDimensionTest";

/// The `MetricsNumberDimension` scenario
#[derive(Debug, Clone, Copy)]
pub struct NumberDimension {
    dimension_count: usize,
}

impl Default for NumberDimension {
    fn default() -> Self {
        Self {
            dimension_count: MAX_DIMENSIONS,
        }
    }
}

impl NumberDimension {
    /// A scenario expecting `dimension_count` dimensions, including
    /// `InstanceId`
    #[must_use]
    pub fn new(dimension_count: usize) -> Self {
        Self { dimension_count }
    }
}

#[async_trait]
impl TestRunner for NumberDimension {
    fn test_name(&self) -> &'static str {
        "MetricsNumberDimension"
    }

    fn agent_config_file_name(&self) -> &'static str {
        "metrics_number_dimension.json"
    }

    fn measured_metrics(&self) -> &'static [&'static str] {
        &["cpu_time_active"]
    }

    async fn validate_metric(&self, context: &Context<'_>, metric_name: &str) -> Result<(), Error> {
        let instance_id = context
            .metadata
            .lookup(INSTANCE_ID)
            .ok_or_else(|| Error::Unresolved(vec![INSTANCE_ID.to_string()]))?;
        let filters = dimension::build_filter_list(self.dimension_count, instance_id)?;

        let identity = MetricIdentity::new(NAMESPACE, metric_name);
        validate::validate_metric_presence(&context.fetcher, &identity, &filters).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cwcheck_status::TestResult;

    use super::*;
    use crate::{
        config,
        dimension::DimensionFilter,
        environment::MetaData,
        fetch::MetricValueFetcher,
        retry,
        test::{FakeBackend, ec2_metadata, permanent_error, series},
        validate::Violation,
    };

    fn context<'a>(backend: &'a FakeBackend, metadata: &'a MetaData) -> Context<'a> {
        Context {
            fetcher: MetricValueFetcher::new(
                backend,
                &config::Query::default(),
                retry::Config::default(),
            ),
            metadata,
        }
    }

    #[tokio::test]
    async fn full_filter_list_is_submitted() {
        let backend = FakeBackend::default();
        backend.push_series(vec![series(NAMESPACE, "cpu_time_active", Vec::new())]);
        let metadata = ec2_metadata();

        let group = NumberDimension::default()
            .validate(&context(&backend, &metadata))
            .await;
        assert_eq!(group.results, vec![TestResult::passed("cpu_time_active")]);

        let (identity, filters) = &backend.list_requests()[0];
        assert_eq!(identity.namespace(), NAMESPACE);
        assert_eq!(filters.len(), MAX_DIMENSIONS);
        assert_eq!(
            filters.last(),
            Some(&DimensionFilter::exact(INSTANCE_ID, "i-0123456789abcdef0"))
        );
    }

    #[tokio::test]
    async fn no_series_fails() {
        let backend = FakeBackend::default();
        let metadata = ec2_metadata();

        let res = NumberDimension::default()
            .validate_metric(&context(&backend, &metadata), "cpu_time_active")
            .await;
        assert_eq!(res, Err(Error::Violation(Violation::NoSeries)));
    }

    #[tokio::test]
    async fn listing_error_reports_failure() {
        let backend = FakeBackend::default();
        backend.push_list_error(permanent_error());
        let metadata = ec2_metadata();

        let group = NumberDimension::default()
            .validate(&context(&backend, &metadata))
            .await;
        assert_eq!(group.results, vec![TestResult::failed("cpu_time_active")]);
        assert_eq!(backend.list_requests().len(), 1);
    }

    #[tokio::test]
    async fn invalid_count_fails_before_querying() {
        let backend = FakeBackend::default();
        let metadata = ec2_metadata();

        let res = NumberDimension::new(0)
            .validate_metric(&context(&backend, &metadata), "cpu_time_active")
            .await;
        assert!(matches!(
            res,
            Err(Error::Dimension(dimension::Error::InvalidArgument { .. }))
        ));
        assert!(backend.list_requests().is_empty());
    }
}
