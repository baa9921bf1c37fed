//! Globally appended EC2 dimensions, resolved through the dimension factory
//!
//! The agent is configured with global `append_dimensions`, which replace the
//! default `host` dimension. The series carrying the EC2 dimensions must
//! exist with non-negative averages. The same metric queried by `host` must
//! come back empty, and no series carrying the EC2 dimensions may list a
//! `host` dimension of any value.

use async_trait::async_trait;
use tracing::info;

use super::{Context, Error, TestRunner};
use crate::{
    dimension::{
        DimensionFilter, HOST, IMAGE_ID, INSTANCE_ID, INSTANCE_TYPE,
        factory::Instruction,
    },
    metric::{MetricIdentity, Statistic},
    validate,
};

/// Namespace the agent writes into for this scenario
pub const NAMESPACE: &str = "MetricAppendDimensionTest";

/// The `GlobalAppendDimension` scenario
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalAppendDimensions;

fn unresolved(failed: Vec<Instruction>) -> Error {
    Error::Unresolved(failed.into_iter().map(|i| i.key).collect())
}

#[async_trait]
impl TestRunner for GlobalAppendDimensions {
    fn test_name(&self) -> &'static str {
        "GlobalAppendDimension"
    }

    fn agent_config_file_name(&self) -> &'static str {
        "global_append_dimension.json"
    }

    fn measured_metrics(&self) -> &'static [&'static str] {
        &["cpu_time_active"]
    }

    async fn validate_metric(&self, context: &Context<'_>, metric_name: &str) -> Result<(), Error> {
        let factory = context.dimension_factory();

        let (expected, failed) = factory.get_dimensions(&[
            Instruction::unknown(IMAGE_ID),
            Instruction::unknown(INSTANCE_ID),
            Instruction::unknown(INSTANCE_TYPE),
        ]);
        if !failed.is_empty() {
            return Err(unresolved(failed));
        }

        let identity = MetricIdentity::new(NAMESPACE, metric_name);
        let mut filters: Vec<DimensionFilter> =
            expected.iter().map(DimensionFilter::from).collect();
        validate::validate_metric_presence(&context.fetcher, &identity, &filters).await?;

        let values = context
            .fetcher
            .fetch(NAMESPACE, metric_name, &expected, Statistic::Average)
            .await?;
        info!(metric = metric_name, ?values, "metric values");
        validate::all_non_negative(&values)?;

        let (dropped, failed) = factory.get_dimensions(&[Instruction::unknown(HOST)]);
        if !failed.is_empty() {
            return Err(unresolved(failed));
        }

        let values = context
            .fetcher
            .fetch(NAMESPACE, metric_name, &dropped, Statistic::Average)
            .await?;
        validate::check_absence(&values)?;

        filters.push(DimensionFilter::any(HOST));
        validate::validate_metric_absence(&context.fetcher, &identity, &filters).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cwcheck_status::TestResult;

    use super::*;
    use crate::{
        config,
        dimension::Dimension,
        environment::MetaData,
        fetch::MetricValueFetcher,
        retry,
        test::{FakeBackend, averages, ec2_metadata, permanent_error, series, transient_error},
        validate::Violation,
    };

    fn context<'a>(backend: &'a FakeBackend, metadata: &'a MetaData) -> Context<'a> {
        Context {
            fetcher: MetricValueFetcher::new(
                backend,
                &config::Query::default(),
                retry::Config {
                    max_retries: 0,
                    ..retry::Config::default()
                },
            ),
            metadata,
        }
    }

    fn present(backend: &FakeBackend) {
        backend.push_series(vec![series(NAMESPACE, "cpu_time_active", Vec::new())]);
    }

    #[tokio::test]
    async fn dropped_host_dimension_passes() {
        let backend = FakeBackend::default();
        present(&backend);
        backend.push_datapoints(averages(&[1.0, 2.0]));
        backend.push_datapoints(Vec::new());
        let metadata = ec2_metadata();

        let group = GlobalAppendDimensions
            .validate(&context(&backend, &metadata))
            .await;
        assert_eq!(group.name, "GlobalAppendDimension");
        assert_eq!(group.results, vec![TestResult::passed("cpu_time_active")]);

        let requests = backend.statistics_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].dimensions,
            vec![Dimension::new(HOST, "ip-10-0-0-1.ec2.internal")]
        );
        let lists = backend.list_requests();
        assert_eq!(lists.len(), 2);
        let expected = vec![
            DimensionFilter::exact(IMAGE_ID, "ami-0abcdef1234567890"),
            DimensionFilter::exact(INSTANCE_ID, "i-0123456789abcdef0"),
            DimensionFilter::exact(INSTANCE_TYPE, "t3.medium"),
        ];
        assert_eq!(lists[0].1, expected);
        let mut with_host = expected;
        with_host.push(DimensionFilter::any(HOST));
        assert_eq!(lists[1].1, with_host);
    }

    #[tokio::test]
    async fn host_kept_beside_other_dimensions_fails() {
        let backend = FakeBackend::default();
        present(&backend);
        backend.push_datapoints(averages(&[1.0]));
        backend.push_datapoints(Vec::new());
        backend.push_series(vec![series(
            NAMESPACE,
            "cpu_time_active",
            vec![
                Dimension::new("cpu", "cpu-total"),
                Dimension::new(HOST, "ip-10-0-0-1.ec2.internal"),
                Dimension::new(INSTANCE_ID, "i-0123456789abcdef0"),
            ],
        )]);
        let metadata = ec2_metadata();

        let res = GlobalAppendDimensions
            .validate_metric(&context(&backend, &metadata), "cpu_time_active")
            .await;
        assert_eq!(
            res,
            Err(Error::Violation(Violation::UnexpectedSeries { count: 1 }))
        );
    }

    #[tokio::test]
    async fn listing_error_fails_without_panicking() {
        let backend = FakeBackend::default();
        backend.push_list_error(permanent_error());
        let metadata = ec2_metadata();

        let group = GlobalAppendDimensions
            .validate(&context(&backend, &metadata))
            .await;
        assert_eq!(group.results, vec![TestResult::failed("cpu_time_active")]);
        assert!(backend.statistics_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_listing_errors_are_retried() {
        let backend = FakeBackend::default();
        backend.push_list_error(transient_error());
        present(&backend);
        backend.push_datapoints(averages(&[1.0]));
        backend.push_datapoints(Vec::new());
        let metadata = ec2_metadata();
        let context = Context {
            fetcher: MetricValueFetcher::new(
                &backend,
                &config::Query::default(),
                retry::Config::default(),
            ),
            metadata: &metadata,
        };

        let group = GlobalAppendDimensions.validate(&context).await;
        assert_eq!(group.results, vec![TestResult::passed("cpu_time_active")]);
        assert_eq!(backend.list_requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_listing_retries_fail() {
        let backend = FakeBackend::default();
        for _ in 0..4 {
            backend.push_list_error(transient_error());
        }
        let metadata = ec2_metadata();
        let context = Context {
            fetcher: MetricValueFetcher::new(
                &backend,
                &config::Query::default(),
                retry::Config::default(),
            ),
            metadata: &metadata,
        };

        let group = GlobalAppendDimensions.validate(&context).await;
        assert_eq!(group.results, vec![TestResult::failed("cpu_time_active")]);
        assert_eq!(backend.list_requests().len(), 4);
    }

    #[tokio::test]
    async fn host_dimension_still_present_fails() {
        let backend = FakeBackend::default();
        present(&backend);
        backend.push_datapoints(averages(&[1.0]));
        backend.push_datapoints(averages(&[4.0]));
        let metadata = ec2_metadata();

        let res = GlobalAppendDimensions
            .validate_metric(&context(&backend, &metadata), "cpu_time_active")
            .await;
        assert_eq!(
            res,
            Err(Error::Violation(Violation::UnexpectedValues { count: 1 }))
        );
    }

    #[tokio::test]
    async fn missing_series_fails() {
        let backend = FakeBackend::default();
        let metadata = ec2_metadata();

        let res = GlobalAppendDimensions
            .validate_metric(&context(&backend, &metadata), "cpu_time_active")
            .await;
        assert_eq!(res, Err(Error::Violation(Violation::NoSeries)));
        assert!(backend.statistics_requests().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_host_fails() {
        let backend = FakeBackend::default();
        present(&backend);
        backend.push_datapoints(averages(&[1.0]));
        let metadata = MetaData {
            hostname: None,
            ..ec2_metadata()
        };

        let res = GlobalAppendDimensions
            .validate_metric(&context(&backend, &metadata), "cpu_time_active")
            .await;
        assert_eq!(res, Err(Error::Unresolved(vec![HOST.to_string()])));
    }

    #[tokio::test]
    async fn query_error_on_negative_check_fails() {
        let backend = FakeBackend::default();
        present(&backend);
        backend.push_datapoints(averages(&[1.0]));
        backend.push_statistics_error(permanent_error());
        let metadata = ec2_metadata();

        let group = GlobalAppendDimensions
            .validate(&context(&backend, &metadata))
            .await;
        assert_eq!(group.results, vec![TestResult::failed("cpu_time_active")]);
    }
}
