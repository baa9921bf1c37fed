//! Test runners
//!
//! Each runner is one scenario. The agent is configured with the file named
//! by [`TestRunner::agent_config_file_name`] and run for
//! [`TestRunner::agent_run_duration`] by external orchestration; afterwards
//! [`TestRunner::validate`] is called exactly once and produces the
//! scenario's [`TestGroupResult`].
//!
//! Runners never propagate query failures. A failed fetch becomes a failed
//! [`TestResult`] with a logged diagnostic so that sibling scenarios still
//! run.

use std::time::Duration;

use async_trait::async_trait;
use cwcheck_status::{TestGroupResult, TestResult};
use tracing::{info, warn};

use crate::{
    dimension::{self, factory::DimensionFactory},
    environment::MetaData,
    fetch::{self, MetricValueFetcher},
    metric,
    validate::{self, Violation},
};

pub mod append_dimensions;
pub mod collection_interval;
pub mod global_append_dimensions;
pub mod number_dimension;

pub use append_dimensions::AppendDimensions;
pub use collection_interval::CollectionInterval;
pub use global_append_dimensions::GlobalAppendDimensions;
pub use number_dimension::NumberDimension;

/// Shortest time the agent is left running before validation
pub const MINIMUM_AGENT_RUNTIME: Duration = Duration::from_secs(3 * 60);

/// Errors that fail a single check
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Dimensions the scenario needs had no environment value
    #[error("dimensions could not be resolved: {0:?}")]
    Unresolved(Vec<String>),
    /// See [`crate::fetch::Error`] for details.
    #[error(transparent)]
    Fetch(#[from] fetch::Error),
    /// See [`crate::validate::Violation`] for details.
    #[error(transparent)]
    Violation(#[from] Violation),
    /// See [`crate::dimension::Error`] for details.
    #[error(transparent)]
    Dimension(#[from] dimension::Error),
    /// See [`crate::metric::Error`] for details.
    #[error(transparent)]
    Window(#[from] metric::Error),
}

impl From<validate::Error> for Error {
    fn from(err: validate::Error) -> Self {
        match err {
            validate::Error::Fetch(err) => Error::Fetch(err),
            validate::Error::Violation(violation) => Error::Violation(violation),
        }
    }
}

/// An unknown runner name was requested
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown runner {0}, known runners are {1:?}")]
pub struct UnknownRunner(String, Vec<&'static str>);

/// Everything a runner needs to validate
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Queries the metrics backend
    pub fetcher: MetricValueFetcher<'a>,
    /// Facts about the host the agent ran on
    pub metadata: &'a MetaData,
}

impl Context<'_> {
    /// A dimension factory over this context's metadata
    #[must_use]
    pub fn dimension_factory(&self) -> DimensionFactory<'_> {
        DimensionFactory::new(self.metadata)
    }
}

#[async_trait]
/// One validation scenario
pub trait TestRunner: Send + Sync + std::fmt::Debug {
    /// Name of the scenario as reported
    fn test_name(&self) -> &'static str;

    /// Agent configuration file the scenario expects the agent to run with
    fn agent_config_file_name(&self) -> &'static str;

    /// How long the agent should run before validation
    fn agent_run_duration(&self) -> Duration {
        MINIMUM_AGENT_RUNTIME
    }

    /// Metrics checked by this scenario, in reporting order
    fn measured_metrics(&self) -> &'static [&'static str];

    /// Check a single metric
    ///
    /// # Errors
    ///
    /// Returns an error describing why the check failed.
    async fn validate_metric(&self, context: &Context<'_>, metric_name: &str) -> Result<(), Error>;

    /// Check every measured metric, preserving order
    async fn validate(&self, context: &Context<'_>) -> TestGroupResult {
        let metrics = self.measured_metrics();
        let mut results = Vec::with_capacity(metrics.len());
        for metric_name in metrics {
            let outcome = self.validate_metric(context, metric_name).await;
            results.push(into_result(self.test_name(), metric_name, outcome));
        }
        TestGroupResult {
            name: self.test_name().to_string(),
            results,
        }
    }
}

fn into_result(test_name: &str, metric_name: &str, outcome: Result<(), Error>) -> TestResult {
    match outcome {
        Ok(()) => {
            info!(test = test_name, metric = metric_name, "check passed");
            TestResult::passed(metric_name)
        }
        Err(err) => {
            warn!(test = test_name, metric = metric_name, "check failed: {err}");
            TestResult::failed(metric_name)
        }
    }
}

/// Every runner, in execution order
#[must_use]
pub fn registry() -> Vec<Box<dyn TestRunner>> {
    vec![
        Box::new(AppendDimensions),
        Box::new(GlobalAppendDimensions),
        Box::new(NumberDimension::default()),
        Box::new(CollectionInterval::default()),
    ]
}

/// Keep the runners of `registry` named in `names`, in registry order
///
/// An empty `names` keeps every runner.
///
/// # Errors
///
/// Returns [`UnknownRunner`] if a name matches no runner.
pub fn select(
    registry: Vec<Box<dyn TestRunner>>,
    names: &[String],
) -> Result<Vec<Box<dyn TestRunner>>, UnknownRunner> {
    if names.is_empty() {
        return Ok(registry);
    }
    let known: Vec<&'static str> = registry.iter().map(|r| r.test_name()).collect();
    if let Some(unknown) = names.iter().find(|name| !known.contains(&name.as_str())) {
        return Err(UnknownRunner(unknown.clone(), known));
    }
    Ok(registry
        .into_iter()
        .filter(|runner| names.iter().any(|name| name == runner.test_name()))
        .collect())
}

#[cfg(test)]
mod tests {
    use cwcheck_status::Status;

    use super::*;
    use crate::{
        config, retry,
        test::{FakeBackend, averages, ec2_metadata},
    };

    #[derive(Debug)]
    struct TwoMetrics;

    #[async_trait]
    impl TestRunner for TwoMetrics {
        fn test_name(&self) -> &'static str {
            "TwoMetrics"
        }

        fn agent_config_file_name(&self) -> &'static str {
            "two_metrics.json"
        }

        fn measured_metrics(&self) -> &'static [&'static str] {
            &["first", "second"]
        }

        async fn validate_metric(
            &self,
            context: &Context<'_>,
            metric_name: &str,
        ) -> Result<(), Error> {
            let values = context
                .fetcher
                .fetch("ns", metric_name, &[], metric::Statistic::Average)
                .await?;
            validate::non_empty_non_negative(&values)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn validate_preserves_metric_order() {
        let backend = FakeBackend::default();
        backend.push_datapoints(Vec::new());
        backend.push_datapoints(averages(&[1.0]));
        let metadata = ec2_metadata();
        let context = Context {
            fetcher: MetricValueFetcher::new(
                &backend,
                &config::Query::default(),
                retry::Config::default(),
            ),
            metadata: &metadata,
        };

        let group = TwoMetrics.validate(&context).await;
        assert_eq!(group.name, "TwoMetrics");
        assert_eq!(
            group.results,
            vec![TestResult::failed("first"), TestResult::passed("second")]
        );
        assert_eq!(group.results[0].status, Status::Failed);
        assert_eq!(TwoMetrics.agent_run_duration(), MINIMUM_AGENT_RUNTIME);
    }

    #[test]
    fn registry_order_and_names() {
        let names: Vec<&str> = registry().iter().map(|r| r.test_name()).collect();
        assert_eq!(
            names,
            vec![
                "AppendDimension",
                "GlobalAppendDimension",
                "MetricsNumberDimension",
                "MetricsCollectionInterval"
            ]
        );
    }

    #[test]
    fn select_filters_in_registry_order() {
        let selected = select(
            registry(),
            &[
                "MetricsNumberDimension".to_string(),
                "AppendDimension".to_string(),
            ],
        )
        .expect("known names");
        let names: Vec<&str> = selected.iter().map(|r| r.test_name()).collect();
        assert_eq!(names, vec!["AppendDimension", "MetricsNumberDimension"]);

        assert_eq!(select(registry(), &[]).expect("all").len(), 4);
        assert!(select(registry(), &["Nope".to_string()]).is_err());
    }
}
