//! Collection interval honored by the agent
//!
//! With a fixed collection interval the number of samples the agent publishes
//! over its run is predictable. The summed sample count over the run window
//! must land within one interval of the expected count.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use super::{Context, Error, MINIMUM_AGENT_RUNTIME, TestRunner};
use crate::{
    dimension::INSTANCE_ID,
    metric::{MetricIdentity, QueryWindow},
    validate,
};

/// Namespace the agent writes into for this scenario
pub const NAMESPACE: &str = "MetricCollectionIntervalTest";

/// The `MetricsCollectionInterval` scenario
#[derive(Debug, Clone, Copy)]
pub struct CollectionInterval {
    interval: Duration,
    run_duration: Duration,
}

impl Default for CollectionInterval {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            run_duration: MINIMUM_AGENT_RUNTIME,
        }
    }
}

impl CollectionInterval {
    /// Inclusive range of samples expected over the run
    #[must_use]
    pub fn expected_samples(&self) -> std::ops::RangeInclusive<u64> {
        let intervals = self
            .run_duration
            .as_secs()
            .checked_div(self.interval.as_secs())
            .unwrap_or(0);
        intervals.saturating_sub(1)..=intervals + 1
    }
}

#[async_trait]
impl TestRunner for CollectionInterval {
    fn test_name(&self) -> &'static str {
        "MetricsCollectionInterval"
    }

    fn agent_config_file_name(&self) -> &'static str {
        "metrics_collection_interval.json"
    }

    fn agent_run_duration(&self) -> Duration {
        self.run_duration
    }

    fn measured_metrics(&self) -> &'static [&'static str] {
        &["mem_used_percent"]
    }

    async fn validate_metric(&self, context: &Context<'_>, metric_name: &str) -> Result<(), Error> {
        let dimensions = context
            .metadata
            .expected_dimensions(&[INSTANCE_ID])
            .map_err(Error::Unresolved)?;
        let window = QueryWindow::trailing(SystemTime::now(), self.run_duration, self.interval)?;
        let identity = MetricIdentity::new(NAMESPACE, metric_name);

        validate::validate_sample_count(
            &context.fetcher,
            &identity,
            &dimensions,
            &window,
            self.expected_samples(),
        )
        .await
        .into_result()?;
        Ok(())
    }
}
