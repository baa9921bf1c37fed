//! Appended EC2 dimensions, resolved locally
//!
//! The agent is configured to append `ImageId`, `InstanceId` and
//! `InstanceType` to every metric. The expected dimension set is built
//! directly from the discovered host metadata and the average series for
//! that exact set must exist and be non-negative.

use async_trait::async_trait;
use tracing::info;

use super::{Context, Error, TestRunner};
use crate::{
    dimension::{IMAGE_ID, INSTANCE_ID, INSTANCE_TYPE},
    metric::Statistic,
    validate,
};

/// Namespace the agent writes into for this scenario
pub const NAMESPACE: &str = "MetricAppendDimensionTest";

const EXPECTED_DIMENSIONS: &[&str] = &[IMAGE_ID, INSTANCE_ID, INSTANCE_TYPE];

/// The `AppendDimension` scenario
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendDimensions;

#[async_trait]
impl TestRunner for AppendDimensions {
    fn test_name(&self) -> &'static str {
        "AppendDimension"
    }

    fn agent_config_file_name(&self) -> &'static str {
        "append_dimension.json"
    }

    fn measured_metrics(&self) -> &'static [&'static str] {
        &["cpu_time_active"]
    }

    async fn validate_metric(&self, context: &Context<'_>, metric_name: &str) -> Result<(), Error> {
        let dimensions = context
            .metadata
            .expected_dimensions(EXPECTED_DIMENSIONS)
            .map_err(Error::Unresolved)?;

        let values = context
            .fetcher
            .fetch(NAMESPACE, metric_name, &dimensions, Statistic::Average)
            .await?;
        info!(metric = metric_name, ?values, "metric values");

        validate::non_empty_non_negative(&values)?;
        Ok(())
    }
}
