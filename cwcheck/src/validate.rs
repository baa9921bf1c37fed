//! Assertions over fetched metric data
//!
//! The `check_*` functions and the non-negativity checks are pure: they
//! inspect data already fetched and return a [`Violation`] when an expectation
//! does not hold. The `validate_*` functions fetch through a
//! [`MetricValueFetcher`] and then apply the matching pure check.
//!
//! Two non-negativity checks exist because scenarios disagree on whether an
//! empty series is acceptable: [`all_non_negative`] passes an empty series,
//! [`non_empty_non_negative`] does not.

use std::ops::RangeInclusive;

use tracing::info;

use crate::{
    dimension::{Dimension, DimensionFilter},
    fetch::{self, MetricValueFetcher},
    metric::{Datapoint, MetricIdentity, MetricSeries, QueryWindow, Statistic},
};

/// An expectation about metric data that did not hold
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum Violation {
    /// No series matched the query
    #[error("no metric series matched")]
    NoSeries,
    /// No values were returned
    #[error("no values returned")]
    NoValues,
    /// A value was negative
    #[error("value {value} at position {index} is negative")]
    Negative {
        /// Position in the series
        index: usize,
        /// The offending value
        value: f64,
    },
    /// Values were returned where none were expected
    #[error("{count} values returned where none were expected")]
    UnexpectedValues {
        /// How many values came back
        count: usize,
    },
    /// Series were listed where none were expected
    #[error("{count} metric series matched where none were expected")]
    UnexpectedSeries {
        /// How many series matched
        count: usize,
    },
    /// The summed sample count was outside the expected range
    #[error("sample count {actual} outside of {low}..={high}")]
    SampleCount {
        /// The summed sample count
        actual: u64,
        /// Inclusive lower bound
        low: u64,
        /// Inclusive upper bound
        high: u64,
    },
}

/// Errors produced by the `validate_*` functions
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The query could not be made
    #[error(transparent)]
    Fetch(#[from] fetch::Error),
    /// The data did not meet the expectation
    #[error(transparent)]
    Violation(#[from] Violation),
}

/// Fails if `series` is empty
///
/// # Errors
///
/// Returns [`Violation::NoSeries`] if no series were returned.
pub fn check_presence(series: &[MetricSeries]) -> Result<(), Violation> {
    if series.is_empty() {
        Err(Violation::NoSeries)
    } else {
        Ok(())
    }
}

/// Fails if `series` is not empty
///
/// # Errors
///
/// Returns [`Violation::UnexpectedSeries`] if any series was returned.
pub fn check_no_series(series: &[MetricSeries]) -> Result<(), Violation> {
    if series.is_empty() {
        Ok(())
    } else {
        Err(Violation::UnexpectedSeries {
            count: series.len(),
        })
    }
}

/// Fails if `values` is not empty
///
/// # Errors
///
/// Returns [`Violation::UnexpectedValues`] if any value was returned.
pub fn check_absence(values: &[f64]) -> Result<(), Violation> {
    if values.is_empty() {
        Ok(())
    } else {
        Err(Violation::UnexpectedValues {
            count: values.len(),
        })
    }
}

/// Fails if any value is negative. An empty series passes.
///
/// # Errors
///
/// Returns [`Violation::Negative`] naming the first negative value.
pub fn all_non_negative(values: &[f64]) -> Result<(), Violation> {
    match values.iter().position(|value| *value < 0.0) {
        Some(index) => Err(Violation::Negative {
            index,
            value: values[index],
        }),
        None => Ok(()),
    }
}

/// Fails if the series is empty or any value is negative
///
/// # Errors
///
/// Returns [`Violation::NoValues`] for an empty series, otherwise see
/// [`all_non_negative`].
pub fn non_empty_non_negative(values: &[f64]) -> Result<(), Violation> {
    if values.is_empty() {
        return Err(Violation::NoValues);
    }
    all_non_negative(values)
}

/// Outcome of a sample count bounds check
#[derive(Debug, Clone, PartialEq)]
pub enum SampleCount {
    /// The datapoints could not be fetched
    QueryFailed(fetch::Error),
    /// The summed sample count fell outside the expected range
    OutOfRange {
        /// Summed sample count
        actual: u64,
        /// Inclusive expected range
        expected: RangeInclusive<u64>,
    },
    /// The summed sample count fell inside the expected range
    InRange(u64),
}

impl SampleCount {
    /// Whether the check passed
    #[must_use]
    pub fn is_in_range(&self) -> bool {
        matches!(self, SampleCount::InRange(_))
    }

    /// Convert into a `Result`, mapping the failure variants to [`Error`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] for a failed query and
    /// [`Violation::SampleCount`] for an out of range sum.
    pub fn into_result(self) -> Result<u64, Error> {
        match self {
            SampleCount::InRange(actual) => Ok(actual),
            SampleCount::OutOfRange { actual, expected } => Err(Violation::SampleCount {
                actual,
                low: *expected.start(),
                high: *expected.end(),
            }
            .into()),
            SampleCount::QueryFailed(err) => Err(err.into()),
        }
    }
}

/// Sum the sample counts of `datapoints`
///
/// Missing, negative or non-finite counts contribute nothing.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sum_sample_counts(datapoints: &[Datapoint]) -> u64 {
    datapoints
        .iter()
        .filter_map(|datapoint| datapoint.sample_count)
        .filter(|count| count.is_finite() && *count > 0.0)
        .fold(0_u64, |acc, count| acc.saturating_add(count.round() as u64))
}

/// Check the summed sample count of `datapoints` against `expected`
#[must_use]
pub fn check_sample_count(datapoints: &[Datapoint], expected: RangeInclusive<u64>) -> SampleCount {
    let actual = sum_sample_counts(datapoints);
    if expected.contains(&actual) {
        SampleCount::InRange(actual)
    } else {
        SampleCount::OutOfRange { actual, expected }
    }
}

/// Require that at least one recently active series matches `filters`
///
/// This validates existence only, not values.
///
/// # Errors
///
/// Returns [`Error::Fetch`] if the listing fails and
/// [`Violation::NoSeries`] if nothing matched.
pub async fn validate_metric_presence(
    fetcher: &MetricValueFetcher<'_>,
    identity: &MetricIdentity,
    filters: &[DimensionFilter],
) -> Result<(), Error> {
    let series = fetcher.list(identity, filters).await?;
    if series.is_empty() {
        let filters: Vec<String> = filters.iter().map(ToString::to_string).collect();
        info!(
            namespace = identity.namespace(),
            metric = identity.name(),
            ?filters,
            "no metrics found"
        );
    }
    check_presence(&series)?;
    Ok(())
}

/// Require that no recently active series matches `filters`
///
/// # Errors
///
/// Returns [`Error::Fetch`] if the listing fails and
/// [`Violation::UnexpectedSeries`] if anything matched.
pub async fn validate_metric_absence(
    fetcher: &MetricValueFetcher<'_>,
    identity: &MetricIdentity,
    filters: &[DimensionFilter],
) -> Result<(), Error> {
    let series = fetcher.list(identity, filters).await?;
    for found in &series {
        let dimensions: Vec<String> = found.dimensions.iter().map(ToString::to_string).collect();
        info!(
            namespace = identity.namespace(),
            metric = identity.name(),
            ?dimensions,
            "unexpected metric series"
        );
    }
    check_no_series(&series)?;
    Ok(())
}

/// Sum the sample counts of one series over `window` and compare to
/// `expected`
pub async fn validate_sample_count(
    fetcher: &MetricValueFetcher<'_>,
    identity: &MetricIdentity,
    dimensions: &[Dimension],
    window: &QueryWindow,
    expected: RangeInclusive<u64>,
) -> SampleCount {
    let datapoints = match fetcher
        .fetch_datapoints(identity, dimensions, window, &[Statistic::SampleCount])
        .await
    {
        Ok(datapoints) => datapoints,
        Err(err) => return SampleCount::QueryFailed(err),
    };

    let outcome = check_sample_count(&datapoints, expected);
    info!(
        metric = identity.name(),
        period_seconds = window.period_seconds(),
        ?outcome,
        "sample count check"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use proptest::prelude::*;

    use super::*;
    use crate::{
        config, retry,
        test::{FakeBackend, permanent_error, sample_counts, series},
    };

    #[test]
    fn sample_count_within_bounds() {
        let datapoints = sample_counts(&[3.0, 4.0, 5.0]);
        assert_eq!(
            check_sample_count(&datapoints, 10..=15),
            SampleCount::InRange(12)
        );
        assert_eq!(
            check_sample_count(&datapoints, 13..=20),
            SampleCount::OutOfRange {
                actual: 12,
                expected: 13..=20
            }
        );
    }

    #[test]
    fn sample_count_bounds_are_inclusive() {
        let datapoints = sample_counts(&[3.0, 4.0, 5.0]);
        assert!(check_sample_count(&datapoints, 12..=12).is_in_range());
        assert!(check_sample_count(&datapoints, 0..=12).is_in_range());
        assert!(!check_sample_count(&datapoints, 0..=11).is_in_range());
    }

    #[test]
    fn bad_sample_counts_contribute_nothing() {
        let datapoints = sample_counts(&[-4.0, f64::NAN, f64::INFINITY, 2.0]);
        assert_eq!(sum_sample_counts(&datapoints), 2);
        assert_eq!(sum_sample_counts(&[]), 0);
    }

    #[test]
    fn negative_values_fail() {
        assert_eq!(
            all_non_negative(&[0.0, 1.5, -0.01]),
            Err(Violation::Negative {
                index: 2,
                value: -0.01
            })
        );
        assert_eq!(all_non_negative(&[0.0, 1.5, 2.0]), Ok(()));
    }

    #[test]
    fn empty_series_differs_between_checks() {
        assert_eq!(all_non_negative(&[]), Ok(()));
        assert_eq!(non_empty_non_negative(&[]), Err(Violation::NoValues));
        assert_eq!(non_empty_non_negative(&[0.0]), Ok(()));
    }

    #[test]
    fn absence_and_presence() {
        assert_eq!(check_absence(&[]), Ok(()));
        assert_eq!(
            check_absence(&[1.0, 2.0]),
            Err(Violation::UnexpectedValues { count: 2 })
        );
        assert_eq!(check_presence(&[]), Err(Violation::NoSeries));
        assert_eq!(check_presence(&[series("ns", "cpu", Vec::new())]), Ok(()));
        assert_eq!(check_no_series(&[]), Ok(()));
        assert_eq!(
            check_no_series(&[series("ns", "cpu", Vec::new())]),
            Err(Violation::UnexpectedSeries { count: 1 })
        );
    }

    #[test]
    fn out_of_range_converts_to_violation() {
        let outcome = SampleCount::OutOfRange {
            actual: 1,
            expected: 2..=4,
        };
        assert_eq!(
            outcome.into_result(),
            Err(Error::Violation(Violation::SampleCount {
                actual: 1,
                low: 2,
                high: 4
            }))
        );
    }

    #[tokio::test]
    async fn presence_fails_on_zero_series_whatever_the_filters() {
        let backend = FakeBackend::default();
        let fetcher =
            MetricValueFetcher::new(&backend, &config::Query::default(), retry::Config::default());
        let identity = MetricIdentity::new("ns", "cpu");
        for filters in [
            Vec::new(),
            vec![DimensionFilter::any("host")],
            vec![DimensionFilter::exact("InstanceId", "i-0123")],
        ] {
            assert_eq!(
                validate_metric_presence(&fetcher, &identity, &filters).await,
                Err(Error::Violation(Violation::NoSeries))
            );
        }
    }

    #[tokio::test]
    async fn presence_listing_failure_is_fetch_error() {
        let backend = FakeBackend::default();
        backend.push_list_error(permanent_error());
        let fetcher =
            MetricValueFetcher::new(&backend, &config::Query::default(), retry::Config::default());
        let identity = MetricIdentity::new("ns", "cpu");

        let res = validate_metric_presence(&fetcher, &identity, &[]).await;
        assert!(matches!(res, Err(Error::Fetch(fetch::Error::Query { .. }))));
        assert_eq!(backend.list_requests().len(), 1);
    }

    #[tokio::test]
    async fn absence_fails_on_any_series() {
        let backend = FakeBackend::default();
        let fetcher =
            MetricValueFetcher::new(&backend, &config::Query::default(), retry::Config::default());
        let identity = MetricIdentity::new("ns", "cpu");
        let filters = [DimensionFilter::any("host")];

        assert_eq!(
            validate_metric_absence(&fetcher, &identity, &filters).await,
            Ok(())
        );

        backend.push_series(vec![series("ns", "cpu", Vec::new())]);
        assert_eq!(
            validate_metric_absence(&fetcher, &identity, &filters).await,
            Err(Error::Violation(Violation::UnexpectedSeries { count: 1 }))
        );

        backend.push_list_error(permanent_error());
        assert!(matches!(
            validate_metric_absence(&fetcher, &identity, &filters).await,
            Err(Error::Fetch(_))
        ));
    }

    #[tokio::test]
    async fn sample_count_query_failure_is_distinct() {
        let backend = FakeBackend::default();
        backend.push_statistics_error(permanent_error());
        let fetcher =
            MetricValueFetcher::new(&backend, &config::Query::default(), retry::Config::default());
        let identity = MetricIdentity::new("ns", "mem_used_percent");
        let window = QueryWindow::trailing(
            SystemTime::now(),
            Duration::from_secs(180),
            Duration::from_secs(60),
        )
        .expect("window");

        let outcome = validate_sample_count(&fetcher, &identity, &[], &window, 2..=4).await;
        assert!(matches!(outcome, SampleCount::QueryFailed(_)));

        backend.push_datapoints(sample_counts(&[1.0, 1.0, 1.0]));
        let outcome = validate_sample_count(&fetcher, &identity, &[], &window, 2..=4).await;
        assert_eq!(outcome, SampleCount::InRange(3));
        assert_eq!(
            backend.statistics_requests()[1].statistics,
            vec![Statistic::SampleCount]
        );
    }

    proptest! {
        #[test]
        fn sum_matches_integer_counts(counts in prop::collection::vec(0_u32..10_000, 0..50)) {
            let as_f64: Vec<f64> = counts.iter().map(|c| f64::from(*c)).collect();
            let expected: u64 = counts.iter().map(|c| u64::from(*c)).sum();
            prop_assert_eq!(sum_sample_counts(&sample_counts(&as_f64)), expected);
        }
    }
}
