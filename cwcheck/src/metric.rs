//! The metric data model shared by the backend, fetcher and validators.

use std::time::{Duration, SystemTime};

use crate::dimension::Dimension;

/// Errors produced when constructing a [`QueryWindow`]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The window end is not strictly after its start
    #[error("query window end must be strictly after its start")]
    EmptyWindow,
    /// The window reaches before the UNIX epoch
    #[error("query window start precedes the UNIX epoch")]
    BeforeEpoch,
    /// The aggregation period is zero or does not fit the backend's range
    #[error("aggregation period of {0:?} is not a whole number of seconds in 1..=i32::MAX")]
    InvalidPeriod(Duration),
}

/// Identifies one metric stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricIdentity {
    namespace: String,
    name: String,
}

impl MetricIdentity {
    /// Create a new [`MetricIdentity`]
    #[must_use]
    pub fn new<N, M>(namespace: N, name: M) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The namespace holding the metric
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The metric name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Aggregation functions the backend can compute over one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    /// Mean of the observations
    Average,
    /// Sum of the observations
    Sum,
    /// Number of observations
    SampleCount,
    /// Smallest observation
    Minimum,
    /// Largest observation
    Maximum,
}

/// One aggregation bucket returned by the backend
///
/// Only the statistics that were requested are populated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datapoint {
    /// Start of the aggregation period
    pub timestamp: SystemTime,
    /// Number of observations in the period
    pub sample_count: Option<f64>,
    /// Mean of the observations in the period
    pub average: Option<f64>,
    /// Sum of the observations in the period
    pub sum: Option<f64>,
    /// Smallest observation in the period
    pub minimum: Option<f64>,
    /// Largest observation in the period
    pub maximum: Option<f64>,
}

impl Datapoint {
    /// A datapoint at `timestamp` with no statistics populated
    #[must_use]
    pub fn at(timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            sample_count: None,
            average: None,
            sum: None,
            minimum: None,
            maximum: None,
        }
    }

    /// The value of `statistic` in this datapoint, if it was returned
    #[must_use]
    pub fn value(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Average => self.average,
            Statistic::Sum => self.sum,
            Statistic::SampleCount => self.sample_count,
            Statistic::Minimum => self.minimum,
            Statistic::Maximum => self.maximum,
        }
    }
}

/// One metric series as reported by a listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSeries {
    /// Namespace of the series
    pub namespace: String,
    /// Metric name of the series
    pub name: String,
    /// The full dimension set identifying the series
    pub dimensions: Vec<Dimension>,
}

/// The aggregation window and granularity of a statistics query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    start: SystemTime,
    end: SystemTime,
    period: Duration,
}

impl QueryWindow {
    /// Create a new [`QueryWindow`]
    ///
    /// # Errors
    ///
    /// Returns an error if `end` is not strictly after `start` or if `period`
    /// is not a whole, non-zero number of seconds that fits in an `i32`.
    pub fn new(start: SystemTime, end: SystemTime, period: Duration) -> Result<Self, Error> {
        if end <= start {
            return Err(Error::EmptyWindow);
        }
        if period.subsec_nanos() != 0
            || period.as_secs() == 0
            || period.as_secs() > u64::from(i32::MAX.unsigned_abs())
        {
            return Err(Error::InvalidPeriod(period));
        }
        Ok(Self { start, end, period })
    }

    /// A window of length `span` ending at `end`
    ///
    /// # Errors
    ///
    /// See [`QueryWindow::new`]. Additionally errors if the window would
    /// start before the UNIX epoch.
    pub fn trailing(end: SystemTime, span: Duration, period: Duration) -> Result<Self, Error> {
        let start = end
            .checked_sub(span)
            .filter(|start| *start >= SystemTime::UNIX_EPOCH)
            .ok_or(Error::BeforeEpoch)?;
        Self::new(start, end, period)
    }

    /// Inclusive start of the window
    #[must_use]
    pub fn start(&self) -> SystemTime {
        self.start
    }

    /// Exclusive end of the window
    #[must_use]
    pub fn end(&self) -> SystemTime {
        self.end
    }

    /// Aggregation granularity
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Aggregation granularity in whole seconds, as the backend expects it
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn period_seconds(&self) -> i32 {
        // bounded by the check in `new`
        self.period.as_secs() as i32
    }
}
