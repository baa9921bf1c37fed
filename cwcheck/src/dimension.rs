//! Dimensions and dimension filters
//!
//! A [`Dimension`] is a concrete name/value pair attached to a metric series.
//! A [`DimensionFilter`] narrows a listing query and may leave its value
//! open, matching any value for that name.
//!
//! Sets of either submitted to the backend may carry at most one entry per
//! dimension name. This module also builds the synthetic, near-maximum filter
//! lists used to exercise the backend's dimension cardinality limit.

use std::fmt;

use rustc_hash::FxHashSet;

pub mod factory;

/// Dimension name carrying the EC2 instance id
pub const INSTANCE_ID: &str = "InstanceId";
/// Dimension name carrying the EC2 image id
pub const IMAGE_ID: &str = "ImageId";
/// Dimension name carrying the EC2 instance type
pub const INSTANCE_TYPE: &str = "InstanceType";
/// Dimension name carrying the agent host name
pub const HOST: &str = "host";

/// The largest number of dimensions the backend accepts on one metric
pub const MAX_DIMENSIONS: usize = 30;

/// Name prefix of the synthetic appended dimensions
pub const APPEND_PREFIX: &str = "append";

/// Value stem of the synthetic appended dimensions
pub const LOREM_IPSUM: &str = "Lorem ipsum dolor sit amet consectetur adipiscing elit Vivamus non mauris malesuada mattis ex eget porttitor purus Suspendisse potenti Praesent vel sollicitudin ipsum Quisque luctus pretium lorem non faucibus Ut vel quam dui Nunc fermentum condimentum consectetur Morbi tellus mauris tristique tincidunt elit consectetur hendrerit placerat dui In nulla erat finibus eget erat a hendrerit sodales urna In sapien purus auctor sit amet congue ut congue eget nisi Vivamus sed neque ut ligula lobortis accumsan quis id metus In feugiat velit et leo mattis non fringilla dui elementum Proin a nisi ac sapien vulputate consequat Vestibulum eu tellus mi Integer consectetur efficitur";

/// Errors produced while constructing dimension sets
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested filter count is outside `1..=MAX_DIMENSIONS`
    #[error("filter count must be within 1..={max}, got {requested}")]
    InvalidArgument {
        /// The count asked for
        requested: usize,
        /// The largest count allowed
        max: usize,
    },
    /// A dimension name appears more than once in a set
    #[error("dimension {0} appears more than once")]
    DuplicateDimension(String),
}

/// A resolved, concrete dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dimension {
    name: String,
    value: String,
}

impl Dimension {
    /// Create a new [`Dimension`]
    #[must_use]
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The dimension name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The dimension value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// The value side of a [`DimensionFilter`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    /// Match exactly this value
    Exact(String),
    /// Match any value for the dimension name
    Any,
}

/// A name/value pair narrowing a listing query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimensionFilter {
    name: String,
    value: FilterValue,
}

impl DimensionFilter {
    /// A filter matching `name` with exactly `value`
    #[must_use]
    pub fn exact<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            value: FilterValue::Exact(value.into()),
        }
    }

    /// A filter matching `name` with any value
    #[must_use]
    pub fn any<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            value: FilterValue::Any,
        }
    }

    /// The dimension name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value to match
    #[must_use]
    pub fn value(&self) -> &FilterValue {
        &self.value
    }
}

impl From<&Dimension> for DimensionFilter {
    fn from(dimension: &Dimension) -> Self {
        Self::exact(dimension.name(), dimension.value())
    }
}

impl fmt::Display for DimensionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FilterValue::Exact(value) => write!(f, "{}={}", self.name, value),
            FilterValue::Any => write!(f, "{}=*", self.name),
        }
    }
}

/// Check that every name in `names` is unique
///
/// # Errors
///
/// Returns [`Error::DuplicateDimension`] naming the first repeated name.
pub fn ensure_unique<'a, I>(names: I) -> Result<(), Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = FxHashSet::default();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::DuplicateDimension(name.to_string()));
        }
    }
    Ok(())
}

/// Build `count` filters, the last of which selects `instance_id`
///
/// Positions `0..count-1` hold synthetic filters named `append<i>` whose
/// value is the long lorem ipsum stem followed by `append<i>`. The final
/// position is `InstanceId=<instance_id>`, keeping the set resolvable to a
/// real host. For a `count` of 10 that is `append0..=append8` plus the
/// instance id.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if `count` is zero or exceeds
/// [`MAX_DIMENSIONS`].
pub fn build_filter_list(count: usize, instance_id: &str) -> Result<Vec<DimensionFilter>, Error> {
    if count == 0 || count > MAX_DIMENSIONS {
        return Err(Error::InvalidArgument {
            requested: count,
            max: MAX_DIMENSIONS,
        });
    }

    let mut filters: Vec<DimensionFilter> = (0..count - 1)
        .map(|i| {
            DimensionFilter::exact(
                format!("{APPEND_PREFIX}{i}"),
                format!("{LOREM_IPSUM}{APPEND_PREFIX}{i}"),
            )
        })
        .collect();
    filters.push(DimensionFilter::exact(INSTANCE_ID, instance_id));
    Ok(filters)
}
