//! Validation of agent-emitted metrics in CloudWatch.
//!
//! This library supports the cwcheck binary found elsewhere in this project.
//! A monitoring agent is run externally against a known configuration; the
//! runners here then query CloudWatch for the metrics that agent should have
//! published and assert on presence, dimensions, sample counts and values.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod backend;
pub mod client;
pub mod config;
pub mod dimension;
pub mod environment;
pub mod fetch;
pub mod metric;
pub mod retry;
pub mod runner;
pub mod validate;
