//! # Prometheus Group Runner
//!
//! A bounded-concurrency scheduler for independent, possibly nested units of
//! work ("groups") that report into a shared, concurrency-safe collector.
//!
//! Up to `max_concurrency` groups run at once on dedicated OS threads. Every
//! dispatch takes a slot from a lock-guarded [`core::CapacityState`]; every
//! worker gives its slot back and removes itself from the live set however its
//! group exits, panics included. [`core::GroupScheduler::wait_for_completion`]
//! is the join barrier: when it returns, every worker has terminated.
//!
//! ## Key Features
//!
//! - **Real gating**: dispatch blocks on a condvar while all slots are taken
//! - **Sequential default**: `max_concurrency = 1` runs groups inline, in order
//! - **Fault isolation**: a panicking group becomes an `Errored` outcome; the
//!   slot is still released and siblings keep running
//! - **Nested groups**: children share the same capacity pool and never wait
//!   on a slot, so a parent cannot deadlock on its own capacity
//! - **Fail-fast**: the reporter can ask the scheduler to stop dispatching
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prometheus_group_runner::builders::Runner;
//! use prometheus_group_runner::config::RunnerConfig;
//! use prometheus_group_runner::core::{FnGroup, Outcome, RunnableGroup};
//!
//! let runner = Runner::from_config(RunnerConfig::new().with_max_concurrency(4)).unwrap();
//!
//! let groups: Vec<Arc<dyn RunnableGroup>> = (0..8)
//!     .map(|i| Arc::new(FnGroup::new(format!("group-{i}"), |_| Outcome::Passed)) as Arc<dyn RunnableGroup>)
//!     .collect();
//!
//! let summary = runner.run_all(groups).unwrap();
//! assert_eq!(summary.passed, 8);
//! ```
//!
//! For complete scenarios, see `tests/scheduler_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and capacity accounting.
pub mod core;
/// Configuration models and validation.
pub mod config;
/// Builders to construct a runner from configuration.
pub mod builders;
/// Runtime adapters for async callers.
pub mod runtime;
/// Shared utilities.
pub mod util;
