//! Configuration models for the scheduler and reporter.

pub mod runner;

pub use runner::{RunnerConfig, ENV_PREFIX};
