//! Builders to assemble a scheduler and reporter from configuration.

pub mod runner_builder;

pub use runner_builder::Runner;
