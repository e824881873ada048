//! Runtime adapters for callers living inside an async runtime.

#[cfg(feature = "tokio-runtime")]
pub mod tokio_join;

#[cfg(feature = "tokio-runtime")]
pub use tokio_join::join_async;
