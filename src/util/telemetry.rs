//! Log output for scheduler runs.
//!
//! Worker threads are named `<thread_name_prefix>-<n>`, so thread names are
//! printed alongside each event to tell workers apart.

/// Install a `RUST_LOG`-filtered fmt subscriber with thread names, unless the
/// host application already set one. Safe to call more than once.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
