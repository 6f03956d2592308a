// Tracing initialization for the CLI. Logs go to stderr so stdout carries
// only console events.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init_tracing(level: &str, debug: bool) {
    // Prefer RUST_LOG from env, otherwise use the configured level.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(fallback_directives(level, debug)));

    let _ = tracing_subscriber::registry()
        .with(base_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn fallback_directives(level: &str, debug: bool) -> String {
    if debug {
        format!("{level},sandcastle=debug")
    } else {
        level.to_string()
    }
}
