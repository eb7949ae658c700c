// ABOUTME: Shared logging setup for botfleet binaries
// ABOUTME: init() for tools, init_for() for the long-running fleet service

use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
/// Used by one-shot CLI commands.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr. Default: INFO for the named crates, WARN for everything else.
///
/// The service passes both its own crate and `botfleet_core` so supervisor
/// lifecycle events stay visible while teloxide and sqlx chatter is muted.
pub fn init_for(crate_names: &[&str]) {
    let filter = crate_names
        .iter()
        .fold(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
            |filter, name| filter.add_directive(directive_for(name)),
        );

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn directive_for(crate_name: &str) -> tracing_subscriber::filter::Directive {
    format!("{crate_name}=info")
        .parse()
        .unwrap_or_else(|_| tracing::Level::INFO.into())
}
