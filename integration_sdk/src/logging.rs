use tracing::Level;

/// Installs the global subscriber. Stdout carries the JSON document, so logs
/// go to stderr.
pub fn init(verbose: bool) {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
