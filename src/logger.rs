use slog::{Drain, Logger};

/// Terminal logger behind an async drain, the sink used when the caller does
/// not bring its own.
pub fn default_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Logger::root(drain, o!())
}

/// Drops every record, for pools whose owner does not want any output.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
