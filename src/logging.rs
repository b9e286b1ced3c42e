use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AppError, Result};

/// Build the filter: `RUST_LOG` directives, on top of `level` as the default.
pub fn filter(level: &str) -> Result<EnvFilter> {
    let directive: Directive = level
        .parse()
        .map_err(|e| AppError::Config(format!("invalid log level {level:?}: {e}")))?;
    Ok(EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy())
}

/// Call **once** near the start of `main`. Output goes to stderr so it never
/// mixes with rendered rows on stdout.
pub fn init(level: &str) -> Result<()> {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter(level)?);

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("failed to install tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_levels_and_targets() {
        assert!(filter("warn").is_ok());
        assert!(filter("dotbrowse=debug").is_ok());
    }

    #[test]
    fn rejects_garbage_level() {
        let err = filter("dotbrowse=notalevel").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("notalevel"));
    }
}
