use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single lines for terminals.
    Compact,
    /// Line-delimited JSON for batch schedulers.
    Json,
}

/// Default directives when `RUST_LOG` is unset. Verbose mode lowers this
/// crate to `debug` so skipped files and per-group timings show up;
/// otherwise a configured level applies to this crate.
pub fn default_directives(verbose: bool, level: Option<&str>) -> String {
    match (verbose, level) {
        (true, _) => "popgrid_etl=debug,info".to_string(),
        (false, Some(level)) => format!("popgrid_etl={}", level.trim().to_ascii_lowercase()),
        (false, None) => "popgrid_etl=info".to_string(),
    }
}

pub fn init_logger(verbose: bool, format: LogFormat, level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbose, level)))
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose, None)));

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Compact => registry.with(layer.compact()).init(),
        LogFormat::Json => registry.with(layer.json()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        for verbose in [false, true] {
            assert!(default_directives(verbose, None).parse::<EnvFilter>().is_ok());
        }
        assert!(default_directives(true, None).contains("debug"));
    }

    #[test]
    fn test_configured_level_applies_unless_verbose() {
        assert_eq!(default_directives(false, Some("WARN")), "popgrid_etl=warn");
        assert!(default_directives(false, Some("warn")).parse::<EnvFilter>().is_ok());
        assert_eq!(default_directives(true, Some("warn")), "popgrid_etl=debug,info");
    }
}
