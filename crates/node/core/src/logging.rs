//! Logging setup for the ember node.

use crate::args::LogArgs;
use eyre::{Result, eyre};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber.
///
/// The filter is built with the following precedence:
/// 1. `--quiet` shows errors only and ignores everything else
/// 2. `RUST_LOG` if set, otherwise the level implied by `-v`
/// 3. directives from `--log.filter`, added on top
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let filter = build_filter(args);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if args.json {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    result.map_err(|err| eyre!("failed to install logger: {err}"))
}

fn build_filter(args: &LogArgs) -> EnvFilter {
    if args.quiet {
        return EnvFilter::new(args.level());
    }

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.level()));
    if let Some(directives) = &args.filter {
        for directive in directives.split(',').filter(|d| !d.is_empty()) {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(LogArgs::default().level(), "info");
        assert_eq!(LogArgs { verbosity: 1, ..Default::default() }.level(), "debug");
        assert_eq!(LogArgs { verbosity: 3, ..Default::default() }.level(), "trace");
        assert_eq!(LogArgs { quiet: true, verbosity: 2, ..Default::default() }.level(), "error");
    }

    #[test]
    fn test_quiet_ignores_directives() {
        let args = LogArgs {
            quiet: true,
            filter: Some("ember_node_server=trace".into()),
            ..Default::default()
        };
        assert_eq!(build_filter(&args).to_string(), "error");
    }
}
