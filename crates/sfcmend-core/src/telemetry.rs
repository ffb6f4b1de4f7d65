//! Tracing initialisation for sfcmend binaries.
//!
//! Log lines go to stderr so `--summary-json` output on stdout stays
//! machine-readable. Without `RUST_LOG`, the requested level applies to the
//! sfcmend crates only; HTTP and runtime dependencies stay at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const WORKSPACE_TARGETS: [&str; 4] = ["sfcmend", "sfcmend_core", "sfc_model", "oracle_gateway"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str().to_lowercase())),
    );
    directives.join(",")
}

/// Install the global subscriber. Only the first call takes effect.
///
/// JSON lines carry the enclosing session span (pair and oracle), so
/// interleaved sessions can be told apart downstream.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
