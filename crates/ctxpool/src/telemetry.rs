//! Tracing subscriber setup for hosts embedding the pool.

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Modules that accept a `module=level` override in `CTXPOOL_LOG`.
const MODULES: &[&str] = &["pool", "call", "config", "entry"];

fn parse_level(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

/// Filter directives for a `CTXPOOL_LOG` value.
///
/// The value is a comma-separated list: a bare level sets the crate-wide
/// level, `module=level` overrides one module. Anything unrecognized is
/// skipped, since no subscriber exists yet to report it.
fn filter_directives(value: Option<&str>) -> String {
    let mut base = "info";
    let mut overrides = Vec::new();

    for part in value.unwrap_or_default().split(',').map(str::trim) {
        if part.is_empty() {
            continue;
        }
        match part.split_once('=') {
            Some((module, level)) => {
                let module = module.trim();
                if let Some(level) = parse_level(level)
                    && MODULES.contains(&module)
                {
                    overrides.push(format!("ctxpool::{module}={level}"));
                }
            }
            None => {
                if let Some(level) = parse_level(part) {
                    base = level;
                }
            }
        }
    }

    std::iter::once(format!("ctxpool={base}"))
        .chain(overrides)
        .collect::<Vec<_>>()
        .join(",")
}

fn env_filter() -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    let value = std::env::var("CTXPOOL_LOG").ok();
    EnvFilter::try_new(filter_directives(value.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new("ctxpool=info"))
}

/// Install a stderr subscriber for the pool's events.
///
/// `RUST_LOG` wins when set; otherwise `CTXPOOL_LOG` picks levels, e.g.
/// `CTXPOOL_LOG=warn,pool=trace`. `LOG_FORMAT=json` switches to JSON lines.
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let output = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        _ => fmt::layer().with_writer(std::io::stderr).boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(env_filter())
        .try_init()
        .is_ok()
}
