use anyhow::Result;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static SUBSCRIBER_GUARD: OnceLock<()> = OnceLock::new();

const DEFAULT_DIRECTIVES: &str = "greentext=info,greentext_core=info,xtask=info";

/// `RUST_LOG` when set, otherwise info for the greentext crates only.
pub fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber. Logs go to stderr so a streamed post on
/// stdout stays clean. Safe to call more than once.
pub fn init_tracing(filter: EnvFilter) -> Result<()> {
    if SUBSCRIBER_GUARD.get().is_some() {
        return Ok(());
    }

    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let subscriber = Registry::default().with(filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    SUBSCRIBER_GUARD.set(()).ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(EnvFilter::new("off")).expect("first init");
        init_tracing(EnvFilter::new("debug")).expect("second init");
    }
}
