use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

/// Installs the global subscriber. Filtering follows `RUST_LOG` and falls
/// back to `info`. Returns `false` when a subscriber was already installed,
/// so it can be called from every test.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    Registry::default()
        .with(filter)
        .with(stdout_layer)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        assert!(!init());
    }
}
