use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "REGISTRO_LOG";

/// `REGISTRO_LOG` wins over the configured level. Safe to call more than once.
pub fn init(configured_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(configured_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
