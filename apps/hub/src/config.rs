/// Hub configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Seconds a dropped participant's membership survives before the
    /// sweeper removes it.
    pub presence_grace_seconds: u64,
    /// Seconds between sweeper passes.
    pub sweep_interval_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables, with defaults suitable
    /// for local development.
    pub fn from_env() -> Self {
        Self {
            port: var_or("PORT", 4040),
            presence_grace_seconds: var_or("PRESENCE_GRACE_SECONDS", 60),
            sweep_interval_seconds: var_or("SWEEP_INTERVAL_SECONDS", 15),
        }
    }
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
