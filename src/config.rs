// src/config.rs
//! Registry tuning knobs.

use std::time::Duration;

pub const ENV_WAIT_TIMEOUT_MS: &str = "LAZYBIND_WAIT_TIMEOUT_MS";
pub const ENV_RESOLVE_PARENTS: &str = "LAZYBIND_RESOLVE_PARENTS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Upper bound on how long a caller waits for someone else's resolution.
    /// `None` waits forever. The resolution itself is never interrupted.
    pub wait_timeout: Option<Duration>,
    /// Resolve registered ancestors (`a`, `a.b`) before resolving `a.b.c`.
    pub resolve_parents: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            wait_timeout: None,
            resolve_parents: true,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn resolve_parents(mut self, enabled: bool) -> Self {
        self.resolve_parents = enabled;
        self
    }

    /// Defaults overridden by `LAZYBIND_WAIT_TIMEOUT_MS` and `LAZYBIND_RESOLVE_PARENTS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_WAIT_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.wait_timeout = None,
                Ok(ms) => config.wait_timeout = Some(Duration::from_millis(ms)),
                Err(_) => {
                    tracing::warn!(key = ENV_WAIT_TIMEOUT_MS, value = %raw, "ignoring unparsable wait timeout");
                }
            }
        }

        if let Some(raw) = lookup(ENV_RESOLVE_PARENTS) {
            let raw = raw.trim().to_ascii_lowercase();
            config.resolve_parents = !matches!(raw.as_str(), "0" | "false" | "no" | "off");
        }

        config
    }
}
