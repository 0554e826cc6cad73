use std::time::Duration;

/// Settings for opening a [`LibsqlStore`](crate::LibsqlStore).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreConfig {
    /// Database file path. Empty means an in-memory database that disappears
    /// with the handle.
    pub path: String,
    /// Applied as `PRAGMA busy_timeout` on the store's connection.
    pub busy_timeout: Option<Duration>,
    /// Operations slower than this are logged at WARN.
    pub slow_threshold: Option<Duration>,
    /// Log `NotFound` outcomes as failures. Off by default: a missing row is an
    /// expected answer, not an incident.
    pub log_not_found: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    pub fn with_log_not_found(mut self, enabled: bool) -> Self {
        self.log_not_found = enabled;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        let p = self.path.trim();
        p.is_empty() || p == ":memory:"
    }

    /// The path handed to the driver.
    pub fn database_path(&self) -> &str {
        if self.is_in_memory() {
            ":memory:"
        } else {
            &self.path
        }
    }
}
