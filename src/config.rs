//! Configuration options for the TableFilter membership index.

use std::time::Duration;

/// Keyspaces that are never indexed. Internal bookkeeping tables are
/// written constantly and never queried through the filter path.
pub const DEFAULT_SYSTEM_KEYSPACES: &[&str] = &[
    "system",
    "system_distributed",
    "system_schema",
    "system_auth",
    "system_traces",
];

/// Configuration options for opening a filter service.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the data directory if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Expected number of keys per table filter.
    /// Default: 1000
    pub filter_capacity: usize,

    /// Target false positive rate per table filter.
    /// Default: 0.01 (1%)
    pub false_positive_rate: f64,

    /// Maximum eviction attempts before an insert is reported as overflow.
    /// Default: 500
    pub max_kicks: usize,

    /// Interval between background persistence flushes.
    /// Default: 10 seconds
    pub flush_interval: Duration,

    /// Keyspace names excluded from filter indexing.
    /// Default: the standard system keyspaces
    pub system_keyspaces: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            filter_capacity: 1000,
            false_positive_rate: 0.01,
            max_kicks: 500,
            flush_interval: Duration::from_secs(10),
            system_keyspaces: DEFAULT_SYSTEM_KEYSPACES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the data directory if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the expected number of keys per table filter.
    pub fn filter_capacity(mut self, capacity: usize) -> Self {
        self.filter_capacity = capacity;
        self
    }

    /// Sets the target false positive rate.
    pub fn false_positive_rate(mut self, rate: f64) -> Self {
        self.false_positive_rate = rate;
        self
    }

    /// Sets the eviction attempt bound.
    pub fn max_kicks(mut self, kicks: usize) -> Self {
        self.max_kicks = kicks;
        self
    }

    /// Sets the background flush interval.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Replaces the system keyspace exclusion list.
    pub fn system_keyspaces(mut self, keyspaces: Vec<String>) -> Self {
        self.system_keyspaces = keyspaces;
        self
    }

    /// Returns true if the given keyspace is excluded from indexing.
    pub fn is_system_keyspace(&self, keyspace: &str) -> bool {
        self.system_keyspaces.iter().any(|ks| ks == keyspace)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.filter_capacity == 0 {
            return Err(crate::Error::invalid_argument("filter_capacity must be > 0"));
        }
        if !self.false_positive_rate.is_finite()
            || self.false_positive_rate <= 0.0
            || self.false_positive_rate >= 1.0
        {
            return Err(crate::Error::invalid_argument(
                "false_positive_rate must be between 0 and 1",
            ));
        }
        if self.max_kicks == 0 {
            return Err(crate::Error::invalid_argument("max_kicks must be > 0"));
        }
        if self.flush_interval.is_zero() {
            return Err(crate::Error::invalid_argument("flush_interval must be > 0"));
        }
        Ok(())
    }
}
