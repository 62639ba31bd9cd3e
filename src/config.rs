//! Collector configuration
//!
//! # Example cronometro.toml
//!
//! ```toml
//! identity = "billing:type=StatisticsExposing"
//! slice_length_ms = 30000
//! tag_names_to_expose = ["db.query", "http.get"]
//! collision = "replace"
//! notification_thresholds = "db.query(<200), http.getTPS(>1)"
//! notification_capacity = 256
//! overflow = "drop_newest"
//! create_rollup_statistics = true
//! ```

use crate::error::{ConfigurationError, Result};
use crate::notification::OverflowPolicy;
use crate::registry::{validate_tag, CollisionPolicy};
use crate::threshold::ThresholdEvaluator;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Identity used when none is configured
pub const DEFAULT_IDENTITY: &str = "cronometro:type=StatisticsExposing";

/// Everything a [`Collector`](crate::collector::Collector) is built from
///
/// # Example
/// ```
/// use cronometro::config::CollectorConfig;
///
/// let config = CollectorConfig::default();
/// assert_eq!(config.slice_length_ms, 1000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    /// Logical name the exposed attribute set is registered under
    pub identity: String,

    /// Window length in milliseconds
    ///
    /// Default: 1000
    pub slice_length_ms: u64,

    /// Tags whose statistics are exposed, activated at construction
    pub tag_names_to_expose: Vec<String>,

    /// What activation does when a set is already registered
    ///
    /// Default: error
    pub collision: CollisionPolicy,

    /// Threshold expression, e.g. `tag0(<1000), tag1Mean(<50)`
    ///
    /// Default: empty (no notifications)
    pub notification_thresholds: String,

    /// Queue capacity of each notification subscriber
    ///
    /// Default: 1024
    pub notification_capacity: usize,

    /// Which notification to drop when a subscriber queue is full
    ///
    /// Default: drop_oldest
    pub overflow: OverflowPolicy,

    /// Also update exposed parent tags of dotted tags (`a.b.c` → `a.b`, `a`)
    pub create_rollup_statistics: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            slice_length_ms: 1_000,
            tag_names_to_expose: Vec::new(),
            collision: CollisionPolicy::Error,
            notification_thresholds: String::new(),
            notification_capacity: 1_024,
            overflow: OverflowPolicy::DropOldest,
            create_rollup_statistics: false,
        }
    }
}

impl CollectorConfig {
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_slice_length_ms(mut self, slice_length_ms: u64) -> Self {
        self.slice_length_ms = slice_length_ms;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tag_names_to_expose = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_collision(mut self, collision: CollisionPolicy) -> Self {
        self.collision = collision;
        self
    }

    pub fn with_thresholds(mut self, expr: impl Into<String>) -> Self {
        self.notification_thresholds = expr.into();
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_rollup(mut self, enabled: bool) -> Self {
        self.create_rollup_statistics = enabled;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigurationError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, including the threshold expression
    pub fn validate(&self) -> Result<()> {
        if self.slice_length_ms == 0 {
            return Err(ConfigurationError::InvalidSliceLength(self.slice_length_ms));
        }

        if self.notification_capacity == 0 {
            return Err(ConfigurationError::ZeroNotificationCapacity);
        }

        for tag in &self.tag_names_to_expose {
            validate_tag(tag)?;
        }

        self.thresholds()?;
        Ok(())
    }

    /// The parsed threshold expression
    pub fn thresholds(&self) -> Result<ThresholdEvaluator> {
        ThresholdEvaluator::parse(&self.notification_thresholds)
    }
}
