//! Error types for the statistics engine
//!
//! Configuration problems are reported eagerly: a collision, an unparsable
//! threshold or an invalid slice length fails the call that introduced it,
//! never a later ingestion.

use thiserror::Error;

/// Errors raised while configuring or reconfiguring a collector
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("an exposed attribute set is already registered under '{identity}' (collision policy: error)")]
    Collision { identity: String },

    #[error("invalid tag name {0:?}: tag names must be non-empty and must not contain '(' ')' or ','")]
    InvalidTagName(String),

    #[error("invalid threshold expression {expr:?}: {reason}")]
    InvalidThreshold { expr: String, reason: String },

    #[error("slice length must be at least 1ms, got {0}ms")]
    InvalidSliceLength(u64),

    #[error("notification capacity must be > 0")]
    ZeroNotificationCapacity,

    #[error("unknown collision policy {0:?}, expected one of: error, replace, ignore")]
    UnknownCollisionPolicy(String),

    #[error("failed to read configuration: {0}")]
    Io(String),

    #[error("failed to parse configuration: {0}")]
    Toml(String),
}

/// Errors surfaced by the management interface
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManagementError {
    #[error("attribute not found: {0}")]
    AttributeNotFound(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// A line that does not carry a stopwatch record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("not a stopwatch record: {0:?}")]
pub struct ParseError(pub String);

pub type Result<T> = std::result::Result<T, ConfigurationError>;
