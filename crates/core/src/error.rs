//! Error taxonomy for wheel automation.
//!
//! Every collaborator boundary returns [`WheelResult`]. The engine decides
//! what to do with each kind:
//!
//! - [`WheelError::Configuration`] is fatal at startup.
//! - [`WheelError::External`] and [`WheelError::Timeout`] are transient: the
//!   symbol is skipped for this tick and retried on the next one.
//! - [`WheelError::StateCorruption`] is recovered by quarantining the state
//!   document and starting fresh.
//! - [`WheelError::Persistence`] means the state document could not be
//!   written; the in-memory position is not advanced.
//! - [`WheelError::InvariantViolation`] is only ever logged.

use std::fmt;

use thiserror::Error;

/// The external system a failed call was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collaborator {
    Broker,
    MarketData,
    Notifier,
    Pricing,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker => write!(f, "broker"),
            Self::MarketData => write!(f, "market data"),
            Self::Notifier => write!(f, "notifier"),
            Self::Pricing => write!(f, "pricing"),
        }
    }
}

/// Errors produced anywhere in the wheel automation stack.
#[derive(Debug, Error)]
pub enum WheelError {
    /// Bad settings. Halts the process before the scheduler starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A collaborator call failed.
    #[error("{collaborator} error: {message}")]
    External {
        /// Which collaborator failed.
        collaborator: Collaborator,
        /// Failure description (never contains credentials).
        message: String,
    },

    /// A collaborator call did not complete in time.
    #[error("{collaborator} call timed out after {secs}s")]
    Timeout {
        /// Which collaborator stalled.
        collaborator: Collaborator,
        /// The timeout that elapsed.
        secs: u64,
    },

    /// The persisted state document could not be parsed.
    #[error("state document corrupt: {0}")]
    StateCorruption(String),

    /// The persisted state document could not be written.
    #[error("state persistence failed: {0}")]
    Persistence(String),

    /// A position broke one of its structural invariants.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl WheelError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a broker failure.
    pub fn broker(message: impl Into<String>) -> Self {
        Self::External {
            collaborator: Collaborator::Broker,
            message: message.into(),
        }
    }

    /// Creates a market-data failure.
    pub fn market_data(message: impl Into<String>) -> Self {
        Self::External {
            collaborator: Collaborator::MarketData,
            message: message.into(),
        }
    }

    /// Creates a notifier failure.
    pub fn notifier(message: impl Into<String>) -> Self {
        Self::External {
            collaborator: Collaborator::Notifier,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(collaborator: Collaborator, secs: u64) -> Self {
        Self::Timeout { collaborator, secs }
    }

    /// Returns true if retrying on the next tick may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::External { .. } | Self::Timeout { .. } | Self::Persistence(_)
        )
    }

    /// Returns the collaborator involved, if any.
    #[must_use]
    pub fn collaborator(&self) -> Option<Collaborator> {
        match self {
            Self::External { collaborator, .. } | Self::Timeout { collaborator, .. } => {
                Some(*collaborator)
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for WheelError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for WheelError {
    fn from(err: serde_json::Error) -> Self {
        Self::StateCorruption(err.to_string())
    }
}

impl From<figment::Error> for WheelError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result type alias for wheel operations.
pub type WheelResult<T> = std::result::Result<T, WheelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_errors_are_transient() {
        assert!(WheelError::broker("connection reset").is_transient());
        assert!(WheelError::market_data("503").is_transient());
        assert!(WheelError::timeout(Collaborator::Broker, 30).is_transient());
    }

    #[test]
    fn configuration_and_corruption_are_not_transient() {
        assert!(!WheelError::config("min_dte > max_dte").is_transient());
        assert!(!WheelError::StateCorruption("eof".into()).is_transient());
        assert!(!WheelError::InvariantViolation("call without shares".into()).is_transient());
    }

    #[test]
    fn display_names_the_collaborator() {
        let err = WheelError::timeout(Collaborator::MarketData, 15);
        assert_eq!(err.to_string(), "market data call timed out after 15s");
        assert_eq!(err.collaborator(), Some(Collaborator::MarketData));

        let err = WheelError::broker("order rejected");
        assert!(err.to_string().contains("broker"));
        assert!(err.to_string().contains("order rejected"));
    }

    #[test]
    fn io_errors_become_persistence_failures() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let err: WheelError = io.into();
        assert!(matches!(err, WheelError::Persistence(_)));
    }
}
