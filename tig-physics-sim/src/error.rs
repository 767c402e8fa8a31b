//! Error type for the simulation boundary.
//!
//! Numeric edge cases inside a tick are handled by guards and clamps. Errors
//! only surface where outside input enters the engine.

use thiserror::Error;

/// Errors raised when configuring or driving a simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("non-finite {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },
    #[error("particle {index} is invalid ({reason}), particle count {count}")]
    InvalidParticle {
        index: usize,
        count: usize,
        reason: &'static str,
    },
    #[error("simulation worker is no longer running")]
    WorkerDisconnected,
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Reject NaN and infinities at the boundary.
pub(crate) fn ensure_finite(what: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        log::warn!("rejecting non-finite {what}: {value}");
        Err(SimError::NonFinite { what, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_values_pass_through() {
        assert_eq!(ensure_finite("intensity", 0.25), Ok(0.25));
    }

    #[test]
    fn nan_and_infinity_rejected() {
        assert!(matches!(
            ensure_finite("intensity", f64::NAN),
            Err(SimError::NonFinite { what: "intensity", .. })
        ));
        assert!(ensure_finite("intensity", f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn messages_name_the_field() {
        let err = SimError::InvalidConfig("width must be positive");
        assert_eq!(err.to_string(), "invalid configuration: width must be positive");
    }
}
