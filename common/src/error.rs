use thiserror::Error;

use crate::types::SetpointKind;

/// An attribute write that would break a thermostat invariant. The write is
/// vetoed and nothing is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{} setpoint {value} outside [{min}, {max}]", kind.as_str())]
    OutOfRange {
        kind: SetpointKind,
        value: i16,
        min: i16,
        max: i16,
    },

    #[error("heating setpoint {heating} + dead band {dead_band} exceeds cooling setpoint {cooling}")]
    DeadBand {
        heating: i16,
        cooling: i16,
        dead_band: i16,
    },

    #[error("unsupported system mode {0}")]
    UnsupportedMode(u8),

    #[error("attribute {attribute:#06x} expects {expected}, got {actual}")]
    TypeMismatch {
        attribute: u32,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Failure reported by the HVAC link for one command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuationError {
    #[error("no acknowledgment within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("command not acknowledged by unit")]
    NotAcknowledged,

    #[error("serial link down")]
    LinkDown,
}

/// Display failures. Logged by the presenter, never returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("flush exceeded {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },

    #[error("display surface error: {0}")]
    Surface(String),
}
