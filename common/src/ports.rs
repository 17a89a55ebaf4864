//! Boundaries between the core and the hardware-facing adapters.
//!
//! The dispatcher and the reducer call these traits; the controller binary
//! provides the implementations (serial actuator worker, bitmap display,
//! GPIO indicator) and tests provide recorders.

use crate::{
    error::ActuationError,
    types::{DisplaySnapshot, HvacCommand, SetpointKind, SystemMode},
};

/// Result of handing a command to the actuator. Delivery happens later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// A pending command of the same kind was replaced.
    Coalesced,
}

/// Write side towards the HVAC unit. Implementations must not block.
pub trait Actuator {
    fn submit(&self, command: HvacCommand) -> Result<Submission, ActuationError>;

    fn set_mode(&self, mode: SystemMode) -> Result<Submission, ActuationError> {
        self.submit(HvacCommand::SetMode(mode))
    }

    fn set_setpoint(&self, kind: SetpointKind, value: i16) -> Result<Submission, ActuationError> {
        self.submit(HvacCommand::setpoint(kind, value))
    }
}

/// Best-effort display output. Must return within a bounded time and swallow
/// its own failures.
pub trait Presenter {
    fn render(&self, snapshot: &DisplaySnapshot);
}

/// The "paired" output line.
pub trait IndicatorOutput {
    fn set_paired(&mut self, on: bool);
}
