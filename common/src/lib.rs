pub mod config;
pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod ports;
pub mod reducer;
pub mod store;
pub mod thermostat;
pub mod topics;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{
    ActuatorConfig, DisplayConfig, HardwareConfig, NetworkConfig, RuntimeConfig, ThermostatLimits,
};
pub use connectivity::{ConnectivityState, ConnectivityTransition};
pub use dispatcher::{AttributeDispatcher, DispatchOutcome};
pub use error::{ActuationError, RenderError, ValidationError};
pub use ids::ThermostatAttribute;
pub use ports::{Actuator, IndicatorOutput, Presenter, Submission};
pub use reducer::ConnectivityReducer;
pub use store::{DeviceSnapshot, DeviceStateStore};
pub use thermostat::{AttributeChange, ThermostatState};
pub use topics::*;
pub use types::{
    AdvertisingActivity, AttributeChangeEvent, AttributeValue, ConnectivityEvent,
    ConnectivityPhase, DisplaySnapshot, HvacCommand, SetpointKind, SystemMode, UpdatePhase,
};
