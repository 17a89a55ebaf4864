use serde::Serialize;

use crate::{
    config::{
        ThermostatLimits, DEFAULT_COOLING_SETPOINT, DEFAULT_HEATING_SETPOINT,
        DEFAULT_LOCAL_TEMPERATURE, DEFAULT_SYSTEM_MODE,
    },
    error::ValidationError,
    ids::ThermostatAttribute,
    types::{AttributeValue, HvacCommand, SetpointKind, SystemMode},
};

/// Nullable `int16` sentinel used by the attribute model.
const NULL_TEMPERATURE: i16 = i16::MIN;

/// A decoded write to one of the dispatched thermostat attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeChange {
    SystemMode(SystemMode),
    Setpoint { kind: SetpointKind, value: i16 },
    LocalTemperature(Option<i16>),
}

impl AttributeChange {
    pub fn decode(
        attribute: ThermostatAttribute,
        value: &AttributeValue,
    ) -> Result<Self, ValidationError> {
        match (attribute, *value) {
            (ThermostatAttribute::SystemMode, AttributeValue::U8(raw)) => SystemMode::from_raw(raw)
                .map(Self::SystemMode)
                .ok_or(ValidationError::UnsupportedMode(raw)),
            (ThermostatAttribute::OccupiedCoolingSetpoint, AttributeValue::I16(value)) => {
                Ok(Self::Setpoint {
                    kind: SetpointKind::Cooling,
                    value,
                })
            }
            (ThermostatAttribute::OccupiedHeatingSetpoint, AttributeValue::I16(value)) => {
                Ok(Self::Setpoint {
                    kind: SetpointKind::Heating,
                    value,
                })
            }
            (ThermostatAttribute::LocalTemperature, AttributeValue::Null) => {
                Ok(Self::LocalTemperature(None))
            }
            (ThermostatAttribute::LocalTemperature, AttributeValue::I16(value)) => Ok(
                Self::LocalTemperature((value != NULL_TEMPERATURE).then_some(value)),
            ),
            (attribute, other) => Err(ValidationError::TypeMismatch {
                attribute: attribute.id(),
                expected: expected_type(attribute),
                actual: other.type_name(),
            }),
        }
    }
}

fn expected_type(attribute: ThermostatAttribute) -> &'static str {
    match attribute {
        ThermostatAttribute::SystemMode => "u8",
        ThermostatAttribute::LocalTemperature
        | ThermostatAttribute::OccupiedCoolingSetpoint
        | ThermostatAttribute::OccupiedHeatingSetpoint => "i16",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThermostatState {
    #[serde(rename = "systemMode")]
    pub system_mode: SystemMode,
    #[serde(rename = "coolingSetpoint")]
    pub cooling_setpoint: i16,
    #[serde(rename = "heatingSetpoint")]
    pub heating_setpoint: i16,
    #[serde(rename = "localTemperature")]
    pub local_temperature: Option<i16>,
    #[serde(rename = "runningMode")]
    pub running_mode: SystemMode,
    #[serde(rename = "confirmedCoolingSetpoint")]
    pub confirmed_cooling_setpoint: Option<i16>,
    #[serde(rename = "confirmedHeatingSetpoint")]
    pub confirmed_heating_setpoint: Option<i16>,
}

impl Default for ThermostatState {
    fn default() -> Self {
        Self {
            system_mode: DEFAULT_SYSTEM_MODE,
            cooling_setpoint: DEFAULT_COOLING_SETPOINT,
            heating_setpoint: DEFAULT_HEATING_SETPOINT,
            local_temperature: Some(DEFAULT_LOCAL_TEMPERATURE),
            running_mode: SystemMode::Off,
            confirmed_cooling_setpoint: None,
            confirmed_heating_setpoint: None,
        }
    }
}

impl ThermostatState {
    pub fn setpoint(&self, kind: SetpointKind) -> i16 {
        match kind {
            SetpointKind::Cooling => self.cooling_setpoint,
            SetpointKind::Heating => self.heating_setpoint,
        }
    }

    /// Checks `change` against the limits and the current opposite setpoint.
    pub fn validate(
        &self,
        limits: &ThermostatLimits,
        change: &AttributeChange,
    ) -> Result<(), ValidationError> {
        let (kind, value) = match *change {
            AttributeChange::Setpoint { kind, value } => (kind, value),
            AttributeChange::SystemMode(mode) if !limits.features.supports(mode) => {
                return Err(ValidationError::UnsupportedMode(mode.raw()));
            }
            AttributeChange::SystemMode(_) | AttributeChange::LocalTemperature(_) => {
                return Ok(());
            }
        };

        let (min, max) = match kind {
            SetpointKind::Cooling => (limits.min_cool, limits.max_cool),
            SetpointKind::Heating => (limits.min_heat, limits.max_heat),
        };
        if !(min..=max).contains(&value) {
            return Err(ValidationError::OutOfRange {
                kind,
                value,
                min,
                max,
            });
        }

        if limits.enforces_dead_band() {
            let (heating, cooling) = match kind {
                SetpointKind::Cooling => (self.heating_setpoint, value),
                SetpointKind::Heating => (value, self.cooling_setpoint),
            };
            if i32::from(heating) + i32::from(limits.dead_band) > i32::from(cooling) {
                return Err(ValidationError::DeadBand {
                    heating,
                    cooling,
                    dead_band: limits.dead_band,
                });
            }
        }

        Ok(())
    }

    /// Commits an already validated change.
    pub fn apply(&mut self, change: &AttributeChange) {
        match *change {
            AttributeChange::SystemMode(mode) => self.system_mode = mode,
            AttributeChange::Setpoint {
                kind: SetpointKind::Cooling,
                value,
            } => self.cooling_setpoint = value,
            AttributeChange::Setpoint {
                kind: SetpointKind::Heating,
                value,
            } => self.heating_setpoint = value,
            AttributeChange::LocalTemperature(value) => self.local_temperature = value,
        }
    }

    /// Records a command the unit acknowledged.
    pub fn confirm(&mut self, command: &HvacCommand) {
        match *command {
            HvacCommand::SetMode(mode) => self.running_mode = mode,
            HvacCommand::SetCoolSetpoint(value) => self.confirmed_cooling_setpoint = Some(value),
            HvacCommand::SetHeatSetpoint(value) => self.confirmed_heating_setpoint = Some(value),
        }
    }
}
