//! Cluster and attribute identifiers of the attribute model.

pub const IDENTIFY_CLUSTER_ID: u32 = 0x0003;
pub const THERMOSTAT_CLUSTER_ID: u32 = 0x0201;

pub const ATTR_LOCAL_TEMPERATURE: u32 = 0x0000;
pub const ATTR_OCCUPIED_COOLING_SETPOINT: u32 = 0x0011;
pub const ATTR_OCCUPIED_HEATING_SETPOINT: u32 = 0x0012;
pub const ATTR_MIN_HEAT_SETPOINT_LIMIT: u32 = 0x0015;
pub const ATTR_MAX_HEAT_SETPOINT_LIMIT: u32 = 0x0016;
pub const ATTR_MIN_COOL_SETPOINT_LIMIT: u32 = 0x0017;
pub const ATTR_MAX_COOL_SETPOINT_LIMIT: u32 = 0x0018;
pub const ATTR_MIN_SETPOINT_DEAD_BAND: u32 = 0x0019;
pub const ATTR_CONTROL_SEQUENCE_OF_OPERATION: u32 = 0x001B;
pub const ATTR_SYSTEM_MODE: u32 = 0x001C;
pub const ATTR_THERMOSTAT_RUNNING_MODE: u32 = 0x001E;

/// Thermostat attributes the dispatcher acts on. Everything else under the
/// cluster is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermostatAttribute {
    LocalTemperature,
    OccupiedCoolingSetpoint,
    OccupiedHeatingSetpoint,
    SystemMode,
}

impl ThermostatAttribute {
    pub fn from_id(attribute_id: u32) -> Option<Self> {
        match attribute_id {
            ATTR_LOCAL_TEMPERATURE => Some(Self::LocalTemperature),
            ATTR_OCCUPIED_COOLING_SETPOINT => Some(Self::OccupiedCoolingSetpoint),
            ATTR_OCCUPIED_HEATING_SETPOINT => Some(Self::OccupiedHeatingSetpoint),
            ATTR_SYSTEM_MODE => Some(Self::SystemMode),
            _ => None,
        }
    }

    pub fn id(self) -> u32 {
        match self {
            Self::LocalTemperature => ATTR_LOCAL_TEMPERATURE,
            Self::OccupiedCoolingSetpoint => ATTR_OCCUPIED_COOLING_SETPOINT,
            Self::OccupiedHeatingSetpoint => ATTR_OCCUPIED_HEATING_SETPOINT,
            Self::SystemMode => ATTR_SYSTEM_MODE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalTemperature => "LocalTemperature",
            Self::OccupiedCoolingSetpoint => "OccupiedCoolingSetpoint",
            Self::OccupiedHeatingSetpoint => "OccupiedHeatingSetpoint",
            Self::SystemMode => "SystemMode",
        }
    }
}
