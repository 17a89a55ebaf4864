use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemMode {
    #[default]
    Off,
    Cool,
    Heat,
    Auto,
}

impl SystemMode {
    /// Decodes the Thermostat cluster `SystemMode` enum. Modes this device
    /// cannot drive (emergency heat, precooling, fan only, dry, sleep) map to
    /// `None`.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Off),
            1 => Some(Self::Auto),
            3 => Some(Self::Cool),
            4 => Some(Self::Heat),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Auto => 1,
            Self::Cool => 3,
            Self::Heat => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Cool => "COOL",
            Self::Heat => "HEAT",
            Self::Auto => "AUTO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SetpointKind {
    Cooling,
    Heating,
}

impl SetpointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cooling => "COOLING",
            Self::Heating => "HEATING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityPhase {
    #[default]
    Idle,
    AdvertisingForCommissioning,
    CommissioningComplete,
    CommissioningFailed,
    NetworkOnline,
    FabricRemoved,
}

impl ConnectivityPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::AdvertisingForCommissioning => "ADVERTISING_FOR_COMMISSIONING",
            Self::CommissioningComplete => "COMMISSIONING_COMPLETE",
            Self::CommissioningFailed => "COMMISSIONING_FAILED",
            Self::NetworkOnline => "NETWORK_ONLINE",
            Self::FabricRemoved => "FABRIC_REMOVED",
        }
    }
}

/// Scalar attribute value as delivered by the attribute model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValue {
    Null,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdatePhase {
    PreUpdate,
    PostUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChangeEvent {
    #[serde(rename = "endpoint")]
    pub endpoint_id: u16,
    #[serde(rename = "cluster")]
    pub cluster_id: u32,
    #[serde(rename = "attribute")]
    pub attribute_id: u32,
    pub value: AttributeValue,
    pub phase: UpdatePhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvertisingActivity {
    Started,
    Stopped,
}

/// Lifecycle notification from the commissioning stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConnectivityEvent {
    AdvertisingChange { activity: AdvertisingActivity },
    CommissioningComplete,
    FailSafeExpired,
    FabricRemoved,
    IpAddressChanged,
    Other { code: u16 },
}

/// Command for the HVAC unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum HvacCommand {
    SetMode(SystemMode),
    SetCoolSetpoint(i16),
    SetHeatSetpoint(i16),
}

impl HvacCommand {
    pub fn setpoint(kind: SetpointKind, value: i16) -> Self {
        match kind {
            SetpointKind::Cooling => Self::SetCoolSetpoint(value),
            SetpointKind::Heating => Self::SetHeatSetpoint(value),
        }
    }

    /// Queue slot of the command; a newer command replaces a pending one in
    /// the same slot.
    pub fn slot(&self) -> usize {
        match self {
            Self::SetMode(_) => 0,
            Self::SetCoolSetpoint(_) => 1,
            Self::SetHeatSetpoint(_) => 2,
        }
    }
}

pub const HVAC_COMMAND_SLOTS: usize = 3;

/// What the display shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplaySnapshot {
    pub mode: SystemMode,
    #[serde(rename = "coolSetpoint")]
    pub cool_setpoint: i16,
    #[serde(rename = "heatSetpoint")]
    pub heat_setpoint: i16,
    pub phase: ConnectivityPhase,
    #[serde(rename = "networkOnline")]
    pub network_online: bool,
    #[serde(rename = "localTemperature")]
    pub local_temperature: Option<i16>,
    #[serde(rename = "runningMode")]
    pub running_mode: SystemMode,
}

/// Formats hundredths of a degree as `21.50`.
pub fn format_centi_degrees(value: i16) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = i32::from(value).abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
