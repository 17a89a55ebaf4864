use serde::{Deserialize, Serialize};

use crate::types::SystemMode;

pub const MIN_COOL_SETPOINT_LIMIT: i16 = 1600;
pub const MAX_COOL_SETPOINT_LIMIT: i16 = 3000;
pub const MIN_HEAT_SETPOINT_LIMIT: i16 = 1600;
pub const MAX_HEAT_SETPOINT_LIMIT: i16 = 3000;
/// Attribute units: tenths of a degree.
pub const MIN_SETPOINT_DEAD_BAND: i8 = 30;
pub const DEFAULT_COOLING_SETPOINT: i16 = 2600;
pub const DEFAULT_HEATING_SETPOINT: i16 = 2000;
pub const DEFAULT_LOCAL_TEMPERATURE: i16 = 2500;
pub const DEFAULT_SYSTEM_MODE: SystemMode = SystemMode::Off;
/// Cooling and heating.
pub const CONTROL_SEQUENCE_OF_OPERATION: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermostatFeatures {
    pub heating: bool,
    pub cooling: bool,
    pub auto_mode: bool,
}

impl ThermostatFeatures {
    /// Features implied by a `ControlSequenceOfOperation` value. Auto needs
    /// both heating and cooling.
    pub fn from_control_sequence(sequence: u8) -> Self {
        let (heating, cooling) = match sequence {
            0 | 1 => (false, true),
            2 | 3 => (true, false),
            _ => (true, true),
        };
        Self {
            heating,
            cooling,
            auto_mode: heating && cooling,
        }
    }

    pub fn supports(&self, mode: SystemMode) -> bool {
        match mode {
            SystemMode::Off => true,
            SystemMode::Heat => self.heating,
            SystemMode::Cool => self.cooling,
            SystemMode::Auto => self.auto_mode,
        }
    }
}

impl Default for ThermostatFeatures {
    fn default() -> Self {
        Self::from_control_sequence(CONTROL_SEQUENCE_OF_OPERATION)
    }
}

/// Setpoint limits in hundredths of a degree. Built from the constants above;
/// not runtime configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThermostatLimits {
    pub min_cool: i16,
    pub max_cool: i16,
    pub min_heat: i16,
    pub max_heat: i16,
    pub dead_band: i16,
    pub features: ThermostatFeatures,
}

impl Default for ThermostatLimits {
    fn default() -> Self {
        Self {
            min_cool: MIN_COOL_SETPOINT_LIMIT,
            max_cool: MAX_COOL_SETPOINT_LIMIT,
            min_heat: MIN_HEAT_SETPOINT_LIMIT,
            max_heat: MAX_HEAT_SETPOINT_LIMIT,
            dead_band: i16::from(MIN_SETPOINT_DEAD_BAND) * 10,
            features: ThermostatFeatures::default(),
        }
    }
}

impl ThermostatLimits {
    pub fn enforces_dead_band(&self) -> bool {
        self.features.heating && self.features.cooling
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActuatorConfig {
    pub ack_timeout_ms: u64,
    pub max_attempts: u8,
    pub retry_backoff_ms: u64,
    /// `host:port` of a serial-over-TCP bridge to the unit. Unset runs the
    /// simulated link.
    #[serde(default)]
    pub link_addr: Option<String>,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 1_000,
            max_attempts: 3,
            retry_backoff_ms: 250,
            link_addr: None,
        }
    }
}

impl ActuatorConfig {
    pub fn sanitize(&mut self) {
        self.ack_timeout_ms = self.ack_timeout_ms.clamp(50, 10_000);
        self.max_attempts = self.max_attempts.clamp(1, 10);
        self.retry_backoff_ms = self.retry_backoff_ms.min(5_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub render_budget_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 64,
            render_budget_ms: 50,
        }
    }
}

impl DisplayConfig {
    pub fn sanitize(&mut self) {
        if self.width == 0 || self.width > 256 {
            self.width = 128;
        }
        // Page-ordered buffer: height must be a whole number of 8-pixel pages.
        if self.height == 0 || self.height > 128 || self.height % 8 != 0 {
            self.height = 64;
        }
        self.render_budget_ms = self.render_budget_ms.clamp(5, 1_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HardwareConfig {
    pub i2c_sda_pin: i32,
    pub i2c_scl_pin: i32,
    pub display_i2c_addr: u8,
    pub hvac_uart_port: u8,
    pub hvac_uart_tx_pin: i32,
    pub hvac_uart_rx_pin: i32,
    pub hvac_baud_rate: u32,
    pub paired_led_pin: i32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_sda_pin: 21,
            i2c_scl_pin: 22,
            display_i2c_addr: 0x3C,
            hvac_uart_port: 1,
            hvac_uart_tx_pin: 17,
            hvac_uart_rx_pin: 16,
            hvac_baud_rate: 2_400,
            paired_led_pin: 2,
        }
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.i2c_sda_pin < 0 {
            self.i2c_sda_pin = defaults.i2c_sda_pin;
        }
        if self.i2c_scl_pin < 0 {
            self.i2c_scl_pin = defaults.i2c_scl_pin;
        }
        if self.hvac_uart_tx_pin < 0 {
            self.hvac_uart_tx_pin = defaults.hvac_uart_tx_pin;
        }
        if self.hvac_uart_rx_pin < 0 {
            self.hvac_uart_rx_pin = defaults.hvac_uart_rx_pin;
        }
        if self.paired_led_pin < 0 {
            self.paired_led_pin = defaults.paired_led_pin;
        }
        if self.hvac_uart_port > 2 {
            self.hvac_uart_port = defaults.hvac_uart_port;
        }
        // 0x78 and up are reserved 7-bit addresses; read them as the 8-bit form.
        if self.display_i2c_addr > 0x77 {
            self.display_i2c_addr >>= 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub endpoint_id: u16,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub http_port: u16,
    pub state_publish_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint_id: 1,
            actuator: ActuatorConfig::default(),
            display: DisplayConfig::default(),
            hardware: HardwareConfig::default(),
            network: NetworkConfig::default(),
            http_port: 8080,
            state_publish_interval_ms: 10_000,
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.actuator.sanitize();
        self.display.sanitize();
        self.hardware.sanitize();
        self.state_publish_interval_ms = self.state_publish_interval_ms.max(1_000);
    }
}
