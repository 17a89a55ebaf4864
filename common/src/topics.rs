pub const TOPIC_ATTRIBUTE_WRITE: &str = "thermostat/matter/attribute";
pub const TOPIC_CONNECTIVITY_EVENT: &str = "thermostat/matter/event";
pub const TOPIC_IDENTIFY: &str = "thermostat/matter/identify";

pub const TOPIC_CONTROLLER_STATE: &str = "thermostat/controller/state";
pub const TOPIC_ACTUATOR_STATE: &str = "thermostat/controller/actuator";
