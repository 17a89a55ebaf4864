use tracing::{debug, info, trace, warn};

use crate::{
    error::ValidationError,
    ids::{ThermostatAttribute, THERMOSTAT_CLUSTER_ID},
    ports::{Actuator, Presenter},
    store::DeviceStateStore,
    thermostat::AttributeChange,
    types::{format_centi_degrees, AttributeChangeEvent, AttributeValue, UpdatePhase},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not addressed to a dispatched thermostat attribute.
    Ignored,
    /// Pre-update check passed; nothing was mutated.
    Validated(AttributeChange),
    /// Committed to the store and propagated.
    Applied(AttributeChange),
    Rejected(ValidationError),
}

impl DispatchOutcome {
    /// Veto view for the attribute model: only a rejection blocks the write.
    pub fn into_result(self) -> Result<(), ValidationError> {
        match self {
            Self::Rejected(err) => Err(err),
            Self::Ignored | Self::Validated(_) | Self::Applied(_) => Ok(()),
        }
    }
}

/// Maps attribute writes on the thermostat endpoint onto the store, the
/// actuator and the display.
pub struct AttributeDispatcher<A, P> {
    endpoint_id: u16,
    store: DeviceStateStore,
    actuator: A,
    presenter: P,
}

impl<A: Actuator, P: Presenter> AttributeDispatcher<A, P> {
    pub fn new(endpoint_id: u16, store: DeviceStateStore, actuator: A, presenter: P) -> Self {
        Self {
            endpoint_id,
            store,
            actuator,
            presenter,
        }
    }

    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    pub fn dispatch(&self, event: &AttributeChangeEvent) -> DispatchOutcome {
        if event.endpoint_id != self.endpoint_id || event.cluster_id != THERMOSTAT_CLUSTER_ID {
            trace!(
                "ignoring attribute {:#06x} on endpoint {} cluster {:#06x}",
                event.attribute_id,
                event.endpoint_id,
                event.cluster_id
            );
            return DispatchOutcome::Ignored;
        }

        let Some(attribute) = ThermostatAttribute::from_id(event.attribute_id) else {
            debug!("ignoring thermostat attribute {:#06x}", event.attribute_id);
            return DispatchOutcome::Ignored;
        };

        match event.phase {
            UpdatePhase::PreUpdate => self.validate(attribute, &event.value),
            UpdatePhase::PostUpdate => self.apply(attribute, &event.value),
        }
    }

    fn validate(&self, attribute: ThermostatAttribute, value: &AttributeValue) -> DispatchOutcome {
        match self.store.validate_attribute_change(attribute, value) {
            Ok(change) => DispatchOutcome::Validated(change),
            Err(err) => {
                info!("vetoing {} write: {err}", attribute.as_str());
                DispatchOutcome::Rejected(err)
            }
        }
    }

    fn apply(&self, attribute: ThermostatAttribute, value: &AttributeValue) -> DispatchOutcome {
        let change = match self.store.apply_attribute_change(attribute, value) {
            Ok(change) => change,
            Err(err) => {
                warn!("dropping committed {} write: {err}", attribute.as_str());
                return DispatchOutcome::Rejected(err);
            }
        };

        let submission = match change {
            AttributeChange::SystemMode(mode) => {
                info!("system mode changed to {}", mode.as_str());
                Some(self.actuator.set_mode(mode))
            }
            AttributeChange::Setpoint { kind, value } => {
                info!(
                    "{} setpoint changed to {}",
                    kind.as_str().to_ascii_lowercase(),
                    format_centi_degrees(value)
                );
                Some(self.actuator.set_setpoint(kind, value))
            }
            AttributeChange::LocalTemperature(value) => {
                debug!("local temperature now {value:?}");
                None
            }
        };

        // The write stays authoritative; the confirmed fields just lag.
        if let Some(Err(err)) = submission {
            warn!("{} actuation not queued: {err}", attribute.as_str());
        }

        self.presenter.render(&self.store.display_snapshot());
        DispatchOutcome::Applied(change)
    }
}
