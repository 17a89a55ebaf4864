use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::{
    config::ThermostatLimits,
    connectivity::{ConnectivityState, ConnectivityTransition},
    error::ValidationError,
    ids::ThermostatAttribute,
    thermostat::{AttributeChange, ThermostatState},
    types::{AttributeValue, ConnectivityEvent, DisplaySnapshot, HvacCommand},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub thermostat: ThermostatState,
    pub connectivity: ConnectivityState,
}

impl DeviceSnapshot {
    pub fn display(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            mode: self.thermostat.system_mode,
            cool_setpoint: self.thermostat.cooling_setpoint,
            heat_setpoint: self.thermostat.heating_setpoint,
            phase: self.connectivity.phase,
            network_online: self.connectivity.network_online,
            local_temperature: self.thermostat.local_temperature,
            running_mode: self.thermostat.running_mode,
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    limits: ThermostatLimits,
    thermostat: ThermostatState,
    connectivity: ConnectivityState,
}

/// The authoritative thermostat and connectivity record.
///
/// Cloning yields another handle to the same record. Every operation takes
/// the internal lock once, so a validation and its commit cannot interleave
/// with another writer.
#[derive(Debug, Clone)]
pub struct DeviceStateStore {
    inner: Arc<Mutex<DeviceState>>,
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new(ThermostatLimits::default())
    }
}

impl DeviceStateStore {
    pub fn new(limits: ThermostatLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DeviceState {
                limits,
                thermostat: ThermostatState::default(),
                connectivity: ConnectivityState::default(),
            })),
        }
    }

    pub fn limits(&self) -> ThermostatLimits {
        self.lock().limits
    }

    pub fn read(&self) -> ThermostatState {
        self.lock().thermostat
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.lock().connectivity
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let state = self.lock();
        DeviceSnapshot {
            thermostat: state.thermostat,
            connectivity: state.connectivity,
        }
    }

    pub fn display_snapshot(&self) -> DisplaySnapshot {
        self.snapshot().display()
    }

    /// Decodes and validates without mutating.
    pub fn validate_attribute_change(
        &self,
        attribute: ThermostatAttribute,
        value: &AttributeValue,
    ) -> Result<AttributeChange, ValidationError> {
        let change = AttributeChange::decode(attribute, value)?;
        let state = self.lock();
        state.thermostat.validate(&state.limits, &change)?;
        Ok(change)
    }

    pub fn apply_attribute_change(
        &self,
        attribute: ThermostatAttribute,
        value: &AttributeValue,
    ) -> Result<AttributeChange, ValidationError> {
        let change = AttributeChange::decode(attribute, value)?;
        let mut state = self.lock();
        let limits = state.limits;
        state.thermostat.validate(&limits, &change)?;
        state.thermostat.apply(&change);
        Ok(change)
    }

    pub fn apply_connectivity_transition(
        &self,
        event: &ConnectivityEvent,
    ) -> Option<ConnectivityTransition> {
        self.lock().connectivity.apply(event)
    }

    pub fn confirm_actuation(&self, command: &HvacCommand) {
        self.lock().thermostat.confirm(command);
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // The record is plain data; a panicking writer cannot leave it half
        // validated, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::{ConnectivityPhase, SetpointKind, SystemMode};

    #[test]
    fn write_then_read_returns_value() {
        let store = DeviceStateStore::default();

        for (attribute, value) in [
            (ThermostatAttribute::SystemMode, AttributeValue::U8(3)),
            (ThermostatAttribute::OccupiedCoolingSetpoint, AttributeValue::I16(2750)),
            (ThermostatAttribute::OccupiedHeatingSetpoint, AttributeValue::I16(1850)),
        ] {
            store.apply_attribute_change(attribute, &value).unwrap();
        }

        let state = store.read();
        assert_eq!(state.system_mode, SystemMode::Cool);
        assert_eq!(state.cooling_setpoint, 2750);
        assert_eq!(state.heating_setpoint, 1850);
    }

    #[test]
    fn out_of_range_leaves_store_unchanged() {
        let store = DeviceStateStore::default();
        let before = store.snapshot();

        for value in [i16::MIN, 0, 1599, 3001, i16::MAX] {
            let result = store.apply_attribute_change(
                ThermostatAttribute::OccupiedCoolingSetpoint,
                &AttributeValue::I16(value),
            );
            assert!(matches!(
                result,
                Err(ValidationError::OutOfRange {
                    kind: SetpointKind::Cooling,
                    ..
                })
            ));
            assert_eq!(store.snapshot(), before);
        }
    }

    #[test]
    fn dead_band_violation_rejected_even_within_limits() {
        let store = DeviceStateStore::default();
        store
            .apply_attribute_change(
                ThermostatAttribute::OccupiedCoolingSetpoint,
                &AttributeValue::I16(2400),
            )
            .unwrap();

        let result = store.apply_attribute_change(
            ThermostatAttribute::OccupiedHeatingSetpoint,
            &AttributeValue::I16(2200),
        );

        assert_eq!(
            result,
            Err(ValidationError::DeadBand {
                heating: 2200,
                cooling: 2400,
                dead_band: 300,
            })
        );
        assert_eq!(store.read().heating_setpoint, 2000);
    }

    #[test]
    fn validate_does_not_mutate() {
        let store = DeviceStateStore::default();

        let change = store
            .validate_attribute_change(ThermostatAttribute::SystemMode, &AttributeValue::U8(4))
            .unwrap();

        assert_eq!(change, AttributeChange::SystemMode(SystemMode::Heat));
        assert_eq!(store.read().system_mode, SystemMode::Off);
    }

    #[test]
    fn clones_share_one_record() {
        let store = DeviceStateStore::default();
        let other = store.clone();

        other.apply_connectivity_transition(&ConnectivityEvent::CommissioningComplete);
        other.confirm_actuation(&HvacCommand::SetMode(SystemMode::Heat));

        assert_eq!(
            store.connectivity().phase,
            ConnectivityPhase::CommissioningComplete
        );
        assert_eq!(store.read().running_mode, SystemMode::Heat);
    }

    #[test]
    fn display_snapshot_reflects_state() {
        let store = DeviceStateStore::default();
        store
            .apply_attribute_change(ThermostatAttribute::SystemMode, &AttributeValue::U8(1))
            .unwrap();
        store.apply_connectivity_transition(&ConnectivityEvent::IpAddressChanged);

        let snapshot = store.display_snapshot();

        assert_eq!(snapshot.mode, SystemMode::Auto);
        assert_eq!(snapshot.cool_setpoint, 2600);
        assert_eq!(snapshot.heat_setpoint, 2000);
        assert_eq!(snapshot.phase, ConnectivityPhase::NetworkOnline);
        assert!(snapshot.network_online);
        assert_eq!(snapshot.local_temperature, Some(2500));
    }
}
