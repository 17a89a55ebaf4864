use tracing::{debug, info, warn};

use crate::{
    connectivity::ConnectivityTransition,
    ports::{IndicatorOutput, Presenter},
    store::DeviceStateStore,
    types::{AdvertisingActivity, ConnectivityEvent},
};

/// Folds commissioning lifecycle events into the connectivity phase.
pub struct ConnectivityReducer<P, I> {
    store: DeviceStateStore,
    presenter: P,
    indicator: I,
}

impl<P: Presenter, I: IndicatorOutput> ConnectivityReducer<P, I> {
    pub fn new(store: DeviceStateStore, presenter: P, indicator: I) -> Self {
        Self {
            store,
            presenter,
            indicator,
        }
    }

    pub fn reduce(&mut self, event: &ConnectivityEvent) -> Option<ConnectivityTransition> {
        let Some(transition) = self.store.apply_connectivity_transition(event) else {
            debug!(
                "connectivity event {event:?} ignored in phase {}",
                self.store.connectivity().phase.as_str()
            );
            return None;
        };

        match event {
            ConnectivityEvent::AdvertisingChange {
                activity: AdvertisingActivity::Started,
            } => info!("advertising started, ready for commissioning"),
            ConnectivityEvent::AdvertisingChange {
                activity: AdvertisingActivity::Stopped,
            } => info!("advertising stopped"),
            ConnectivityEvent::CommissioningComplete => info!("commissioning complete"),
            ConnectivityEvent::FailSafeExpired => warn!("commissioning failed or timed out"),
            ConnectivityEvent::FabricRemoved => warn!("fabric removed"),
            ConnectivityEvent::IpAddressChanged => info!("ip address changed, network online"),
            ConnectivityEvent::Other { .. } => {}
        }

        if let Some(on) = transition.indicator {
            self.indicator.set_paired(on);
        }
        self.presenter.render(&self.store.display_snapshot());

        Some(transition)
    }
}
