use serde::Serialize;

use crate::types::{AdvertisingActivity, ConnectivityEvent, ConnectivityPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectivityState {
    pub phase: ConnectivityPhase,
    /// Set once an IP address has been acquired. Orthogonal to `phase`.
    #[serde(rename = "networkOnline")]
    pub network_online: bool,
    #[serde(rename = "pairedIndicator")]
    pub paired_indicator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityTransition {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
    /// Level to drive the paired indicator to, if this transition touches it.
    pub indicator: Option<bool>,
}

impl ConnectivityTransition {
    pub fn phase(&self) -> ConnectivityPhase {
        self.to.phase
    }
}

impl ConnectivityState {
    /// Transition table. `None` means the event does not apply in the
    /// current phase and nothing changes.
    pub fn next(&self, event: &ConnectivityEvent) -> Option<ConnectivityTransition> {
        let mut to = *self;
        let mut indicator = None;

        match *event {
            ConnectivityEvent::AdvertisingChange {
                activity: AdvertisingActivity::Started,
            } => {
                if self.phase != ConnectivityPhase::Idle {
                    return None;
                }
                to.phase = ConnectivityPhase::AdvertisingForCommissioning;
            }
            ConnectivityEvent::AdvertisingChange {
                activity: AdvertisingActivity::Stopped,
            } => {
                if self.phase != ConnectivityPhase::AdvertisingForCommissioning {
                    return None;
                }
                to.phase = ConnectivityPhase::Idle;
            }
            ConnectivityEvent::CommissioningComplete => {
                to.phase = ConnectivityPhase::CommissioningComplete;
                to.paired_indicator = true;
                indicator = Some(true);
            }
            ConnectivityEvent::FailSafeExpired => {
                to.phase = ConnectivityPhase::CommissioningFailed;
            }
            ConnectivityEvent::FabricRemoved => {
                to.phase = ConnectivityPhase::FabricRemoved;
                to.paired_indicator = false;
                indicator = Some(false);
            }
            ConnectivityEvent::IpAddressChanged => {
                to.network_online = true;
                // Pairing markers outrank plain connectivity.
                if !matches!(
                    self.phase,
                    ConnectivityPhase::CommissioningComplete | ConnectivityPhase::FabricRemoved
                ) {
                    to.phase = ConnectivityPhase::NetworkOnline;
                }
            }
            ConnectivityEvent::Other { .. } => return None,
        }

        Some(ConnectivityTransition {
            from: *self,
            to,
            indicator,
        })
    }

    pub fn apply(&mut self, event: &ConnectivityEvent) -> Option<ConnectivityTransition> {
        let transition = self.next(event)?;
        *self = transition.to;
        Some(transition)
    }
}
