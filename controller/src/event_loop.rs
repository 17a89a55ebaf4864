use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use thermostat_common::{
    Actuator, AttributeChangeEvent, AttributeDispatcher, AttributeValue, ConnectivityEvent,
    ConnectivityReducer, ConnectivityTransition, DeviceStateStore, DispatchOutcome,
    IndicatorOutput, Presenter, UpdatePhase,
};

use crate::actuator::ActuationOutcome;

/// Attribute write as it arrives from the bridge, before it is split into
/// the pre- and post-update notifications.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AttributeWrite {
    pub endpoint: u16,
    pub cluster: u32,
    pub attribute: u32,
    pub value: AttributeValue,
}

impl AttributeWrite {
    fn event(&self, phase: UpdatePhase) -> AttributeChangeEvent {
        AttributeChangeEvent {
            endpoint_id: self.endpoint,
            cluster_id: self.cluster,
            attribute_id: self.attribute,
            value: self.value,
            phase,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub effect_id: u8,
    #[serde(default)]
    pub effect_variant: u8,
}

#[derive(Debug)]
pub enum CoreEvent {
    Attribute {
        event: AttributeChangeEvent,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Connectivity {
        event: ConnectivityEvent,
        reply: oneshot::Sender<Option<ConnectivityTransition>>,
    },
    Identify(IdentifyRequest),
}

/// Sending side of the event loop.
#[derive(Debug, Clone)]
pub struct CoreHandle {
    tx: mpsc::Sender<CoreEvent>,
}

impl CoreHandle {
    pub async fn attribute(&self, event: AttributeChangeEvent) -> Result<DispatchOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(CoreEvent::Attribute { event, reply }).await?;
        rx.await.map_err(|_| anyhow!("event loop dropped attribute reply"))
    }

    /// Runs the veto check and, if it passes, commits the write.
    pub async fn write_attribute(&self, write: AttributeWrite) -> Result<DispatchOutcome> {
        let outcome = self.attribute(write.event(UpdatePhase::PreUpdate)).await?;
        if matches!(outcome, DispatchOutcome::Rejected(_)) {
            return Ok(outcome);
        }
        self.attribute(write.event(UpdatePhase::PostUpdate)).await
    }

    pub async fn connectivity(
        &self,
        event: ConnectivityEvent,
    ) -> Result<Option<ConnectivityTransition>> {
        let (reply, rx) = oneshot::channel();
        self.send(CoreEvent::Connectivity { event, reply }).await?;
        rx.await
            .map_err(|_| anyhow!("event loop dropped connectivity reply"))
    }

    pub async fn identify(&self, request: IdentifyRequest) -> Result<()> {
        self.send(CoreEvent::Identify(request)).await
    }

    async fn send(&self, event: CoreEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("event loop stopped"))
    }
}

pub fn spawn_event_loop<A, P, R, I>(
    dispatcher: AttributeDispatcher<A, P>,
    mut reducer: ConnectivityReducer<R, I>,
    mut outcomes: mpsc::Receiver<ActuationOutcome>,
    depth: usize,
) -> (CoreHandle, JoinHandle<()>)
where
    A: Actuator + Send + 'static,
    P: Presenter + Send + 'static,
    R: Presenter + Send + 'static,
    I: IndicatorOutput + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(depth.max(1));
    let store = dispatcher.store().clone();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    handle_event(&dispatcher, &mut reducer, event);
                }
                Some(outcome) = outcomes.recv() => confirm(&store, outcome),
            }
        }
        info!("core event loop stopped");
    });

    (CoreHandle { tx }, task)
}

fn handle_event<A, P, R, I>(
    dispatcher: &AttributeDispatcher<A, P>,
    reducer: &mut ConnectivityReducer<R, I>,
    event: CoreEvent,
) where
    A: Actuator,
    P: Presenter,
    R: Presenter,
    I: IndicatorOutput,
{
    match event {
        CoreEvent::Attribute { event, reply } => {
            let _ = reply.send(dispatcher.dispatch(&event));
        }
        CoreEvent::Connectivity { event, reply } => {
            let _ = reply.send(reducer.reduce(&event));
        }
        CoreEvent::Identify(request) => info!(
            "identify effect {:#04x} variant {:#04x}",
            request.effect_id, request.effect_variant
        ),
    }
}

/// Acks only advance the confirmed fields; the display picks them up on the
/// next render.
fn confirm(store: &DeviceStateStore, outcome: ActuationOutcome) {
    match outcome.result {
        Ok(ack) => {
            debug!("{:?} acknowledged after {} attempt(s)", ack.command, ack.attempts);
            store.confirm_actuation(&ack.command);
        }
        Err(err) => warn!("{:?} failed: {err}", outcome.command),
    }
}
