use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};

use thermostat_common::{
    types::HVAC_COMMAND_SLOTS, ActuationError, Actuator, ActuatorConfig, HvacCommand, Submission,
};

/// Transport to the HVAC unit. `send` resolves once the unit acknowledged
/// the command; the gateway applies the ack timeout around it. `send` may be
/// cancelled mid-exchange, so a link must not mistake a reply left over from
/// a cancelled call for the ack of the next one.
#[async_trait]
pub trait HvacLink: Send {
    async fn send(&mut self, command: &HvacCommand) -> Result<(), ActuationError>;
}

#[async_trait]
impl<L: HvacLink + ?Sized> HvacLink for Box<L> {
    async fn send(&mut self, command: &HvacCommand) -> Result<(), ActuationError> {
        (**self).send(command).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub command: HvacCommand,
    pub attempts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationOutcome {
    pub command: HvacCommand,
    pub result: Result<Ack, ActuationError>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActuatorDiagnostics {
    pub running: bool,
    pub pending: usize,
    pub submitted: u64,
    pub coalesced: u64,
    pub delivered: u64,
    pub failed: u64,
    pub last_ack: Option<HvacCommand>,
    pub last_error: Option<String>,
}

/// One slot per command kind; a newer command replaces the pending one so
/// only the latest target reaches the unit.
#[derive(Debug, Default)]
struct PendingCommands {
    slots: [Option<(u64, HvacCommand)>; HVAC_COMMAND_SLOTS],
    next_seq: u64,
}

impl PendingCommands {
    fn insert(&mut self, command: HvacCommand) -> Submission {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        match self.slots[command.slot()].replace((seq, command)) {
            Some(_) => Submission::Coalesced,
            None => Submission::Queued,
        }
    }

    /// Oldest pending command first.
    fn take_next(&mut self) -> Option<HvacCommand> {
        let (_, slot) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.map(|(seq, _)| (seq, slot)))
            .min()?;
        self.slots[slot].take().map(|(_, command)| command)
    }

    fn has_pending(&self, slot: usize) -> bool {
        self.slots[slot].is_some()
    }

    fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

#[derive(Debug, Default)]
struct GatewayShared {
    pending: Mutex<PendingCommands>,
    stats: Mutex<ActuatorDiagnostics>,
    wake: Notify,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the actuation worker. Submitting never waits on the link.
#[derive(Debug, Clone)]
pub struct ActuatorGateway {
    shared: Arc<GatewayShared>,
}

impl ActuatorGateway {
    pub fn spawn<L>(
        link: L,
        config: ActuatorConfig,
        outcomes: mpsc::Sender<ActuationOutcome>,
    ) -> (Self, JoinHandle<()>)
    where
        L: HvacLink + 'static,
    {
        let shared = Arc::new(GatewayShared::default());
        let worker = Worker {
            link,
            config,
            shared: shared.clone(),
            outcomes,
        };
        (Self { shared }, tokio::spawn(worker.run()))
    }

    pub fn diagnostics(&self) -> ActuatorDiagnostics {
        let mut diagnostics = lock(&self.shared.stats).clone();
        diagnostics.running = !self.shared.stopped.load(Ordering::Acquire);
        diagnostics.pending = lock(&self.shared.pending).len();
        diagnostics
    }
}

impl Actuator for ActuatorGateway {
    fn submit(&self, command: HvacCommand) -> Result<Submission, ActuationError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(ActuationError::LinkDown);
        }

        let submission = lock(&self.shared.pending).insert(command);
        {
            let mut stats = lock(&self.shared.stats);
            stats.submitted += 1;
            if submission == Submission::Coalesced {
                stats.coalesced += 1;
            }
        }
        self.shared.wake.notify_one();

        debug!("actuator {submission:?}: {command:?}");
        Ok(submission)
    }
}

/// Marks the gateway stopped when the worker exits, including by panic.
struct StopOnExit(Arc<GatewayShared>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.stopped.store(true, Ordering::Release);
    }
}

struct Worker<L> {
    link: L,
    config: ActuatorConfig,
    shared: Arc<GatewayShared>,
    outcomes: mpsc::Sender<ActuationOutcome>,
}

impl<L: HvacLink> Worker<L> {
    async fn run(mut self) {
        let _stop = StopOnExit(self.shared.clone());
        loop {
            let next = lock(&self.shared.pending).take_next();
            let Some(command) = next else {
                self.shared.wake.notified().await;
                continue;
            };

            let result = self.deliver(&command).await;
            self.record(&command, &result);

            if self
                .outcomes
                .send(ActuationOutcome { command, result })
                .await
                .is_err()
            {
                info!("event loop gone, stopping actuator worker");
                break;
            }
        }
    }

    async fn deliver(&mut self, command: &HvacCommand) -> Result<Ack, ActuationError> {
        let ack_timeout = Duration::from_millis(self.config.ack_timeout_ms);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            attempt += 1;
            let error = match timeout(ack_timeout, self.link.send(command)).await {
                Ok(Ok(())) => {
                    return Ok(Ack {
                        command: *command,
                        attempts: attempt,
                    })
                }
                Ok(Err(ActuationError::LinkDown)) => return Err(ActuationError::LinkDown),
                Ok(Err(err)) => err,
                Err(_) => ActuationError::Timeout {
                    timeout_ms: self.config.ack_timeout_ms,
                },
            };

            if attempt >= max_attempts {
                return Err(error);
            }
            if lock(&self.shared.pending).has_pending(command.slot()) {
                debug!("dropping retry of {command:?}, newer target pending");
                return Err(error);
            }

            warn!("attempt {attempt}/{max_attempts} for {command:?} failed: {error}");
            sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
        }
    }

    fn record(&self, command: &HvacCommand, result: &Result<Ack, ActuationError>) {
        let mut stats = lock(&self.shared.stats);
        match result {
            Ok(_) => {
                stats.delivered += 1;
                stats.last_ack = Some(*command);
            }
            Err(err) => {
                stats.failed += 1;
                stats.last_error = Some(format!("{command:?}: {err}"));
            }
        }
    }
}

/// Stand-in unit for hosts without a serial bridge.
pub struct SimulatedLink {
    latency: Duration,
}

impl SimulatedLink {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl HvacLink for SimulatedLink {
    async fn send(&mut self, command: &HvacCommand) -> Result<(), ActuationError> {
        sleep(self.latency).await;
        info!("simulated unit accepted {command:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use thermostat_common::SystemMode;

    use super::*;

    #[derive(Clone, Default)]
    struct ScriptedLink {
        calls: Arc<Mutex<Vec<HvacCommand>>>,
        replies: Arc<Mutex<VecDeque<Result<(), ActuationError>>>>,
        delay: Duration,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedLink {
        fn replying(replies: Vec<Result<(), ActuationError>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<HvacCommand> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HvacLink for ScriptedLink {
        async fn send(&mut self, command: &HvacCommand) -> Result<(), ActuationError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(*command);
                calls.len() == 1
            };
            if let (true, Some(gate)) = (first, &self.gate) {
                gate.notified().await;
            }
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn config(max_attempts: u8) -> ActuatorConfig {
        ActuatorConfig {
            ack_timeout_ms: 50,
            max_attempts,
            retry_backoff_ms: 0,
            link_addr: None,
        }
    }

    #[tokio::test]
    async fn coalesces_pending_setpoints() {
        let link = ScriptedLink::default();
        let (tx, mut rx) = mpsc::channel(8);
        let (gateway, _worker) = ActuatorGateway::spawn(link.clone(), config(1), tx);

        assert_eq!(gateway.set_mode(SystemMode::Heat), Ok(Submission::Queued));
        assert_eq!(
            gateway.submit(HvacCommand::SetCoolSetpoint(2400)),
            Ok(Submission::Queued)
        );
        assert_eq!(
            gateway.submit(HvacCommand::SetCoolSetpoint(2450)),
            Ok(Submission::Coalesced)
        );
        assert_eq!(
            gateway.submit(HvacCommand::SetCoolSetpoint(2500)),
            Ok(Submission::Coalesced)
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        assert_eq!(first.command, HvacCommand::SetMode(SystemMode::Heat));
        assert_eq!(second.command, HvacCommand::SetCoolSetpoint(2500));
        assert_eq!(
            link.calls(),
            vec![
                HvacCommand::SetMode(SystemMode::Heat),
                HvacCommand::SetCoolSetpoint(2500),
            ]
        );

        let diagnostics = gateway.diagnostics();
        assert_eq!(diagnostics.submitted, 4);
        assert_eq!(diagnostics.coalesced, 2);
        assert_eq!(diagnostics.delivered, 2);
        assert_eq!(diagnostics.pending, 0);
    }

    #[tokio::test]
    async fn slow_link_times_out_after_all_attempts() {
        let link = ScriptedLink {
            delay: Duration::from_millis(200),
            ..ScriptedLink::default()
        };
        let (tx, mut rx) = mpsc::channel(8);
        let (gateway, _worker) = ActuatorGateway::spawn(link.clone(), config(2), tx);

        gateway.set_mode(SystemMode::Cool).unwrap();
        let outcome = rx.recv().await.unwrap();

        assert_eq!(outcome.result, Err(ActuationError::Timeout { timeout_ms: 50 }));
        assert_eq!(link.calls().len(), 2);
        assert_eq!(gateway.diagnostics().failed, 1);
    }

    #[tokio::test]
    async fn retries_until_acknowledged() {
        let link = ScriptedLink::replying(vec![Err(ActuationError::NotAcknowledged), Ok(())]);
        let (tx, mut rx) = mpsc::channel(8);
        let (gateway, _worker) = ActuatorGateway::spawn(link.clone(), config(3), tx);

        gateway.submit(HvacCommand::SetHeatSetpoint(2100)).unwrap();
        let outcome = rx.recv().await.unwrap();

        assert_eq!(
            outcome.result,
            Ok(Ack {
                command: HvacCommand::SetHeatSetpoint(2100),
                attempts: 2,
            })
        );
    }

    #[tokio::test]
    async fn link_down_is_not_retried() {
        let link = ScriptedLink::replying(vec![Err(ActuationError::LinkDown)]);
        let (tx, mut rx) = mpsc::channel(8);
        let (gateway, _worker) = ActuatorGateway::spawn(link.clone(), config(3), tx);

        gateway.set_mode(SystemMode::Auto).unwrap();
        let outcome = rx.recv().await.unwrap();

        assert_eq!(outcome.result, Err(ActuationError::LinkDown));
        assert_eq!(link.calls().len(), 1);
    }

    #[tokio::test]
    async fn newer_target_supersedes_retry() {
        let gate = Arc::new(Notify::new());
        let link = ScriptedLink {
            gate: Some(gate.clone()),
            ..ScriptedLink::replying(vec![Err(ActuationError::NotAcknowledged)])
        };
        let (tx, mut rx) = mpsc::channel(8);
        let (gateway, _worker) = ActuatorGateway::spawn(link.clone(), config(3), tx);

        gateway.submit(HvacCommand::SetCoolSetpoint(2400)).unwrap();
        while link.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        gateway.submit(HvacCommand::SetCoolSetpoint(2500)).unwrap();
        gate.notify_one();

        let stale = rx.recv().await.unwrap();
        let latest = rx.recv().await.unwrap();

        assert_eq!(stale.command, HvacCommand::SetCoolSetpoint(2400));
        assert_eq!(stale.result, Err(ActuationError::NotAcknowledged));
        assert_eq!(latest.command, HvacCommand::SetCoolSetpoint(2500));
        assert!(latest.result.is_ok());
        assert_eq!(
            link.calls(),
            vec![
                HvacCommand::SetCoolSetpoint(2400),
                HvacCommand::SetCoolSetpoint(2500),
            ]
        );
    }

    struct PanickingLink;

    #[async_trait]
    impl HvacLink for PanickingLink {
        async fn send(&mut self, _command: &HvacCommand) -> Result<(), ActuationError> {
            panic!("serial driver fault");
        }
    }

    #[tokio::test]
    async fn panicked_worker_reports_link_down() {
        let (tx, _rx) = mpsc::channel(1);
        let (gateway, worker) = ActuatorGateway::spawn(PanickingLink, config(1), tx);

        gateway.set_mode(SystemMode::Heat).unwrap();
        assert!(worker.await.unwrap_err().is_panic());

        assert_eq!(
            gateway.set_mode(SystemMode::Off),
            Err(ActuationError::LinkDown)
        );
        assert!(!gateway.diagnostics().running);
    }

    #[tokio::test]
    async fn stopped_worker_reports_link_down() {
        let (tx, rx) = mpsc::channel(1);
        let (gateway, worker) = ActuatorGateway::spawn(ScriptedLink::default(), config(1), tx);
        drop(rx);

        gateway.set_mode(SystemMode::Heat).unwrap();
        worker.await.unwrap();

        assert_eq!(
            gateway.set_mode(SystemMode::Off),
            Err(ActuationError::LinkDown)
        );
        assert!(!gateway.diagnostics().running);
    }
}
