//! Regulator: a tokio actor that owns one valve and serializes every call
//! into it.
//!
//! Requesters call [`RegulatorHandle::ask`] and wait in a FIFO queue until the
//! valve is open; each admitted requester receives a [`Lease`]. Completions,
//! extensions, reconfigurations and holder-down notices all flow through the
//! same loop, so the valve never sees concurrent calls.
//!
//! Shutdown: [`RegulatorHandle::shutdown`] applies any down notices already
//! delivered, then terminates the valve and returns its registry for
//! hand-over. Queued requesters are dropped and see
//! [`RegulatorError::Stopped`].

use std::collections::VecDeque;
use std::env;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use sluice_core::{
    log_error, CapacityGate, ExtendOutcome, HolderId, HolderMonitor, LeaseRegistry, LeaseToken,
    ReleaseOutcome, Transition, Valve, ValveConfig, ValveKind, ValveResult, ValveStatus,
};

use crate::error::{RegulatorError, RegulatorResult};
use crate::lease::Lease;
use crate::monitor::{DownNotice, LeaseMonitor};

/// Environment variable for the command channel capacity.
pub const COMMAND_BUFFER_ENV: &str = "SLUICE_COMMAND_BUFFER";

const DEFAULT_COMMAND_BUFFER: usize = 64;

#[derive(Clone, Debug)]
pub struct RegulatorConfig {
    /// Capacity of the command channel between handles and the regulator loop.
    pub command_buffer: usize,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl RegulatorConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let command_buffer = match env::var(COMMAND_BUFFER_ENV) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a positive integer", COMMAND_BUFFER_ENV))?,
            Err(_) => DEFAULT_COMMAND_BUFFER,
        };
        let config = Self { command_buffer };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RegulatorResult<()> {
        if self.command_buffer == 0 {
            return Err(RegulatorError::InvalidConfiguration(
                "command_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a regulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegulatorStats {
    pub size: usize,
    pub status: ValveStatus,
    pub waiting: usize,
}

pub(crate) enum Command {
    Ask {
        holder: HolderId,
        reply: oneshot::Sender<LeaseToken>,
    },
    Release {
        token: LeaseToken,
        reply: oneshot::Sender<ReleaseOutcome>,
    },
    Extend {
        token: LeaseToken,
        reply: oneshot::Sender<ExtendOutcome>,
    },
    Reconfigure {
        config: ValveConfig,
        reply: oneshot::Sender<ValveResult<ValveStatus>>,
    },
    UpdateSignal {
        value: f64,
        reply: oneshot::Sender<ValveStatus>,
    },
    Stats {
        reply: oneshot::Sender<RegulatorStats>,
    },
    Shutdown {
        reply: oneshot::Sender<LeaseRegistry>,
    },
}

struct Waiter {
    holder: HolderId,
    reply: oneshot::Sender<LeaseToken>,
}

pub struct Regulator {
    valve: Box<dyn Valve>,
    monitor: Arc<LeaseMonitor>,
    waiters: VecDeque<Waiter>,
    status: ValveStatus,
    wake_at: Option<Instant>,
}

impl Regulator {
    /// Initialize a valve of `kind` over `registry` and spawn the regulator
    /// loop on the current tokio runtime.
    ///
    /// Leases in a handed-over registry are adopted but not watched: their
    /// holders belonged to the previous instance and end through
    /// [`RegulatorHandle::release`] or [`RegulatorHandle::extend`].
    pub fn spawn(
        kind: ValveKind,
        registry: LeaseRegistry,
        valve_config: ValveConfig,
        config: RegulatorConfig,
    ) -> RegulatorResult<RegulatorHandle> {
        config.validate()?;

        let (monitor, down_rx) = LeaseMonitor::new();
        let watcher: Arc<dyn HolderMonitor> = monitor.clone();
        let (valve, transition) =
            kind.initialize(registry, valve_config, watcher, Instant::now())?;

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);

        let regulator = Self {
            valve,
            monitor: monitor.clone(),
            waiters: VecDeque::new(),
            status: transition.status,
            wake_at: transition.wake_at,
        };

        tracing::info!(
            kind = ?kind,
            size = regulator.valve.size(),
            status = %regulator.status,
            command_buffer = config.command_buffer,
            "Regulator started"
        );

        tokio::spawn(regulator.run(cmd_rx, down_rx));

        Ok(RegulatorHandle { cmd_tx, monitor })
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut down_rx: mpsc::UnboundedReceiver<DownNotice>,
    ) {
        let shutdown_reply = loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(cmd) => self.handle(cmd),
                    None => {
                        tracing::info!("All regulator handles dropped");
                        break None;
                    }
                },
                Some(notice) = down_rx.recv() => self.holder_down(notice),
                _ = sleep_until(self.wake_at) => {
                    let transition = self.valve.on_wake(Instant::now());
                    self.apply(transition);
                }
            }
            self.dispatch();
        };

        // Holders that went down before shutdown was requested must not be
        // handed over as live leases.
        while let Ok(notice) = down_rx.try_recv() {
            self.holder_down(notice);
        }

        let registry = self.terminate();
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(registry);
        }
    }

    fn handle(&mut self, cmd: Command) {
        let now = Instant::now();
        match cmd {
            Command::Ask { holder, reply } => {
                if !self.status.is_open() || !self.waiters.is_empty() {
                    tracing::debug!(
                        holder = %holder,
                        waiting = self.waiters.len() + 1,
                        "Valve closed, request queued"
                    );
                }
                self.waiters.push_back(Waiter { holder, reply });
            }
            Command::Release { token, reply } => {
                let (outcome, transition) = self.valve.release(token, now);
                self.apply(transition);
                let _ = reply.send(outcome);
            }
            Command::Extend { token, reply } => {
                let (outcome, transition) = self.valve.extend(token, now);
                self.apply(transition);
                let _ = reply.send(outcome);
            }
            Command::Reconfigure { config, reply } => {
                let result = self.valve.reconfigure(config, now).map(|transition| {
                    self.apply(transition);
                    transition.status
                });
                if let Err(e) = &result {
                    log_error(e);
                }
                let _ = reply.send(result);
            }
            Command::UpdateSignal { value, reply } => {
                let transition = self.valve.update_signal(value, now);
                self.apply(transition);
                let _ = reply.send(transition.status);
            }
            Command::Stats { reply } => {
                let _ = reply.send(RegulatorStats {
                    size: self.valve.size(),
                    status: self.status,
                    waiting: self.waiters.len(),
                });
            }
            // Intercepted by the loop.
            Command::Shutdown { .. } => {}
        }
    }

    fn holder_down(&mut self, notice: DownNotice) {
        if let Some(event) = self.monitor.accept(notice) {
            let transition = self.valve.notify(event, Instant::now());
            self.apply(transition);
        }
    }

    /// Admit queued requesters, oldest first, while the valve stays open.
    fn dispatch(&mut self) {
        while self.status.is_open() {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            if waiter.reply.is_closed() {
                tracing::trace!(holder = %waiter.holder, "Requester gone before admission");
                continue;
            }

            let now = Instant::now();
            let token = self.monitor.watch(waiter.holder);
            let transition = self.valve.admit(token, waiter.holder, now);
            self.apply(transition);

            if waiter.reply.send(token).is_err() {
                tracing::debug!(token = %token, "Requester gone during admission, releasing");
                let (_, transition) = self.valve.release(token, now);
                self.apply(transition);
            }
        }
    }

    fn apply(&mut self, transition: Transition) {
        if transition.status != self.status {
            tracing::debug!(
                from = %self.status,
                to = %transition.status,
                size = self.valve.size(),
                "Valve status changed"
            );
        }
        self.status = transition.status;
        self.wake_at = transition.wake_at;
    }

    fn terminate(self) -> LeaseRegistry {
        let waiting = self.waiters.len();
        let registry = self.valve.terminate();
        tracing::info!(
            size = registry.len(),
            dropped_waiters = waiting,
            "Regulator stopped"
        );
        registry
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running regulator.
#[derive(Clone)]
pub struct RegulatorHandle {
    cmd_tx: mpsc::Sender<Command>,
    monitor: Arc<LeaseMonitor>,
}

impl RegulatorHandle {
    pub(crate) fn monitor(&self) -> &LeaseMonitor {
        &self.monitor
    }

    async fn send(&self, cmd: Command) -> RegulatorResult<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RegulatorError::Stopped)
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> RegulatorResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| RegulatorError::Stopped)
    }

    /// Wait for admission. Requests are served in arrival order.
    #[tracing::instrument(skip(self))]
    pub async fn ask(&self, holder: HolderId) -> RegulatorResult<Lease> {
        let token = self.call(|reply| Command::Ask { holder, reply }).await?;
        Ok(Lease::new(token, holder, self.clone()))
    }

    /// Release a lease by token. Prefer [`Lease::done`] for leases obtained
    /// through [`ask`](Self::ask).
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, token: LeaseToken) -> RegulatorResult<ReleaseOutcome> {
        self.call(|reply| Command::Release { token, reply }).await
    }

    pub(crate) async fn send_release(
        &self,
        token: LeaseToken,
    ) -> RegulatorResult<oneshot::Receiver<ReleaseOutcome>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Release { token, reply }).await?;
        Ok(rx)
    }

    #[tracing::instrument(skip(self))]
    pub async fn extend(&self, token: LeaseToken) -> RegulatorResult<ExtendOutcome> {
        self.call(|reply| Command::Extend { token, reply }).await
    }

    /// Apply a new valve configuration; the last one applied wins.
    #[tracing::instrument(skip(self))]
    pub async fn reconfigure(&self, config: ValveConfig) -> RegulatorResult<ValveStatus> {
        let result = self
            .call(|reply| Command::Reconfigure { config, reply })
            .await?;
        Ok(result?)
    }

    pub async fn update_signal(&self, value: f64) -> RegulatorResult<ValveStatus> {
        self.call(|reply| Command::UpdateSignal { value, reply })
            .await
    }

    pub async fn stats(&self) -> RegulatorResult<RegulatorStats> {
        self.call(|reply| Command::Stats { reply }).await
    }

    pub async fn size(&self) -> RegulatorResult<usize> {
        Ok(self.stats().await?.size)
    }

    pub async fn status(&self) -> RegulatorResult<ValveStatus> {
        Ok(self.stats().await?.status)
    }

    /// Stop the regulator and hand back the valve's registry.
    pub async fn shutdown(&self) -> RegulatorResult<LeaseRegistry> {
        tracing::info!("Initiating regulator shutdown");
        self.call(|reply| Command::Shutdown { reply }).await
    }
}

#[async_trait]
impl CapacityGate for RegulatorHandle {
    async fn can_accept_task(&self) -> bool {
        matches!(self.status().await, Ok(ValveStatus::Open))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RegulatorConfig::default();
        assert_eq!(config.command_buffer, DEFAULT_COMMAND_BUFFER);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_command_buffer_is_rejected() {
        let config = RegulatorConfig { command_buffer: 0 };
        assert!(matches!(
            config.validate(),
            Err(RegulatorError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn sleep_until_without_deadline_never_fires() {
        let fired = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            sleep_until(None),
        )
        .await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn sleep_until_past_deadline_fires() {
        let fired = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            sleep_until(Some(Instant::now())),
        )
        .await;
        assert!(fired.is_ok());
    }
}
