//! Simulated workloads driven through a regulator.
//!
//! Each simulated holder asks for a lease, works for a while, re-validates its
//! lease halfway through and completes it. Every `crash_every`-th holder is
//! aborted mid-work instead, exercising crash-triggered release. An optional
//! live reconfiguration lowers the valve maximum while leases are held.

use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use sluice_core::{log_error, ExtendOutcome, HolderId, LeaseRegistry, ValveConfig, ValveKind};
use sluice_worker::{Regulator, RegulatorConfig, RegulatorHandle, RegulatorResult};

#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub valve: ValveConfig,
    pub regulator: RegulatorConfig,
    pub holders: usize,
    pub work: Duration,
    /// Abort every n-th holder while it holds its lease. 0 disables crashes.
    pub crash_every: usize,
    /// Maximum to apply after `reconfigure_after`, if any.
    pub lower_to: Option<ValveConfig>,
    pub reconfigure_after: Duration,
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct SimulationReport {
    pub admitted: usize,
    pub completed: usize,
    pub drained: usize,
    pub crashed: usize,
    pub outstanding_at_shutdown: usize,
}

enum HolderResult {
    Completed,
    Drained,
}

pub async fn run_simulation(config: SimulationConfig) -> Result<SimulationReport, anyhow::Error> {
    // A valve that can never open would leave holders queued forever.
    let never_opens = |valve: &ValveConfig| !valve.max.admits(0);
    if config.holders > 0
        && (never_opens(&config.valve) || config.lower_to.as_ref().is_some_and(never_opens))
    {
        anyhow::bail!("Simulation needs a valve maximum of at least 1");
    }

    let handle = Regulator::spawn(
        ValveKind::Capacity,
        LeaseRegistry::new(),
        config.valve,
        config.regulator.clone(),
    )
    .context("Failed to start regulator")?;

    tracing::info!(
        holders = config.holders,
        max = %config.valve.max,
        crash_every = config.crash_every,
        "Starting simulation"
    );

    if let Some(lower_to) = config.lower_to {
        let h = handle.clone();
        let delay = config.reconfigure_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match h.reconfigure(lower_to).await {
                Ok(status) => {
                    tracing::info!(max = %lower_to.max, status = %status, "Valve reconfigured")
                }
                Err(e) => log_error(&e),
            }
        });
    }

    let mut report = SimulationReport::default();
    let mut holders = JoinSet::new();

    for n in 1..=config.holders {
        let h = handle.clone();
        let work = config.work;
        let crashes = config.crash_every > 0 && n % config.crash_every == 0;
        let (admitted_tx, admitted_rx) = oneshot::channel();
        let abort = holders.spawn(run_holder(h, work, crashes, admitted_tx));
        if crashes {
            // Holders reach the regulator in any order; each crash waits only
            // on its own admission.
            tokio::spawn(async move {
                if admitted_rx.await.is_ok() {
                    abort.abort();
                }
            });
        }
    }

    // Aborted holders report down while their task is torn down, before the
    // join below observes it.
    while let Some(joined) = holders.join_next().await {
        match joined {
            Ok(Ok(HolderResult::Completed)) => report.completed += 1,
            Ok(Ok(HolderResult::Drained)) => report.drained += 1,
            Ok(Err(e)) => log_error(&e),
            Err(e) if e.is_cancelled() => report.crashed += 1,
            Err(e) => return Err(e).context("Holder task panicked"),
        }
    }

    report.admitted = report.completed + report.drained + report.crashed;
    let registry = handle
        .shutdown()
        .await
        .context("Failed to shut down regulator")?;
    report.outstanding_at_shutdown = registry.len();

    tracing::info!(
        admitted = report.admitted,
        completed = report.completed,
        drained = report.drained,
        crashed = report.crashed,
        outstanding = report.outstanding_at_shutdown,
        "Simulation finished"
    );
    Ok(report)
}

async fn run_holder(
    handle: RegulatorHandle,
    work: Duration,
    crashes: bool,
    admitted_tx: oneshot::Sender<()>,
) -> RegulatorResult<HolderResult> {
    let holder = HolderId::new();
    let mut lease = handle.ask(holder).await?;
    let _ = admitted_tx.send(());

    if crashes {
        // Parked until aborted; dropping the lease reports the holder down.
        std::future::pending::<()>().await;
    }

    tokio::time::sleep(work / 2).await;
    if lease.extend().await? == ExtendOutcome::Released {
        tracing::debug!(holder = %holder, "Lease drained while oversubscribed");
        return Ok(HolderResult::Drained);
    }
    tokio::time::sleep(work / 2).await;
    lease.done().await?;
    Ok(HolderResult::Completed)
}
