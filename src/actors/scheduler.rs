//! HostActor - Replays one host's recorded values on the active-agent schedule
//!
//! Every host gets its own actor owning the host's item table and its own
//! [`ActiveAgent`] (and with it the session counter). Each actor polls two
//! timers alongside its command queue:
//!
//! ```text
//! send timer    (every send_interval)    ─┐
//! refresh timer (every refresh_interval) ─┼→ HostActor "web01" → ActiveAgent → server
//! SchedulerHandle (SendNow, SetValue, ...)─┘
//!                                       ... one actor per host, all independent
//! ```
//!
//! Because every mutation of a host goes through its actor, countdowns and
//! session increments are never raced by the two timers. Because hosts do not
//! share an actor, a peer stalling one host's exchange never delays another
//! host, and ticks that fall due while an actor is busy are skipped rather than
//! queued up and fired in a burst.
//!
//! ## Item countdown
//!
//! ```text
//! WAITING (remaining > 0) ──tick──▶ DUE (remaining <= 0) ──reset──▶ WAITING (remaining = interval)
//! ```
//!
//! A failing exchange is logged and skipped; the following cycles are unaffected
//! and nothing is retried.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{Host, Item, agent::ActiveAgent, agent::ServerCheck, error::SimError};

use super::messages::{CycleReport, EngineSnapshot, HostCommand, HostOutcome, HostSnapshot};

/// Shortest period either timer runs at
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Periods of the two timer-driven activities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub send_interval: Duration,
    pub refresh_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_secs(5),
            refresh_interval: Duration::from_secs(120),
        }
    }
}

impl Timing {
    /// Seconds every countdown is advanced by on one send cycle
    pub fn send_step(&self) -> u64 {
        self.send_interval.as_secs().max(1)
    }

    pub fn send_period(&self) -> Duration {
        self.send_interval.max(MIN_PERIOD)
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh_interval.max(MIN_PERIOD)
    }
}

/// Repeating timer whose first tick fires one full period after start.
///
/// Ticks missed while the actor is busy are skipped rather than fired in a burst.
fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

/// Actor driving the simulation of a single host
pub struct HostActor {
    host: Host,

    agent: ActiveAgent,

    /// Countdown step per send cycle, in seconds
    send_step: u64,

    send_timer: Option<Interval>,

    refresh_timer: Option<Interval>,

    command_rx: mpsc::Receiver<HostCommand>,
}

impl HostActor {
    /// Create an actor without timers; cycles only run on command.
    pub fn new(
        host: Host,
        agent: ActiveAgent,
        send_step: u64,
        command_rx: mpsc::Receiver<HostCommand>,
    ) -> Self {
        Self {
            host,
            agent,
            send_step: send_step.max(1),
            send_timer: None,
            refresh_timer: None,
            command_rx,
        }
    }

    /// Arm both timers. The first ticks fire one period from now.
    pub fn with_timers(mut self, timing: Timing) -> Self {
        self.send_step = timing.send_step();
        self.send_timer = Some(ticker(timing.send_period()));
        self.refresh_timer = Some(ticker(timing.refresh_period()));
        self
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command arrives or every sender is dropped.
    /// Pending commands are served before timer ticks.
    #[instrument(skip(self), fields(host = %self.host.name))]
    pub async fn run(mut self) {
        debug!(
            "starting with {} item(s), session {}",
            self.host.items.len(),
            self.agent.session()
        );

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        trace!("all handles dropped");
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }

                _ = next_tick(&mut self.send_timer) => {
                    self.send_cycle().await;
                }

                _ = next_tick(&mut self.refresh_timer) => {
                    self.refresh_cycle().await;
                }
            }
        }

        debug!("stopped at session {}", self.agent.session());
    }

    /// Returns `false` once the actor should stop.
    async fn handle_command(&mut self, cmd: HostCommand) -> bool {
        match cmd {
            HostCommand::SendNow { respond_to } => {
                debug!("received SendNow command");
                let outcome = self.send_cycle().await;
                let _ = respond_to.send(outcome);
            }

            HostCommand::SendAll { respond_to } => {
                debug!("received SendAll command");
                let items = self.host.items.clone();
                let outcome = self.report(&items).await;
                let _ = respond_to.send(outcome);
            }

            HostCommand::RefreshNow { respond_to } => {
                debug!("received RefreshNow command");
                let outcome = self.refresh_cycle().await;
                let _ = respond_to.send(outcome);
            }

            HostCommand::SendItemNow { key, respond_to } => {
                let result = self.send_item(&key).await;
                let _ = respond_to.send(result);
            }

            HostCommand::SetValue {
                key,
                value,
                respond_to,
            } => {
                let result = self.set_value(&key, value);
                let _ = respond_to.send(result);
            }

            HostCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(HostSnapshot {
                    session: self.agent.session(),
                    host: self.host.clone(),
                });
            }

            HostCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }

        true
    }

    /// Advance every countdown and report whatever became due.
    async fn send_cycle(&mut self) -> HostOutcome {
        let due = self.host.tick(self.send_step);
        self.report(&due).await
    }

    async fn report(&mut self, items: &[Item]) -> HostOutcome {
        match self.agent.report_data(&self.host.name, items).await {
            Ok(None) => HostOutcome::Idle,
            Ok(Some(info)) => {
                info!("{}: sent {} value(s): {info}", self.host.name, items.len());
                HostOutcome::Sent {
                    items: items.len(),
                    info,
                }
            }
            Err(e) => {
                log_failure(&self.host.name, "send", &e);
                HostOutcome::Failed(e)
            }
        }
    }

    /// Fetch active checks and adopt the server's intervals.
    async fn refresh_cycle(&mut self) -> HostOutcome {
        match self.agent.refresh_checks(&self.host.name).await {
            Ok(checks) => {
                let updated = apply_checks(&mut self.host, &checks);
                debug!(
                    "{}: {} check(s) from server, {updated} interval(s) changed",
                    self.host.name,
                    checks.len()
                );
                HostOutcome::Refreshed {
                    checks: checks.len(),
                    updated,
                }
            }
            Err(e) => {
                log_failure(&self.host.name, "refresh", &e);
                HostOutcome::Failed(e)
            }
        }
    }

    async fn send_item(&mut self, key: &str) -> Result<String> {
        let item = self
            .host
            .item(key)
            .ok_or_else(|| anyhow!("host '{}' has no item '{key}'", self.host.name))?
            .clone();

        let info = self
            .agent
            .report_data(&self.host.name, std::slice::from_ref(&item))
            .await
            .with_context(|| format!("failed to send {key} for {}", self.host.name))?;

        Ok(info.unwrap_or_default())
    }

    fn set_value(&mut self, key: &str, value: String) -> Result<()> {
        let host_name = &self.host.name;
        let item = self
            .host
            .items
            .iter_mut()
            .find(|item| item.key == key)
            .ok_or_else(|| anyhow!("host '{host_name}' has no item '{key}'"))?;

        debug!("{host_name}: {key} = {value:?} (was {:?})", item.last_value);
        item.last_value = value;
        Ok(())
    }
}

/// Adopt server-declared intervals for the host's items, returning how many changed.
///
/// Keys the server does not mention keep their recorded interval.
fn apply_checks(host: &mut Host, checks: &[ServerCheck]) -> usize {
    let mut updated = 0;

    for item in host.items.iter_mut() {
        match checks.iter().find(|check| check.key == item.key) {
            Some(check) => {
                if item.apply_interval(check.interval_seconds) {
                    trace!("{}: {} now every {}s", host.name, item.key, item.interval_seconds);
                    updated += 1;
                }
            }
            None => debug!("{}: server does not expect {}", host.name, item.key),
        }
    }

    updated
}

fn log_failure(host: &str, activity: &str, err: &SimError) {
    if err.is_protocol() {
        error!("{host}: {activity} failed: {err}");
    } else {
        warn!("{host}: {activity} failed: {err}");
    }
}

async fn request<T>(
    sender: &mpsc::Sender<HostCommand>,
    build: impl FnOnce(oneshot::Sender<T>) -> HostCommand,
    name: &str,
) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    sender
        .send(build(tx))
        .await
        .with_context(|| format!("failed to send {name} command"))?;

    rx.await.context("failed to receive response")
}

/// Handle for controlling a running simulation
///
/// Cloneable; all clones control the same host actors.
#[derive(Clone)]
pub struct SchedulerHandle {
    /// Command queue of every host actor, in host order
    hosts: Arc<Vec<(String, mpsc::Sender<HostCommand>)>>,
}

impl SchedulerHandle {
    /// Spawn one actor per host, each with its own send and refresh timers.
    ///
    /// Every actor gets its own clone of `agent`, so sessions advance per host.
    pub fn spawn(agent: ActiveAgent, hosts: Vec<Host>, timing: Timing) -> Self {
        Self::spawn_with(agent, hosts, |actor| actor.with_timers(timing))
    }

    /// Spawn the actors without timers; cycles only run through `send_now` and
    /// `refresh_now`, each send advancing countdowns by `send_step` seconds.
    pub fn spawn_manual(agent: ActiveAgent, hosts: Vec<Host>, send_step: u64) -> Self {
        let step = send_step.max(1);
        Self::spawn_with(agent, hosts, |mut actor| {
            actor.send_step = step;
            actor
        })
    }

    fn spawn_with(
        agent: ActiveAgent,
        hosts: Vec<Host>,
        configure: impl Fn(HostActor) -> HostActor,
    ) -> Self {
        let senders = hosts
            .into_iter()
            .map(|host| {
                let (cmd_tx, cmd_rx) = mpsc::channel(32);
                let name = host.name.clone();
                let actor = configure(HostActor::new(host, agent.clone(), 1, cmd_rx));
                tokio::spawn(actor.run());
                (name, cmd_tx)
            })
            .collect();

        Self {
            hosts: Arc::new(senders),
        }
    }

    fn sender(&self, host: &str) -> Result<&mpsc::Sender<HostCommand>> {
        self.hosts
            .iter()
            .find(|(name, _)| name == host)
            .map(|(_, sender)| sender)
            .ok_or_else(|| anyhow!("unknown host '{host}'"))
    }

    /// Send the same command to every host at once and collect the outcomes.
    async fn broadcast(
        &self,
        build: fn(oneshot::Sender<HostOutcome>) -> HostCommand,
        name: &str,
    ) -> Result<CycleReport> {
        let outcomes = join_all(self.hosts.iter().map(|(host, sender)| async move {
            request(sender, build, name)
                .await
                .map(|outcome| (host.clone(), outcome))
        }))
        .await;

        Ok(CycleReport {
            hosts: outcomes.into_iter().collect::<Result<_>>()?,
        })
    }

    /// Run one send cycle on every host now, as if the send timer had fired.
    pub async fn send_now(&self) -> Result<CycleReport> {
        self.broadcast(|respond_to| HostCommand::SendNow { respond_to }, "SendNow")
            .await
    }

    /// Report every item of every host now, whatever its countdown.
    pub async fn send_all_now(&self) -> Result<CycleReport> {
        self.broadcast(|respond_to| HostCommand::SendAll { respond_to }, "SendAll")
            .await
    }

    /// Refresh active checks for every host now.
    pub async fn refresh_now(&self) -> Result<CycleReport> {
        self.broadcast(
            |respond_to| HostCommand::RefreshNow { respond_to },
            "RefreshNow",
        )
        .await
    }

    /// Report one item immediately and return the server's acknowledgement.
    pub async fn send_item_now(&self, host: &str, key: &str) -> Result<String> {
        request(
            self.sender(host)?,
            |respond_to| HostCommand::SendItemNow {
                key: key.to_string(),
                respond_to,
            },
            "SendItemNow",
        )
        .await?
    }

    /// Override the value replayed for an item from now on.
    pub async fn set_value(&self, host: &str, key: &str, value: impl Into<String>) -> Result<()> {
        request(
            self.sender(host)?,
            |respond_to| HostCommand::SetValue {
                key: key.to_string(),
                value: value.into(),
                respond_to,
            },
            "SetValue",
        )
        .await?
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let snapshots = join_all(self.hosts.iter().map(|(_, sender)| {
            request(
                sender,
                |respond_to| HostCommand::Snapshot { respond_to },
                "Snapshot",
            )
        }))
        .await;

        Ok(EngineSnapshot {
            hosts: snapshots.into_iter().collect::<Result<_>>()?,
        })
    }

    /// Stop every host actor together with its timers.
    ///
    /// An actor in the middle of an exchange stops once the exchange ends.
    pub async fn shutdown(&self) -> Result<()> {
        for (host, sender) in self.hosts.iter() {
            sender
                .send(HostCommand::Shutdown)
                .await
                .with_context(|| format!("failed to send Shutdown command to {host}"))?;
        }
        Ok(())
    }
}

/// Result of [`run_once`]
#[derive(Debug)]
pub struct OnceReport {
    pub refresh: CycleReport,
    pub send: CycleReport,
    pub snapshot: EngineSnapshot,
}

/// Refresh every host's checks, report every item once and stop.
pub async fn run_once(agent: ActiveAgent, hosts: Vec<Host>) -> Result<OnceReport> {
    let handle = SchedulerHandle::spawn_manual(agent, hosts, Timing::default().send_step());

    let refresh = handle.refresh_now().await?;
    let send = handle.send_all_now().await?;
    let snapshot = handle.snapshot().await?;

    handle.shutdown().await?;

    Ok(OnceReport {
        refresh,
        send,
        snapshot,
    })
}
