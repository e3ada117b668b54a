//! Message types for the host actors
//!
//! Every simulated host is driven by its own actor, which owns the host's items
//! and the agent session. Callers never touch that state directly; they send a
//! [`HostCommand`] and, where a result is needed, wait on a oneshot reply.

use serde::Serialize;
use tokio::sync::oneshot;

use crate::{Host, agent::Session, error::SimError};

/// Commands accepted by a HostActor
///
/// Timer ticks are not commands: each actor polls its own timers, so ticks that
/// arrive while it is busy are skipped instead of queued.
#[derive(Debug)]
pub enum HostCommand {
    /// Run a send cycle immediately (advances every countdown by one step)
    SendNow {
        respond_to: oneshot::Sender<HostOutcome>,
    },

    /// Report every item regardless of its countdown, leaving countdowns untouched
    SendAll {
        respond_to: oneshot::Sender<HostOutcome>,
    },

    /// Refresh active checks immediately
    RefreshNow {
        respond_to: oneshot::Sender<HostOutcome>,
    },

    /// Report a single item right away, leaving its countdown untouched
    SendItemNow {
        key: String,
        respond_to: oneshot::Sender<anyhow::Result<String>>,
    },

    /// Replace the value replayed for an item
    SetValue {
        key: String,
        value: String,
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Copy of the host's items and session
    Snapshot {
        respond_to: oneshot::Sender<HostSnapshot>,
    },

    /// Stop the actor and its timers
    Shutdown,
}

/// What happened to one host during a cycle
#[derive(Debug)]
pub enum HostOutcome {
    /// No item was due, nothing was sent
    Idle,

    /// Values were accepted by the server
    Sent { items: usize, info: String },

    /// Active checks were fetched and applied
    Refreshed { checks: usize, updated: usize },

    /// The exchange failed; the next cycle will try again
    Failed(SimError),
}

/// Per-host results of one send or refresh cycle, in host order
#[derive(Debug, Default)]
pub struct CycleReport {
    pub hosts: Vec<(String, HostOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, host: &str) -> Option<&HostOutcome> {
        self.hosts
            .iter()
            .find(|(name, _)| name == host)
            .map(|(_, outcome)| outcome)
    }

    /// Number of items the server accepted during the cycle
    pub fn items_sent(&self) -> usize {
        self.hosts
            .iter()
            .map(|(_, outcome)| match outcome {
                HostOutcome::Sent { items, .. } => *items,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.hosts
            .iter()
            .filter(|(_, outcome)| matches!(outcome, HostOutcome::Failed(_)))
            .count()
    }
}

/// Current state of one host actor
#[derive(Debug, Clone, Serialize)]
pub struct HostSnapshot {
    #[serde(serialize_with = "serialize_session")]
    pub session: Session,

    #[serde(flatten)]
    pub host: Host,
}

fn serialize_session<S: serde::Serializer>(session: &Session, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(session)
}

/// Current state of the engine, hosts in name order
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineSnapshot {
    pub hosts: Vec<HostSnapshot>,
}

impl EngineSnapshot {
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts
            .iter()
            .map(|snapshot| &snapshot.host)
            .find(|host| host.name == name)
    }

    pub fn session(&self, name: &str) -> Option<Session> {
        self.hosts
            .iter()
            .find(|snapshot| snapshot.host.name == name)
            .map(|snapshot| snapshot.session)
    }
}
