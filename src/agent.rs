//! Active agent impersonation
//!
//! An [`ActiveAgent`] talks to the monitoring server the way a real active agent
//! does: it asks which checks a host should run and pushes batches of values,
//! tagging each batch with a session identifier that only advances when the
//! server acknowledges the batch.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, trace, warn};

use crate::{
    Item,
    error::SimResult,
    protocol::{
        self, ActiveChecksRequest, ActiveChecksResponse, AgentDataRequest, AgentDataResponse,
        ServerResponse,
    },
    transport::Transport,
};

/// Session identifier sent with every agent-data batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Session(u64);

impl Session {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Start from a random point, like an agent that just came up.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    fn advance(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Fixed-width decimal, 20 digits
impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020}", self.0)
    }
}

/// Interval the server declared for one item key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCheck {
    pub key: String,
    pub interval_seconds: u64,
}

/// Client side of the active-agent conversation with one server
///
/// Clones share the transport but count their sessions independently.
#[derive(Clone)]
pub struct ActiveAgent {
    server_address: String,
    transport: Arc<dyn Transport>,
    session: Session,
}

impl ActiveAgent {
    pub fn new(
        server_address: impl Into<String>,
        transport: Arc<dyn Transport>,
        session: Session,
    ) -> Self {
        Self {
            server_address: server_address.into(),
            transport,
            session,
        }
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    pub fn session(&self) -> Session {
        self.session
    }

    async fn request<Req, Resp>(&self, request: &Req) -> SimResult<Resp>
    where
        Req: Serialize + fmt::Debug,
        Resp: DeserializeOwned + ServerResponse,
    {
        trace!("request {request:?}");
        let message = protocol::encode(request)?;
        let frame = self
            .transport
            .exchange(&self.server_address, &message)
            .await?;
        let response: Resp = protocol::decode(&frame)?;
        response.ensure_success()?;
        Ok(response)
    }

    /// Ask the server which items `host` should report and how often.
    ///
    /// Entries whose interval cannot be understood (user macros, zero) are
    /// skipped. Item state is not touched here.
    #[instrument(skip(self))]
    pub async fn refresh_checks(&self, host: &str) -> SimResult<Vec<ServerCheck>> {
        let response: ActiveChecksResponse =
            self.request(&ActiveChecksRequest::new(host)).await?;

        let checks = response
            .data
            .into_iter()
            .filter_map(|check| match check.delay.seconds() {
                Ok(0) => {
                    warn!("{}: server declared a zero interval, skipping", check.key);
                    None
                }
                Ok(interval_seconds) => {
                    trace!("{} {}", check.key, interval_seconds);
                    Some(ServerCheck {
                        key: check.key,
                        interval_seconds,
                    })
                }
                Err(e) => {
                    warn!("{}: {e}, skipping", check.key);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("server declared {} active check(s)", checks.len());
        Ok(checks)
    }

    /// Send the values of `due_items` for `host`.
    ///
    /// Nothing is sent when `due_items` is empty and `Ok(None)` is returned.
    /// Otherwise returns the server's acknowledgement text. The session only
    /// advances once the server has accepted the batch.
    #[instrument(skip(self, due_items), fields(items = due_items.len()))]
    pub async fn report_data(&mut self, host: &str, due_items: &[Item]) -> SimResult<Option<String>> {
        if due_items.is_empty() {
            trace!("nothing due");
            return Ok(None);
        }

        let clock = Utc::now().timestamp();
        let request = AgentDataRequest::new(self.session.to_string(), host, due_items, clock);
        let response: AgentDataResponse = self.request(&request).await?;

        self.session.advance();

        let info = response.info.unwrap_or_default();
        debug!("server acknowledged: {info}");
        Ok(Some(info))
    }
}
