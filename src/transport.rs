//! Request/response transport to the monitoring server
//!
//! The active-agent protocol is strictly one request and one response per TCP
//! connection, so every exchange opens a fresh connection and closes it afterwards.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{instrument, trace};

use crate::{
    error::{SimError, SimResult},
    protocol::{self, HEADER_LEN},
};

/// Default bound on a whole exchange (connect, write and read)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can carry one framed request to an address and return the
/// framed response
///
/// Implementations must be `Send + Sync` since the scheduler holds one behind an
/// `Arc` and uses it from spawned tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `message` to `address` and return the complete response frame.
    async fn exchange(&self, address: &str, message: &[u8]) -> SimResult<Vec<u8>>;
}

/// TCP transport opening one connection per exchange
#[derive(Debug, Clone)]
pub struct SessionClient {
    timeout: Duration,
}

impl Default for SessionClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl SessionClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn round_trip(address: &str, message: &[u8]) -> SimResult<Vec<u8>> {
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|e| SimError::Transport(format!("connect to {address}: {e}")))?;

        trace!("sending {} bytes", message.len());
        stream
            .write_all(message)
            .await
            .map_err(|e| SimError::Transport(format!("write to {address}: {e}")))?;

        let mut header = [0u8; HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| read_error(address, "header", e))?;

        let length = protocol::parse_header(&header)?;
        let length = usize::try_from(length)
            .map_err(|_| SimError::Protocol(format!("payload length {length} too large")))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + length);
        frame.extend_from_slice(&header);
        frame.resize(HEADER_LEN + length, 0);

        stream
            .read_exact(&mut frame[HEADER_LEN..])
            .await
            .map_err(|e| read_error(address, "payload", e))?;

        trace!("received {} bytes", frame.len());

        // the response is complete, a failed shutdown changes nothing
        let _ = stream.shutdown().await;

        Ok(frame)
    }
}

/// A peer closing the connection before a whole frame arrived broke the protocol;
/// anything else went wrong on the network.
fn read_error(address: &str, part: &str, err: std::io::Error) -> SimError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            SimError::Protocol(format!("{address} closed the connection mid-frame ({part})"))
        }
        _ => SimError::Transport(format!("read {part} from {address}: {err}")),
    }
}

#[async_trait]
impl Transport for SessionClient {
    #[instrument(skip(self, message), fields(len = message.len()))]
    async fn exchange(&self, address: &str, message: &[u8]) -> SimResult<Vec<u8>> {
        tokio::time::timeout(self.timeout, Self::round_trip(address, message))
            .await
            .map_err(|_| {
                SimError::Transport(format!(
                    "exchange with {address} timed out after {:?}",
                    self.timeout
                ))
            })?
    }
}
