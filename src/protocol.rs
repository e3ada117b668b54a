//! Framed wire protocol spoken with the monitoring server
//!
//! Every message in either direction has the same envelope:
//!
//! ```text
//! [0..5)          "ZBXD" 0x01     magic + protocol version
//! [5..13)         u64 LE          payload length in bytes
//! [13..13+len)    UTF-8 JSON      payload
//! ```
//!
//! Payloads are serialized from typed structs, so object keys always go out in
//! field declaration order.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Item,
    error::{SimError, SimResult},
    interval::parse_interval,
};

/// Magic bytes and protocol version that open every frame
pub const MAGIC: [u8; 5] = *b"ZBXD\x01";

/// Length of the magic plus the length field
pub const HEADER_LEN: usize = 13;

/// Largest payload accepted from a peer
pub const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

/// Serialize `payload` to compact JSON and wrap it in a frame.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> SimResult<Vec<u8>> {
    let json = serde_json::to_vec(payload)?;

    let mut frame = Vec::with_capacity(HEADER_LEN + json.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&(json.len() as u64).to_le_bytes());
    frame.extend_from_slice(&json);

    Ok(frame)
}

/// Validate a frame header and return the declared payload length.
pub fn parse_header(header: &[u8]) -> SimResult<u64> {
    if header.len() < HEADER_LEN {
        return Err(SimError::Protocol(format!(
            "frame too short: {} bytes",
            header.len()
        )));
    }

    if header[..MAGIC.len()] != MAGIC {
        return Err(SimError::Protocol(format!(
            "bad magic {:02x?}",
            &header[..MAGIC.len()]
        )));
    }

    let mut length = [0u8; 8];
    length.copy_from_slice(&header[MAGIC.len()..HEADER_LEN]);
    let length = u64::from_le_bytes(length);

    if length > MAX_PAYLOAD_LEN {
        return Err(SimError::Protocol(format!(
            "declared payload of {length} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit"
        )));
    }

    Ok(length)
}

/// Decode a complete frame into a payload.
///
/// The frame must contain exactly the number of payload bytes its header declares.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> SimResult<T> {
    let length = parse_header(frame)?;
    let payload = &frame[HEADER_LEN..];

    if payload.len() as u64 != length {
        return Err(SimError::Protocol(format!(
            "header declares {length} payload bytes but frame carries {}",
            payload.len()
        )));
    }

    Ok(serde_json::from_slice(payload)?)
}

/// Ask the server which items it expects from a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveChecksRequest {
    pub request: String,
    pub host: String,
}

impl ActiveChecksRequest {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            request: "active checks".to_string(),
            host: host.into(),
        }
    }
}

/// An interval as the server declares it: a number of seconds or a duration string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    Seconds(u64),
    Text(String),
}

impl Delay {
    pub fn seconds(&self) -> SimResult<u64> {
        match self {
            Delay::Seconds(seconds) => Ok(*seconds),
            Delay::Text(text) => parse_interval(text),
        }
    }
}

/// One item the server wants reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCheck {
    pub key: String,
    pub delay: Delay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveChecksResponse {
    pub response: String,

    #[serde(default)]
    pub data: Vec<ActiveCheck>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

/// A single value inside an agent-data submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentValue {
    pub host: String,
    pub key: String,
    pub value: String,
    pub id: u64,
    pub clock: i64,
    pub ns: u32,
}

/// Agent-data submission carrying the values due in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDataRequest {
    pub request: String,
    pub session: String,
    pub clock: i64,
    pub ns: u32,
    pub data: Vec<AgentValue>,
}

impl AgentDataRequest {
    /// Build a submission for `items` of `host`.
    ///
    /// Values get sequence ids starting at 1 in the order given.
    pub fn new(session: impl Into<String>, host: &str, items: &[Item], clock: i64) -> Self {
        let data = items
            .iter()
            .zip(1..)
            .map(|(item, id)| AgentValue {
                host: host.to_string(),
                key: item.key.clone(),
                value: item.last_value.clone(),
                id,
                clock,
                ns: 0,
            })
            .collect();

        Self {
            request: "agent data".to_string(),
            session: session.into(),
            clock,
            ns: 0,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDataResponse {
    pub response: String,

    #[serde(default)]
    pub info: Option<String>,
}

/// Responses expose whether the server accepted the request
pub trait ServerResponse {
    fn response(&self) -> &str;
    fn info(&self) -> Option<&str>;

    /// Turn a `"failed"` (or any non-success) response into a protocol error.
    fn ensure_success(&self) -> SimResult<()> {
        if self.response() == "success" {
            return Ok(());
        }
        Err(SimError::Protocol(format!(
            "server answered '{}': {}",
            self.response(),
            self.info().unwrap_or("no info")
        )))
    }
}

impl ServerResponse for ActiveChecksResponse {
    fn response(&self) -> &str {
        &self.response
    }

    fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }
}

impl ServerResponse for AgentDataResponse {
    fn response(&self) -> &str {
        &self.response
    }

    fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }
}
