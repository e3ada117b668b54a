//! Loader for recorded item data
//!
//! A recording maps host names to their captured items, split by monitoring kind:
//!
//! ```yaml
//! web01:
//!   active:
//!   - key_: agent.ping
//!     name: Agent ping
//!     value_type: '3'
//!     lastvalue: '1'
//!     delay: 10
//!   passive:
//!   - key_: system.uptime
//!     ...
//! ```
//!
//! Only active items are scheduled. Passive items are parsed so a recording
//! containing them loads cleanly, but they are never sent.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::{
    Host, Item, ValueType,
    error::{SimError, SimResult},
    interval::parse_interval,
};

/// A YAML scalar as the recorder may have written it
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Unsigned(v) => v.to_string(),
            Scalar::Signed(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Bool(v) => v.to_string(),
            Scalar::Text(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordedHost {
    #[serde(default)]
    active: Vec<RecordedItem>,

    #[serde(default)]
    passive: Vec<RecordedItem>,
}

#[derive(Debug, Deserialize)]
struct RecordedItem {
    key_: String,

    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    value_type: Option<Scalar>,

    #[serde(default)]
    lastvalue: Option<Scalar>,

    delay: Scalar,
}

impl RecordedItem {
    fn into_item(self) -> SimResult<Item> {
        let interval = match self.delay {
            Scalar::Unsigned(seconds) => seconds,
            Scalar::Text(text) => parse_interval(&text)?,
            other => {
                return Err(SimError::Configuration(format!(
                    "item '{}' has an invalid delay {other:?}",
                    self.key_
                )));
            }
        };

        let value_type = match self.value_type {
            None => ValueType::Text,
            Some(Scalar::Unsigned(n)) => ValueType::try_from(n)?,
            Some(Scalar::Text(text)) => {
                let n = text.trim().parse::<u64>().map_err(|_| {
                    SimError::Configuration(format!(
                        "item '{}' has an invalid value type '{text}'",
                        self.key_
                    ))
                })?;
                ValueType::try_from(n)?
            }
            Some(other) => {
                return Err(SimError::Configuration(format!(
                    "item '{}' has an invalid value type {other:?}",
                    self.key_
                )));
            }
        };

        let name = self.name.unwrap_or_else(|| self.key_.clone());
        let last_value = self.lastvalue.map(Scalar::into_text).unwrap_or_default();

        Item::new(self.key_, name, value_type, last_value, interval)
    }
}

/// Read and validate a recording file.
pub fn load_recording(path: impl AsRef<Path>) -> SimResult<Vec<Host>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        SimError::Configuration(format!("cannot read recording {}: {e}", path.display()))
    })?;

    parse_recording(&text).inspect(|hosts| {
        debug!(
            "loaded {} host(s) from {}",
            hosts.len(),
            path.display()
        )
    })
}

/// Parse a recording from its YAML text.
///
/// Fails if the recording has no hosts, if any active item is malformed, or if a
/// host lists the same key twice.
pub fn parse_recording(text: &str) -> SimResult<Vec<Host>> {
    let recorded: BTreeMap<String, RecordedHost> = serde_yaml::from_str(text)?;

    if recorded.is_empty() {
        return Err(SimError::Configuration(
            "recording contains no hosts".to_string(),
        ));
    }

    let mut hosts = Vec::with_capacity(recorded.len());

    for (name, recorded_host) in recorded {
        if !recorded_host.passive.is_empty() {
            debug!(
                "{name}: ignoring {} passive item(s)",
                recorded_host.passive.len()
            );
        }

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(recorded_host.active.len());

        for recorded_item in recorded_host.active {
            let item = recorded_item.into_item().map_err(|e| match e {
                SimError::Configuration(msg) => {
                    SimError::Configuration(format!("host '{name}': {msg}"))
                }
                other => other,
            })?;

            if !seen.insert(item.key.clone()) {
                return Err(SimError::Configuration(format!(
                    "host '{name}' lists item '{}' more than once",
                    item.key
                )));
            }

            trace!("{name}: {} every {}s", item.key, item.interval_seconds);
            items.push(item);
        }

        if items.is_empty() {
            warn!("{name}: no active items recorded, nothing will be sent for this host");
        }

        hosts.push(Host::new(name, items));
    }

    Ok(hosts)
}
