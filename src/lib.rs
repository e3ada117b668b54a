pub mod actors;
pub mod agent;
pub mod config;
pub mod error;
pub mod interval;
pub mod protocol;
pub mod recording;
pub mod transport;
pub mod util;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Port of the monitoring server's active-agent listener
pub const ACTIVE_PORT: u16 = 10051;

/// Kind of value an item carries, numbered the way the monitoring server numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Float,
    Character,
    Log,
    Unsigned,
    Text,
}

impl TryFrom<u64> for ValueType {
    type Error = SimError;

    fn try_from(value: u64) -> SimResult<Self> {
        match value {
            0 => Ok(ValueType::Float),
            1 => Ok(ValueType::Character),
            2 => Ok(ValueType::Log),
            3 => Ok(ValueType::Unsigned),
            4 => Ok(ValueType::Text),
            other => Err(SimError::Configuration(format!(
                "unknown value type {other}"
            ))),
        }
    }
}

/// One monitored metric replayed by the simulator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub key: String,
    pub name: String,
    pub value_type: ValueType,
    pub last_value: String,
    pub interval_seconds: u64,
    /// Countdown until the item is due again, always in `[0, interval_seconds]`
    pub remaining_seconds: u64,
}

impl Item {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        value_type: ValueType,
        last_value: impl Into<String>,
        interval_seconds: u64,
    ) -> SimResult<Self> {
        let key = key.into();
        if interval_seconds == 0 {
            return Err(SimError::Configuration(format!(
                "item '{key}' has a zero interval"
            )));
        }

        Ok(Self {
            key,
            name: name.into(),
            value_type,
            last_value: last_value.into(),
            interval_seconds,
            remaining_seconds: interval_seconds,
        })
    }

    /// Advance the countdown by `step` seconds.
    ///
    /// Returns `true` when the item is due for this cycle, in which case the
    /// countdown has already been reset to the full interval.
    pub fn tick(&mut self, step: u64) -> bool {
        let remaining = self.remaining_seconds.saturating_sub(step);
        if remaining == 0 {
            self.remaining_seconds = self.interval_seconds;
            true
        } else {
            self.remaining_seconds = remaining;
            false
        }
    }

    /// Adopt a new interval, keeping the countdown within it.
    ///
    /// Returns `true` if the interval actually changed.
    pub fn apply_interval(&mut self, interval_seconds: u64) -> bool {
        if interval_seconds == 0 || interval_seconds == self.interval_seconds {
            return false;
        }
        self.interval_seconds = interval_seconds;
        self.remaining_seconds = self.remaining_seconds.min(interval_seconds);
        true
    }
}

/// A simulated host and the active items it reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Host {
    pub name: String,
    pub items: Vec<Item>,
}

impl Host {
    pub fn new(name: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    /// Advance every item by `step` seconds and return the ones that became due,
    /// in item order.
    pub fn tick(&mut self, step: u64) -> Vec<Item> {
        self.items
            .iter_mut()
            .filter_map(|item| item.tick(step).then(|| item.clone()))
            .collect()
    }

    pub fn item(&self, key: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.key == key)
    }

    pub fn item_mut(&mut self, key: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.key == key)
    }
}
