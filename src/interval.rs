//! Item interval parsing
//!
//! Intervals arrive either as a bare number of seconds or as a number with a
//! single unit suffix (`s`, `m`, `h`, `d`, `w`).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{SimError, SimResult};

static INTERVAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)([smhdw]?)$").unwrap_or_else(|e| panic!("invalid interval pattern: {e}"))
});

fn seconds_per_unit(unit: &str) -> u64 {
    match unit {
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => 1,
    }
}

/// Convert an interval string into whole seconds.
///
/// `"30"` → 30, `"5m"` → 300, `"2h"` → 7200, `"1d"` → 86400, `"1w"` → 604800.
///
/// Anything after a `;` (flexible or scheduling intervals) is ignored, so
/// `"30s;10/1-5,09:00-18:00"` yields 30.
pub fn parse_interval(text: &str) -> SimResult<u64> {
    let base = text.split(';').next().unwrap_or_default().trim();

    let captures = INTERVAL_PATTERN
        .captures(base)
        .ok_or_else(|| SimError::Configuration(format!("invalid interval '{text}'")))?;

    let amount: u64 = captures[1]
        .parse()
        .map_err(|_| SimError::Configuration(format!("interval '{text}' is out of range")))?;

    amount
        .checked_mul(seconds_per_unit(&captures[2]))
        .ok_or_else(|| SimError::Configuration(format!("interval '{text}' is out of range")))
}
