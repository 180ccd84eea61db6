//! Durations written as `30s`, `15m`, `72h`, `1d` or bare seconds.

use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serializer};

pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();

    let secs = if let Some(days) = s.strip_suffix('d') {
        scaled(days, 86400, "days")
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600, "hours")
    } else if let Some(minutes) = s.strip_suffix('m') {
        scaled(minutes, 60, "minutes")
    } else if let Some(secs) = s.strip_suffix('s') {
        scaled(secs, 1, "seconds")
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid duration: {}. Use format like '30s', '15m', '1h'", s))
    }?;

    Ok(Duration::from_secs(secs))
}

fn scaled(value: &str, unit_secs: u64, unit: &str) -> Result<u64, String> {
    let count = value
        .parse::<u64>()
        .map_err(|_| format!("Invalid {}: {}", unit, value))?;
    count
        .checked_mul(unit_secs)
        .ok_or_else(|| format!("Duration too large: {} {}", value, unit))
}

/// Format for display, using the largest unit that divides evenly.
pub fn format(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 86400 && secs % 86400 == 0 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*duration))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Text(text) => parse(&text).map_err(de::Error::custom),
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
    }
}
