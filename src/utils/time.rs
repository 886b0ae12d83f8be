use crate::core::error::ParseError;
use std::time::Duration;

const ISO_DATE_UNITS: &[(char, u64)] = &[('W', 604_800), ('D', 86_400)];
const ISO_TIME_UNITS: &[(char, u64)] = &[('H', 3_600), ('M', 60), ('S', 1)];
const COMPACT_UNITS: &[(char, u64)] = &[
    ('W', 604_800),
    ('D', 86_400),
    ('H', 3_600),
    ('M', 60),
    ('S', 1),
];

/// Parse a duration given as ISO-8601 (`P3D`, `PT1H30M`), as a compact
/// unit string (`3d`, `1h30m`) or as a plain number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let trimmed = input.trim();
    let invalid = || ParseError::InvalidDuration(input.to_string());

    if trimmed.is_empty() {
        return Err(invalid());
    }

    let seconds = if let Ok(seconds) = trimmed.parse::<f64>() {
        Some(seconds)
    } else if let Some(rest) = trimmed.strip_prefix(['P', 'p']) {
        parse_iso8601(rest)
    } else {
        parse_components(trimmed, COMPACT_UNITS)
    };

    seconds
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(invalid)
}

fn parse_iso8601(rest: &str) -> Option<f64> {
    let (date, time) = match rest.split_once(['T', 't']) {
        Some((date, time)) if !time.is_empty() => (date, Some(time)),
        Some(_) => return None,
        None => (rest, None),
    };

    let mut total = 0.0;
    if !date.is_empty() {
        total += parse_components(date, ISO_DATE_UNITS)?;
    } else if time.is_none() {
        return None;
    }
    if let Some(time) = time {
        total += parse_components(time, ISO_TIME_UNITS)?;
    }
    Some(total)
}

/// Sum `<number><unit>` pairs. Every number must carry a unit.
fn parse_components(input: &str, units: &[(char, u64)]) -> Option<f64> {
    let mut total = 0.0;
    let mut number = String::new();

    for ch in input.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
            continue;
        }

        let unit = ch.to_ascii_uppercase();
        let (_, scale) = units.iter().find(|(u, _)| *u == unit)?;
        if number.is_empty() {
            return None;
        }
        let value: f64 = number.parse().ok()?;
        total += value * *scale as f64;
        number.clear();
    }

    if number.is_empty() {
        Some(total)
    } else {
        None
    }
}

/// Render a duration as an ISO-8601 string, e.g. `P3DT2H`.
pub fn format_iso8601(duration: Duration) -> String {
    let total = duration.as_secs();
    let micros = duration.subsec_micros();

    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = total % 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }

    let mut time = String::new();
    if hours > 0 {
        time.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        time.push_str(&format!("{minutes}M"));
    }
    if micros > 0 {
        let fraction = format!("{micros:06}");
        time.push_str(&format!("{seconds}.{}S", fraction.trim_end_matches('0')));
    } else if seconds > 0 {
        time.push_str(&format!("{seconds}S"));
    }

    if !time.is_empty() {
        out.push('T');
        out.push_str(&time);
    }

    if out == "P" {
        "PT0S".to_string()
    } else {
        out
    }
}

/// Human readable form used in console output, e.g. `3d 02:05:00`.
pub fn format_human(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let clock = format!(
        "{:02}:{:02}:{:02}",
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60
    );

    if days > 0 {
        format!("{days}d {clock}")
    } else {
        clock
    }
}

/// Serde adapter: accepts ISO-8601 / compact strings or seconds, writes ISO-8601.
pub mod serde_duration {
    use super::{format_iso8601, parse_duration};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_iso8601(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Seconds(seconds) => {
                Duration::try_from_secs_f64(seconds).map_err(de::Error::custom)
            }
            RawDuration::Text(text) => parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
