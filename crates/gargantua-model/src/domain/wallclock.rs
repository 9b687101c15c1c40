//! Wall-clock strings stored in specs (event start/end, access-code expiration, token timestamps).
//!
//! Two encodings are accepted on input: RFC 3339 and the Unix `date` layout
//! (`Mon Jan  2 15:04:05 UTC 2006`). Only UTC-equivalent zone abbreviations are
//! understood in the Unix layout. Output always uses the Unix layout in UTC.
use time::{
    Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::error::{ModelError, ModelResult};

const ZONES_UTC: [&str; 4] = ["UTC", "GMT", "Z", "+0000"];

/// Parse a wall-clock string.
pub fn parse_wall_clock(input: &str) -> ModelResult<OffsetDateTime> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ModelError::InvalidTime(input.to_string()));
    }
    if let Ok(ts) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(ts);
    }
    parse_unix_date(trimmed).ok_or_else(|| ModelError::InvalidTime(input.to_string()))
}

fn parse_unix_date(input: &str) -> Option<OffsetDateTime> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    let [weekday, month, day, clock, zone, year] = tokens.as_slice() else {
        return None;
    };
    if !ZONES_UTC.contains(zone) {
        return None;
    }
    let normalized = format!("{weekday} {month} {day} {clock} {year}");
    let layout = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:none] [hour]:[minute]:[second] [year]"
    );
    PrimitiveDateTime::parse(&normalized, layout)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Render a timestamp in the Unix `date` layout, in UTC.
pub fn format_unix_date(ts: OffsetDateTime) -> String {
    let layout = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] UTC [year]"
    );
    ts.to_offset(UtcOffset::UTC)
        .format(layout)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Parse a duration such as `90s`, `30m`, `2h` or `1h30m`.
///
/// A bare integer is read as seconds.
pub fn parse_duration(input: &str) -> ModelResult<Duration> {
    let trimmed = input.trim();
    let invalid = || ModelError::InvalidTime(input.to_string());
    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = trimmed.parse::<i64>() {
        return Ok(Duration::seconds(secs));
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        total += match c {
            'h' => Duration::hours(n),
            'm' => Duration::minutes(n),
            's' => Duration::seconds(n),
            _ => return Err(invalid()),
        };
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(total)
}
