//! Epoch-millis helpers. Local records store time as `i64` millis; the remote
//! store exchanges ISO-8601 strings.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::RemoteError;

pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

/// Next `updated_at` for a record last touched at `previous`; never goes backwards.
pub fn monotonic_after(previous: i64, now: i64) -> i64 {
  if now > previous {
    now
  } else {
    previous + 1
  }
}

/// Midnight UTC of the day containing `millis`
pub fn start_of_day(millis: i64) -> i64 {
  const DAY_MS: i64 = 24 * 60 * 60 * 1000;
  millis - millis.rem_euclid(DAY_MS)
}

pub fn millis_to_iso(millis: i64) -> String {
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .unwrap_or_default()
    .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn iso_to_millis(value: &str) -> Result<i64, RemoteError> {
  DateTime::parse_from_rfc3339(value)
    .map(|dt| dt.timestamp_millis())
    .map_err(|e| RemoteError::Decode(format!("invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_iso_round_trip_keeps_millis() {
    let millis = 1_717_171_717_123;
    let iso = millis_to_iso(millis);
    assert_eq!(iso, "2024-05-31T16:08:37.123Z");
    assert_eq!(iso_to_millis(&iso).unwrap(), millis);
  }

  #[test]
  fn test_iso_with_offset_is_normalized() {
    assert_eq!(
      iso_to_millis("2024-01-01T01:00:00+01:00").unwrap(),
      iso_to_millis("2024-01-01T00:00:00Z").unwrap()
    );
    assert!(iso_to_millis("yesterday").is_err());
  }

  #[test]
  fn test_monotonic_after() {
    assert_eq!(monotonic_after(100, 200), 200);
    assert_eq!(monotonic_after(100, 100), 101);
    assert_eq!(monotonic_after(100, 50), 101);
  }

  #[test]
  fn test_start_of_day() {
    let noon = iso_to_millis("2024-03-10T12:34:56.000Z").unwrap();
    assert_eq!(start_of_day(noon), iso_to_millis("2024-03-10T00:00:00Z").unwrap());
  }
}
