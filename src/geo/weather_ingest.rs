//! Pure field-conversion and validation logic backing the (out-of-scope)
//! METAR ingestion job.
//!
//! The scheduled job that fetches and decodes METAR XML is an external
//! collaborator (§1 Out of scope); this module is the in-scope core logic
//! it would call to turn raw METAR fields into a validated `WeatherReport`.
//! No I/O happens here.

use chrono::{DateTime, Duration, Utc};

use crate::db::models::WeatherReport;

/// `visibilityMeters` used when the source encodes "10 statute miles or
/// more" as the sentinel string `"10…"` rather than a parseable number.
const UNLIMITED_VISIBILITY_METERS: f64 = 200_000.0;

const METERS_PER_MILE: f64 = 1609.34;
const MS_PER_KNOT: f64 = 0.5144;

fn round_1dp(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Convert a METAR wind speed in knots to m/s, rounded to 1 decimal place.
pub fn wind_kt_to_ms(wind_kt: f64) -> f64 {
    round_1dp(wind_kt * MS_PER_KNOT)
}

/// Convert a METAR visibility field to meters.
///
/// `raw` is the source's textual visibility field; `"10…"` (or any string
/// ending in an ellipsis/"+" after a leading "10") signals "10+ miles",
/// which METAR callers use in place of a precise distance. Anything else is
/// parsed as statute miles and converted.
pub fn visibility_to_meters(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.starts_with("10") && trimmed.len() > 2 {
        return Some(UNLIMITED_VISIBILITY_METERS);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .map(|miles| (miles * METERS_PER_MILE).round())
}

/// Build a validated `WeatherReport` from decoded METAR fields, or `None`
/// if the coordinates are out of range (the record is dropped, not a
/// job-level error — S4 / §7).
#[allow(clippy::too_many_arguments)]
pub fn build_weather_report(
    lat: f64,
    lon: f64,
    temperature_c: Option<f64>,
    wind_speed_kt: Option<f64>,
    visibility_raw: Option<&str>,
    precipitation_level: Option<u8>,
    data_timestamp: DateTime<Utc>,
    record_timestamp: DateTime<Utc>,
) -> Option<WeatherReport> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }

    let wind_speed_ms = wind_speed_kt.map(wind_kt_to_ms);
    let visibility_meters = visibility_raw.and_then(visibility_to_meters);
    let ttl = record_timestamp + Duration::hours(24);

    Some(WeatherReport {
        lat,
        lon,
        temperature_c,
        wind_speed_ms,
        visibility_meters,
        precipitation_level,
        data_timestamp,
        record_timestamp,
        ttl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wind_kt_conversion_matches_spec_example() {
        // 10 kt -> ~5.1 m/s (S4)
        assert!((wind_kt_to_ms(10.0) - 5.1).abs() < 1e-9);
    }

    #[test]
    fn visibility_sentinel_is_unlimited() {
        assert_eq!(visibility_to_meters("10…"), Some(UNLIMITED_VISIBILITY_METERS));
        assert_eq!(visibility_to_meters("10+"), Some(UNLIMITED_VISIBILITY_METERS));
    }

    #[test]
    fn visibility_parses_statute_miles() {
        let meters = visibility_to_meters("6").unwrap();
        assert!((meters - 6.0 * METERS_PER_MILE).round().abs() < 1.0);
    }

    #[test]
    fn invalid_latitude_is_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let report = build_weather_report(91.0, -122.37, Some(15.6), Some(10.0), Some("10…"), None, now, now);
        assert!(report.is_none());
    }

    #[test]
    fn valid_metar_is_stored_with_converted_fields() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let report =
            build_weather_report(37.62, -122.37, Some(15.6), Some(10.0), Some("10…"), None, now, now)
                .expect("valid record");
        assert!((report.wind_speed_ms.unwrap() - 5.1).abs() < 1e-9);
        assert_eq!(report.ttl, now + Duration::hours(24));
    }
}
