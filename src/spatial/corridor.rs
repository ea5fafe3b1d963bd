//! Corridor scanner (C4): which hash partitions a route corridor may touch,
//! and which geopoints from a candidate set actually fall within the
//! per-type distance threshold of the route.
//!
//! Pure transforms over a polyline — no I/O, shaped like the teacher's
//! `services::gpx::extract_track_points`.

use std::collections::HashSet;

use crate::db::models::GeoPoint;
use crate::geo::{geohash, geometry, GeoPoint2};

/// Population cells within this distance of a route segment count as near it.
const THRESHOLD_POPULATION_M: f64 = 500.0;
/// Weather reports within this distance of a route segment count as near it.
const THRESHOLD_WEATHER_M: f64 = 20_000.0;

const EARTH_DEGREE_METERS: f64 = 111_000.0;

/// Thin wrapper over `geohash::bboxes` (§4.4).
pub fn bounding_box_hashes(lat_min: f64, lon_min: f64, lat_max: f64, lon_max: f64, precision: usize) -> Vec<String> {
    geohash::bboxes(lat_min, lon_min, lat_max, lon_max, precision)
}

/// All hashes whose cells plausibly intersect a `buffer_meters`-wide
/// corridor around the `start`→`end` route, at the given precision.
pub fn route_hashes(
    start: GeoPoint2,
    end: GeoPoint2,
    precision: usize,
    step_meters: f64,
    buffer_meters: f64,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    let mut push_hash = |h: String, seen: &mut HashSet<String>, result: &mut Vec<String>| {
        if seen.insert(h.clone()) {
            result.push(h);
        }
    };

    push_hash(geohash::encode(start.lat, start.lon, precision), &mut seen, &mut result);
    push_hash(geohash::encode(end.lat, end.lon, precision), &mut seen, &mut result);

    let total_distance = geometry::distance(start, end);
    let bearing = geometry::rhumb_bearing(start, end);
    let steps = (total_distance / step_meters).floor() as u64;

    for i in 0..=steps {
        let p = geometry::destination(start, i as f64 * step_meters, bearing);

        let d_lat = buffer_meters / EARTH_DEGREE_METERS;
        let d_lon = buffer_meters / (EARTH_DEGREE_METERS * p.lat.to_radians().cos());

        for h in geohash::bboxes(p.lat - d_lat, p.lon - d_lon, p.lat + d_lat, p.lon + d_lon, precision) {
            push_hash(h, &mut seen, &mut result);
        }
    }

    result
}

fn threshold_for(point: &GeoPoint) -> Option<f64> {
    match point {
        GeoPoint::Population(_) => Some(THRESHOLD_POPULATION_M),
        GeoPoint::Weather(_) => Some(THRESHOLD_WEATHER_M),
    }
}

/// Retains points within their type's threshold distance of segment `a`-`b`.
pub fn points_near_segment(a: GeoPoint2, b: GeoPoint2, points: &[GeoPoint]) -> Vec<GeoPoint> {
    points
        .iter()
        .filter(|p| {
            let Some(threshold) = threshold_for(p) else { return false };
            geometry::perpendicular_distance(p.point(), a, b) <= threshold
        })
        .cloned()
        .collect()
}

/// Applies `points_near_segment` across every consecutive segment of
/// `route_polyline`, deduplicating the union by `(lat, lon)`.
pub fn points_near_route(route_polyline: &[GeoPoint2], points: &[GeoPoint]) -> Vec<GeoPoint> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for window in route_polyline.windows(2) {
        let (a, b) = (window[0], window[1]);
        for p in points_near_segment(a, b, points) {
            let key = format!("{:.6},{:.6}", p.lat(), p.lon());
            if seen.insert(key) {
                result.push(p);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{PopulationCell, WeatherReport};
    use chrono::Utc;

    fn pop(lat: f64, lon: f64, population: i64) -> GeoPoint {
        GeoPoint::Population(PopulationCell { lat, lon, population })
    }

    fn weather(lat: f64, lon: f64) -> GeoPoint {
        let now = Utc::now();
        GeoPoint::Weather(WeatherReport {
            lat,
            lon,
            temperature_c: None,
            wind_speed_ms: None,
            visibility_meters: None,
            precipitation_level: None,
            data_timestamp: now,
            record_timestamp: now,
            ttl: now,
        })
    }

    #[test]
    fn route_hashes_includes_start_and_end() {
        let start = GeoPoint2::new(40.0, -73.0);
        let end = GeoPoint2::new(40.05, -73.0);
        let hashes = route_hashes(start, end, 5, 1000.0, 10_000.0);
        assert!(hashes.contains(&geohash::encode(start.lat, start.lon, 5)));
        assert!(hashes.contains(&geohash::encode(end.lat, end.lon, 5)));
    }

    #[test]
    fn route_hashes_zero_distance_still_covers_the_point() {
        let p = GeoPoint2::new(40.0, -73.0);
        let hashes = route_hashes(p, p, 5, 1000.0, 10_000.0);
        assert!(!hashes.is_empty());
    }

    #[test]
    fn corridor_completeness_property() {
        // Testable property 3: a point within 500m of the line is covered
        // when buffer_meters >= 500.
        let start = GeoPoint2::new(40.0, -73.0);
        let end = GeoPoint2::new(40.1, -73.0);
        let near = GeoPoint2::new(40.05, -73.001);
        assert!(geometry::perpendicular_distance(near, start, end) <= 500.0);

        let hashes = route_hashes(start, end, 5, 1000.0, 10_000.0);
        let point_hash = geohash::encode(near.lat, near.lon, 5);
        assert!(hashes.contains(&point_hash));
    }

    #[test]
    fn points_near_segment_keeps_close_population_cell() {
        let a = GeoPoint2::new(40.0, -73.0);
        let b = GeoPoint2::new(40.1, -73.0);
        let points = vec![pop(40.05, -73.0, 1000)];
        let near = points_near_segment(a, b, &points);
        assert_eq!(near.len(), 1);
    }

    #[test]
    fn points_near_segment_drops_far_population_cell() {
        let a = GeoPoint2::new(40.0, -73.0);
        let b = GeoPoint2::new(40.1, -73.0);
        let points = vec![pop(40.05, -72.9, 1000)];
        let near = points_near_segment(a, b, &points);
        assert!(near.is_empty());
    }

    #[test]
    fn points_near_segment_weather_uses_wider_threshold() {
        let a = GeoPoint2::new(40.0, -73.0);
        let b = GeoPoint2::new(40.1, -73.0);
        // ~1.5km east of the line -- too far for population, fine for weather.
        let points = vec![weather(40.05, -73.015)];
        let near = points_near_segment(a, b, &points);
        assert_eq!(near.len(), 1);
    }

    #[test]
    fn points_near_route_dedups_across_segments() {
        let polyline = vec![
            GeoPoint2::new(40.0, -73.0),
            GeoPoint2::new(40.05, -73.0),
            GeoPoint2::new(40.1, -73.0),
        ];
        let points = vec![pop(40.05, -73.0, 500)];
        let near = points_near_route(&polyline, &points);
        assert_eq!(near.len(), 1);
    }
}
