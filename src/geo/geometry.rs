//! Geometry kernel (C2) — great-circle distance, rhumb bearing/destination,
//! point-to-segment perpendicular distance.
//!
//! Grounded on the haversine form used in `atc-drone`'s compliance checker
//! and the bearing/destination split of `atc_core::spatial`. All distances
//! are in meters; all angles are in degrees unless noted.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Mean Earth radius in meters (IUGG value), matching standard haversine usage.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A point on the Earth's surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint2 {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint2 {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance between two points, in meters (haversine formula).
pub fn distance(a: GeoPoint2, b: GeoPoint2) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Constant-bearing (rhumb line) course from `a` to `b`, in degrees ∈ [0, 360).
pub fn rhumb_bearing(a: GeoPoint2, b: GeoPoint2) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let mut dlon = (b.lon - a.lon).to_radians();

    // Take the shorter way around the antimeridian.
    if dlon.abs() > std::f64::consts::PI {
        if dlon > 0.0 {
            dlon -= 2.0 * std::f64::consts::PI;
        } else {
            dlon += 2.0 * std::f64::consts::PI;
        }
    }

    let dphi = ((lat2 / 2.0 + std::f64::consts::FRAC_PI_4).tan()
        / (lat1 / 2.0 + std::f64::consts::FRAC_PI_4).tan())
    .ln();

    let q = if dphi.abs() > 1e-12 {
        (lat2 - lat1) / dphi
    } else {
        lat1.cos()
    };

    let bearing = dlon.atan2(q).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Forward point along the rhumb line from `origin`, `meters` along `bearing_deg`.
pub fn destination(origin: GeoPoint2, meters: f64, bearing_deg: f64) -> GeoPoint2 {
    let angular_distance = meters / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();

    let lat2 = lat1 + angular_distance * bearing.cos();

    let dphi = ((lat2 / 2.0 + std::f64::consts::FRAC_PI_4).tan()
        / (lat1 / 2.0 + std::f64::consts::FRAC_PI_4).tan())
    .ln();
    let q = if dphi.abs() > 1e-12 {
        (lat2 - lat1) / dphi
    } else {
        lat1.cos()
    };

    let dlon = angular_distance * bearing.sin() / q;
    // Guard against going past the pole (not expected for drone-scale hops).
    let lat2 = if lat2.abs() > std::f64::consts::FRAC_PI_2 {
        if lat2 > 0.0 {
            std::f64::consts::PI - lat2
        } else {
            -std::f64::consts::PI - lat2
        }
    } else {
        lat2
    };

    let lon2 = origin.lon.to_radians() + dlon;
    let lon2 = ((lon2 + 3.0 * std::f64::consts::PI) % (2.0 * std::f64::consts::PI)) - std::f64::consts::PI;

    GeoPoint2::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Shortest distance (meters) from `p` to segment `a`-`b`.
///
/// Works in an equirectangular projection local to the segment, which is
/// accurate enough at the corridor scales this system operates at (segments
/// of a few km, buffers of tens of km).
pub fn perpendicular_distance(p: GeoPoint2, a: GeoPoint2, b: GeoPoint2) -> f64 {
    let lat0 = a.lat.to_radians();
    let to_xy = |pt: GeoPoint2| -> (f64, f64) {
        let x = (pt.lon - a.lon).to_radians() * lat0.cos() * EARTH_RADIUS_M;
        let y = (pt.lat - a.lat).to_radians() * EARTH_RADIUS_M;
        (x, y)
    };

    let (ax, ay) = to_xy(a);
    let (bx, by) = to_xy(b);
    let (px, py) = to_xy(p);

    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;

    if len_sq < 1e-9 {
        return distance(p, a);
    }

    let t = (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0);
    let (projx, projy) = (ax + t * dx, ay + t * dy);
    ((px - projx).powi(2) + (py - projy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn distance_zero_for_same_point() {
        let p = GeoPoint2::new(51.5, -0.1);
        assert!(approx(distance(p, p), 0.0, 1e-6));
    }

    #[test]
    fn distance_matches_known_short_hop() {
        // One degree of latitude is ~111.2 km.
        let a = GeoPoint2::new(0.0, 0.0);
        let b = GeoPoint2::new(1.0, 0.0);
        assert!(approx(distance(a, b), 111_195.0, 1000.0));
    }

    #[test]
    fn bearing_due_north_is_zero() {
        let a = GeoPoint2::new(51.0, 0.0);
        let b = GeoPoint2::new(52.0, 0.0);
        assert!(approx(rhumb_bearing(a, b), 0.0, 0.5));
    }

    #[test]
    fn bearing_due_east_is_90() {
        let a = GeoPoint2::new(0.0, 0.0);
        let b = GeoPoint2::new(0.0, 1.0);
        assert!(approx(rhumb_bearing(a, b), 90.0, 0.5));
    }

    #[test]
    fn destination_round_trip_distance() {
        let origin = GeoPoint2::new(40.0, -73.0);
        let dest = destination(origin, 5_000.0, 45.0);
        assert!(approx(distance(origin, dest), 5_000.0, 50.0));
    }

    #[test]
    fn perpendicular_distance_zero_on_segment() {
        let a = GeoPoint2::new(40.0, -73.0);
        let b = GeoPoint2::new(40.1, -73.0);
        let mid = GeoPoint2::new(40.05, -73.0);
        assert!(perpendicular_distance(mid, a, b) < 5.0);
    }

    #[test]
    fn perpendicular_distance_off_segment() {
        let a = GeoPoint2::new(40.0, -73.0);
        let b = GeoPoint2::new(40.1, -73.0);
        let off = GeoPoint2::new(40.05, -72.99);
        let d = perpendicular_distance(off, a, b);
        assert!(d > 500.0 && d < 1500.0);
    }

    #[test]
    fn perpendicular_distance_degenerate_segment() {
        let a = GeoPoint2::new(40.0, -73.0);
        let p = GeoPoint2::new(40.001, -73.0);
        assert!(approx(perpendicular_distance(p, a, a), distance(p, a), 1.0));
    }
}
