//! Geohash codec — base32 hierarchical spatial index (C1).
//!
//! Each additional character quarters the covered cell, alternating between
//! longitude and latitude bits starting with longitude. Used to partition
//! geopoints into primary (`P_PK`), sort-key (`P_SK`), and sparse-index
//! (`P_GSI`) shards.

use std::collections::HashSet;

const BASE32_ALPHABET: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Encode a (lat, lon) pair into a geohash string of the given precision.
///
/// `precision` is the number of base32 characters in the result; higher
/// precision means a smaller cell. Coordinates outside the valid WGS84
/// range are clamped rather than panicking, since callers may pass points
/// derived from arithmetic (e.g. `destination`) that drift by epsilon.
pub fn encode(lat: f64, lon: f64, precision: usize) -> String {
    let lat = lat.clamp(-90.0, 90.0);
    let lon = lon.clamp(-180.0, 180.0);

    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);

    let mut out = String::with_capacity(precision);
    let mut bit = 0usize;
    let mut ch = 0u8;
    let mut even_bit = true; // longitude first

    while out.len() < precision {
        if even_bit {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if lon >= mid {
                ch |= 1 << (4 - bit);
                lon_range.0 = mid;
            } else {
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                ch |= 1 << (4 - bit);
                lat_range.0 = mid;
            } else {
                lat_range.1 = mid;
            }
        }
        even_bit = !even_bit;

        if bit < 4 {
            bit += 1;
        } else {
            out.push(BASE32_ALPHABET[ch as usize] as char);
            bit = 0;
            ch = 0;
        }
    }

    out
}

fn base32_value(c: u8) -> Option<u8> {
    BASE32_ALPHABET.iter().position(|&b| b == c).map(|p| p as u8)
}

/// Decode a geohash string into the (lat_min, lat_max, lon_min, lon_max)
/// bounding box of its cell.
pub fn decode_bbox(hash: &str) -> (f64, f64, f64, f64) {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut even_bit = true;

    for c in hash.as_bytes() {
        let Some(value) = base32_value(c.to_ascii_lowercase()) else {
            continue;
        };
        for i in (0..5).rev() {
            let bit = (value >> i) & 1;
            if even_bit {
                let mid = (lon_range.0 + lon_range.1) / 2.0;
                if bit == 1 {
                    lon_range.0 = mid;
                } else {
                    lon_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if bit == 1 {
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }
            even_bit = !even_bit;
        }
    }

    (lat_range.0, lat_range.1, lon_range.0, lon_range.1)
}

/// Enumerate every geohash at `precision` whose cell intersects the given
/// bounding box. Enumeration order is unspecified; the result contains no
/// duplicates.
///
/// Implementation: the cell size at `precision` is measured once (by
/// encoding the box's own center and decoding its bbox back), then the
/// rectangle is walked on that grid, encoding each sample point. This is
/// simpler than bit-twiddling neighbor expansion and gives the same
/// covering set for any non-antimeridian-crossing box.
pub fn bboxes(lat_min: f64, lon_min: f64, lat_max: f64, lon_max: f64, precision: usize) -> Vec<String> {
    let (lat_min, lat_max) = if lat_min <= lat_max {
        (lat_min, lat_max)
    } else {
        (lat_max, lat_min)
    };
    let (lon_min, lon_max) = if lon_min <= lon_max {
        (lon_min, lon_max)
    } else {
        (lon_max, lon_min)
    };

    let center_lat = (lat_min + lat_max) / 2.0;
    let center_lon = (lon_min + lon_max) / 2.0;
    let sample_hash = encode(center_lat, center_lon, precision);
    let (clat_min, clat_max, clon_min, clon_max) = decode_bbox(&sample_hash);
    let cell_h = (clat_max - clat_min).max(1e-9);
    let cell_w = (clon_max - clon_min).max(1e-9);

    let mut seen = HashSet::new();
    let mut result = Vec::new();

    let mut lat = lat_min;
    let mut lat_done = false;
    while !lat_done {
        lat_done = lat >= lat_max;

        let mut lon = lon_min;
        let mut lon_done = false;
        while !lon_done {
            lon_done = lon >= lon_max;

            let hash = encode(lat, lon, precision);
            if seen.insert(hash.clone()) {
                result.push(hash);
            }

            lon = if lon_done { lon } else { (lon + cell_w).min(lon_max) };
        }

        lat = if lat_done { lat } else { (lat + cell_h).min(lat_max) };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_known_value() {
        // Standard reference: (lat=57.64911, lon=10.40744) at precision 6 -> "u4pruy"
        let hash = encode(57.64911, 10.40744, 6);
        assert_eq!(hash, "u4pruy");
    }

    #[test]
    fn encode_precision_controls_length() {
        assert_eq!(encode(40.0, -73.0, 5).len(), 5);
        assert_eq!(encode(40.0, -73.0, 8).len(), 8);
    }

    #[test]
    fn encode_is_deterministic() {
        let a = encode(51.5074, -0.1278, 7);
        let b = encode(51.5074, -0.1278, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn decode_bbox_contains_source_point() {
        let lat = 40.7128;
        let lon = -74.0060;
        let hash = encode(lat, lon, 7);
        let (lat_min, lat_max, lon_min, lon_max) = decode_bbox(&hash);
        assert!(lat >= lat_min && lat <= lat_max);
        assert!(lon >= lon_min && lon <= lon_max);
    }

    #[test]
    fn bboxes_contains_encoded_corners() {
        let precision = 5;
        let hashes = bboxes(40.70, -74.02, 40.80, -73.90, precision);
        let nw = encode(40.80, -74.02, precision);
        let se = encode(40.70, -73.90, precision);
        assert!(hashes.contains(&nw));
        assert!(hashes.contains(&se));
    }

    #[test]
    fn bboxes_has_no_duplicates() {
        let hashes = bboxes(40.70, -74.02, 40.80, -73.90, 5);
        let unique: HashSet<_> = hashes.iter().collect();
        assert_eq!(hashes.len(), unique.len());
    }

    #[test]
    fn bboxes_single_point_box_returns_one_hash() {
        let hashes = bboxes(40.75, -73.97, 40.75, -73.97, 6);
        assert_eq!(hashes.len(), 1);
    }
}
