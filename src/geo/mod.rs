//! Geospatial primitives: geohash codec (C1), geometry kernel (C2), and the
//! pure METAR field-conversion logic backing weather ingestion.

pub mod geohash;
pub mod geometry;
pub mod weather_ingest;

pub use geometry::GeoPoint2;
