//! C9: viewport query over the sparse index.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::GeoPoint;
use crate::errors::AppError;
use crate::spatial::{corridor, store::SpatialStore};

#[derive(Debug, Deserialize, IntoParams)]
pub struct BoundingBoxQuery {
    pub lat_min: Option<f64>,
    pub lon_min: Option<f64>,
    pub lat_max: Option<f64>,
    pub lon_max: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoundingBoxResponse {
    pub items: Vec<GeoPoint>,
    pub count: usize,
}

/// `GET /spatial/bounding-box` — bounding-box read via the sparse index,
/// strict post-filter (§4.9).
#[utoipa::path(
    get,
    path = "/spatial/bounding-box",
    tag = "Spatial",
    params(BoundingBoxQuery),
    responses(
        (status = 200, description = "Items within the box", body = BoundingBoxResponse),
        (status = 400, description = "Missing bounding-box parameters"),
    )
)]
pub async fn bounding_box(
    State(store): State<SpatialStore>,
    Query(query): Query<BoundingBoxQuery>,
) -> Result<Json<BoundingBoxResponse>, AppError> {
    let (lat_min, lon_min, lat_max, lon_max) = match (query.lat_min, query.lon_min, query.lat_max, query.lon_max) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return Err(AppError::InvalidInput("latMin, lonMin, latMax, lonMax are all required".into())),
    };

    let hashes = corridor::bounding_box_hashes(lat_min, lon_min, lat_max, lon_max, store.p_gsi());
    let points = store.fetch_by_hash_prefixes(&hashes, true).await;

    let items: Vec<GeoPoint> = points
        .into_iter()
        .filter(|p| {
            let lat = p.lat();
            let lon = p.lon();
            lat >= lat_min && lat <= lat_max && lon >= lon_min && lon <= lon_max
        })
        .collect();

    let count = items.len();
    Ok(Json(BoundingBoxResponse { items, count }))
}
