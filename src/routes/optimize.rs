//! C8.submit: persist a route record and return immediately; the worker
//! performs the optimization asynchronously (§4.8).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::geo::GeoPoint2;
use crate::spatial::store::SpatialStore;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OptimiseRouteRequest {
    pub start_point: LatLon,
    pub end_point: LatLon,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OptimiseRouteResponse {
    pub message: String,
    pub route_id: String,
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::InvalidInput(format!("coordinate out of range: ({lat}, {lon})")));
    }
    Ok(())
}

/// `POST /routes/optimise-route` — always returns promptly; no optimization
/// is performed synchronously (§4.8).
#[utoipa::path(
    post,
    path = "/routes/optimise-route",
    tag = "Routes",
    request_body = OptimiseRouteRequest,
    responses(
        (status = 200, description = "Route record created", body = OptimiseRouteResponse),
        (status = 400, description = "Missing or invalid coordinates"),
    )
)]
pub async fn optimise_route(
    State(store): State<SpatialStore>,
    Json(body): Json<OptimiseRouteRequest>,
) -> Result<Json<OptimiseRouteResponse>, AppError> {
    validate_coordinates(body.start_point.lat, body.start_point.lon)?;
    validate_coordinates(body.end_point.lat, body.end_point.lon)?;

    let start = GeoPoint2::new(body.start_point.lat, body.start_point.lon);
    let end = GeoPoint2::new(body.end_point.lat, body.end_point.lon);

    let route_id = store.create_route_record(start, end).await?;

    Ok(Json(OptimiseRouteResponse {
        message: "optimization queued".to_string(),
        route_id,
    }))
}
