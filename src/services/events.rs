//! Notification sink client (C8 step 5): POSTs the `routeOptimised` event
//! envelope to an external realtime fan-out transport.
//!
//! Grounded on the teacher's `services::yr::YrClient` — a `reqwest::Client`
//! built once, a bounded timeout, custom headers, a typed result instead of
//! bubbling `reqwest::Error` straight up.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::errors::AppError;
use crate::geo::GeoPoint2;

const EVENTS_CHANNEL: &str = "default/routes";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct EventsClient {
    http: reqwest::Client,
    domain: String,
    api_key: String,
}

/// Payload for a completed optimization, matching the assess response
/// shape plus the route id (§6 Event payload).
#[derive(Debug, Serialize)]
pub struct RouteOptimisedData {
    pub id: String,
    pub route: Vec<GeoPoint2>,
    pub route_distance: f64,
    pub population_impact: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_impact_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility_risk: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_risk: Option<f64>,
}

impl EventsClient {
    pub fn new(domain: &str, api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build events HTTP client");

        Self { http, domain: domain.to_string(), api_key: api_key.to_string() }
    }

    /// POST the `routeOptimised` event. Failure is non-fatal to the caller
    /// (the persisted RouteRecord update is the system of record, §4.8/§7);
    /// this returns `Err(AppError::PublishFailed)` so the worker can log
    /// and continue.
    pub async fn publish_route_optimised(&self, data: RouteOptimisedData) -> Result<(), AppError> {
        let event = json!({ "type": "routeOptimised", "data": data });
        let envelope = json!({
            "channel": EVENTS_CHANNEL,
            "events": [event.to_string()],
        });

        let response = self
            .http
            .post(&self.domain)
            .bearer_auth(&self.api_key)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| AppError::PublishFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::PublishFailed(format!(
                "notification sink returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
