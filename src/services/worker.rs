//! C8 worker: consumes the INSERT-only routes change feed, runs the
//! optimizer, persists the outcome, and publishes a completion event.
//!
//! Grounded on the teacher's `services::poller::run_poller` — an endless
//! sleep/wake loop, `Arc<RwLock<_>>` shared status exposed via a status
//! route, and retry-with-cap constants declared the same way
//! (`POLLER_MAX_RETRIES`-style).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::db::models::{OptimizationOutcome, RouteRecord};
use crate::errors::AppError;
use crate::services::events::{EventsClient, RouteOptimisedData};
use crate::services::{impact, optimizer};
use crate::spatial::{corridor, store::SpatialStore};

/// Postgres NOTIFY channel the `route_records` AFTER INSERT trigger fires on.
pub const ROUTE_INSERT_CHANNEL: &str = "route_records_inserted";

/// Records older than this are skipped with an error log rather than
/// processed (§4.8 retries/backpressure).
const MAX_RECORD_AGE: Duration = Duration::minutes(5);
/// Optimize job deadline (§5).
const JOB_DEADLINE: StdDuration = StdDuration::from_secs(300);
/// Limited retry attempts per record (§4.8).
const MAX_RETRIES: u32 = 2;
/// Reconciliation sweep cadence — a failsafe against missed NOTIFY delivery.
const RECONCILE_INTERVAL_SECS: u64 = 60;
const RECONCILE_BATCH_LIMIT: i64 = 50;
/// Delay before reconnecting a dropped `PgListener`.
const LISTENER_RECONNECT_DELAY_SECS: u64 = 5;

/// Worker status, exposed the same way the teacher exposes poller status.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkerState {
    pub active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub processed: u64,
    pub failed: u64,
    pub skipped_stale: u64,
}

impl WorkerState {
    pub fn new() -> Self {
        Self { active: true, last_run_at: None, processed: 0, failed: 0, skipped_stale: 0 }
    }
}

pub type SharedWorkerState = Arc<RwLock<WorkerState>>;

/// Listener loop: reconnects on error, processes one notified route id at a
/// time.
pub async fn run_listener(
    pool: PgPool,
    store: SpatialStore,
    events: EventsClient,
    config: AppConfig,
    state: SharedWorkerState,
) {
    tracing::info!("route optimizer worker listener started");

    loop {
        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("worker: failed to connect PgListener: {}", e);
                sleep_secs(LISTENER_RECONNECT_DELAY_SECS).await;
                continue;
            }
        };

        if let Err(e) = listener.listen(ROUTE_INSERT_CHANNEL).await {
            tracing::error!("worker: failed to LISTEN on {}: {}", ROUTE_INSERT_CHANNEL, e);
            sleep_secs(LISTENER_RECONNECT_DELAY_SECS).await;
            continue;
        }

        loop {
            match listener.recv().await {
                Ok(notification) => {
                    let id = notification.payload().to_string();
                    process_with_retry(&store, &events, &config, &id, &state).await;
                }
                Err(e) => {
                    tracing::error!("worker: listener connection dropped: {}", e);
                    break;
                }
            }
        }

        sleep_secs(LISTENER_RECONNECT_DELAY_SECS).await;
    }
}

/// Periodic failsafe sweep for INSERTs whose NOTIFY was missed (e.g. a
/// listener reconnect window).
pub async fn run_reconciliation_sweep(
    store: SpatialStore,
    events: EventsClient,
    config: AppConfig,
    state: SharedWorkerState,
) {
    tracing::info!("route optimizer reconciliation sweep started");

    loop {
        match store.fetch_pending_route_records(MAX_RECORD_AGE, RECONCILE_BATCH_LIMIT).await {
            Ok(records) => {
                for record in records {
                    process_record_with_retry(&store, &events, &config, &record, &state).await;
                }
            }
            Err(e) => tracing::error!("worker: reconciliation sweep query failed: {}", e),
        }

        sleep_secs(RECONCILE_INTERVAL_SECS).await;
    }
}

async fn process_with_retry(
    store: &SpatialStore,
    events: &EventsClient,
    config: &AppConfig,
    id: &str,
    state: &SharedWorkerState,
) {
    let record = match store.get_route_record(id).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            tracing::warn!("worker: notified route id {} not found", id);
            return;
        }
        Err(e) => {
            tracing::error!("worker: failed to load route record {}: {}", id, e);
            return;
        }
    };

    process_record_with_retry(store, events, config, &record, state).await;
}

async fn process_record_with_retry(
    store: &SpatialStore,
    events: &EventsClient,
    config: &AppConfig,
    record: &RouteRecord,
    state: &SharedWorkerState,
) {
    // Idempotency guard: already optimized, nothing to do (§8 property 8).
    if record.optimised_route.is_some() {
        return;
    }

    let age = Utc::now() - record.created_at;
    if age > MAX_RECORD_AGE {
        tracing::error!("worker: route record {} exceeded max age ({}), skipping", record.id, age);
        let mut s = state.write().await;
        s.skipped_stale += 1;
        return;
    }

    let mut last_err = None;
    for attempt in 0..=MAX_RETRIES {
        match process_record(store, events, config, record).await {
            Ok(()) => {
                let mut s = state.write().await;
                s.processed += 1;
                s.last_run_at = Some(Utc::now());
                return;
            }
            Err(e) => {
                tracing::warn!(
                    "worker: attempt {}/{} failed for route {}: {}",
                    attempt + 1,
                    MAX_RETRIES + 1,
                    record.id,
                    e
                );
                last_err = Some(e);
            }
        }
    }

    tracing::error!(
        "worker: route {} failed after {} attempts: {}",
        record.id,
        MAX_RETRIES + 1,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    );
    let mut s = state.write().await;
    s.failed += 1;
    s.last_run_at = Some(Utc::now());
}

async fn process_record(
    store: &SpatialStore,
    events: &EventsClient,
    config: &AppConfig,
    record: &RouteRecord,
) -> Result<(), AppError> {
    let start = record.start();
    let end = record.end();

    let hashes = corridor::route_hashes(start, end, store.p_pk(), 1000.0, 10_000.0);
    let corridor_points = store.fetch_by_hash_prefixes(&hashes, false).await;

    let params = optimizer::OptimizerParams {
        step_meters: config.optimizer_step_meters,
        angle_range_deg: config.optimizer_angle_range_deg,
        fan: config.optimizer_fan,
        max_deviation_ratio: config.optimizer_max_deviation_ratio,
    };

    let search_points = corridor_points.clone();
    let search = tokio::task::spawn_blocking(move || optimizer::optimize(start, end, &search_points, params));

    let result = match tokio::time::timeout(JOB_DEADLINE, search).await {
        Ok(Ok(r)) => r,
        Ok(Err(join_err)) => return Err(AppError::StoreFatal(format!("optimizer task panicked: {join_err}"))),
        Err(_) => {
            tracing::warn!("worker: route {} exceeded deadline, falling back to straight line", record.id);
            optimizer::OptimizeResult {
                route: vec![start, end],
                outcome: optimizer::OptimizerOutcome::Fallback,
            }
        }
    };

    // Optimized-path assess applies the per-type threshold per segment,
    // with dedup (§9 design note), unlike the straight-line assess path.
    let filtered = corridor::points_near_route(&result.route, &corridor_points);

    let route_distance_km = impact::route_distance_km(&result.route);
    let population_impact = impact::population_impact(&filtered);
    let noise_impact = impact::noise_impact(population_impact);
    let weather = impact::weather_impact(&filtered);

    let outcome = OptimizationOutcome {
        route: result.route.clone(),
        route_distance_km,
        population_impact,
        noise_impact: Some(noise_impact),
        visibility_risk: weather.as_ref().map(|w| w.visibility_risk),
        wind_risk: weather.as_ref().map(|w| w.wind_risk),
    };

    store.update_route_record(&record.id, &outcome).await?;

    let publish_result = events
        .publish_route_optimised(RouteOptimisedData {
            id: record.id.clone(),
            route: result.route,
            route_distance: route_distance_km,
            population_impact,
            noise_impact_score: Some(noise_impact),
            visibility_risk: weather.as_ref().map(|w| w.visibility_risk),
            wind_risk: weather.as_ref().map(|w| w.wind_risk),
        })
        .await;

    // PublishFailed is non-fatal — the persisted update is the system of
    // record (§7).
    if let Err(e) = publish_result {
        tracing::warn!("worker: failed to publish routeOptimised event for {}: {}", record.id, e);
    }

    Ok(())
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(StdDuration::from_secs(secs)).await;
}
