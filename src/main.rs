// Drone Route Planner API v0.1
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod geo;
mod routes;
mod services;
mod spatial;

use config::AppConfig;
use services::events::EventsClient;
use services::worker::{SharedWorkerState, WorkerState};
use spatial::store::SpatialStore;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Drone Route Planner API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Drone Route Planner API",
        version = "0.1.0",
        description = "Assesses and optimizes drone flight routes for population and weather \
            impact, indexed over a geohash-sparse spatial store. Optimization is performed \
            asynchronously by a background worker driven off an insert-only change feed.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Spatial", description = "Bounding-box reads over the spatial index"),
        (name = "Routes", description = "Route assessment and optimization"),
        (name = "Worker", description = "Background optimizer worker status"),
    ),
    paths(
        routes::health::health_check,
        routes::viewport::bounding_box,
        routes::assess::assess_route,
        routes::optimize::optimise_route,
        routes::worker_status::get_worker_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::viewport::BoundingBoxResponse,
            routes::assess::AssessRouteResponse,
            routes::optimize::LatLon,
            routes::optimize::OptimiseRouteRequest,
            routes::optimize::OptimiseRouteResponse,
            services::worker::WorkerState,
            db::models::GeoPoint,
            db::models::PopulationCell,
            db::models::WeatherReport,
            db::models::RouteRecord,
            db::models::OptimizationOutcome,
            geo::GeoPoint2,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drone_route_planner_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Bootstrap the spatial store — computes population p95 once, per the
    // process-lifetime immutability invariant.
    let store = SpatialStore::bootstrap(pool.clone(), &config)
        .await
        .expect("Failed to bootstrap spatial store");

    // Notification-sink client
    let events = EventsClient::new(&config.events_http_domain, &config.events_api_key);

    // Shared worker state and background tasks
    let worker_state: SharedWorkerState = Arc::new(RwLock::new(WorkerState::new()));
    tokio::spawn(services::worker::run_listener(
        pool.clone(),
        store.clone(),
        events.clone(),
        config.clone(),
        worker_state.clone(),
    ));
    tokio::spawn(services::worker::run_reconciliation_sweep(
        store.clone(),
        events.clone(),
        config.clone(),
        worker_state.clone(),
    ));

    // CORS — allow cross-origin reads/writes from map clients.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let spatial_routes = Router::new()
        .route("/spatial/bounding-box", get(routes::viewport::bounding_box))
        .with_state(store.clone());

    let route_routes = Router::new()
        .route("/routes/assess-route", get(routes::assess::assess_route))
        .route("/routes/optimise-route", post(routes::optimize::optimise_route))
        .with_state(store.clone());

    let health_routes = Router::new().route("/api/v1/health", get(routes::health::health_check));

    let worker_routes = Router::new()
        .route("/api/v1/worker/status", get(routes::worker_status::get_worker_status))
        .with_state(worker_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(spatial_routes)
        .merge(route_routes)
        .merge(worker_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
