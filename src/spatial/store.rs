//! C3: spatial store adapter. Wraps `db::queries`'s raw SQL with the
//! configured hash precisions and the bootstrapped population p95
//! threshold, so callers never touch those directly.

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::models::{GeoPoint, OptimizationOutcome, RouteRecord};
use crate::db::queries::{self, WriteBatchStats};
use crate::errors::AppError;
use crate::geo::GeoPoint2;

#[derive(Clone)]
pub struct SpatialStore {
    pool: PgPool,
    p_pk: usize,
    p_sk: usize,
    p_gsi: usize,
    population_p95: f64,
}

impl SpatialStore {
    /// Computes the population p95 threshold once, per the bootstrap
    /// invariant in §3 (population values are immutable for the process
    /// lifetime).
    pub async fn bootstrap(pool: PgPool, config: &AppConfig) -> Result<Self, AppError> {
        let population_p95 = queries::compute_population_p95(&pool).await?;
        tracing::info!("spatial store bootstrapped, population_p95={}", population_p95);

        Ok(Self {
            pool,
            p_pk: config.partition_key_hash_precision,
            p_sk: config.sort_key_hash_precision,
            p_gsi: config.gsi_hash_precision,
            population_p95,
        })
    }

    pub fn p_pk(&self) -> usize {
        self.p_pk
    }

    pub fn p_gsi(&self) -> usize {
        self.p_gsi
    }

    pub async fn query_by_hash_prefix(
        &self,
        prefix: &str,
        use_sparse_index: bool,
    ) -> Result<Vec<GeoPoint>, AppError> {
        queries::query_by_hash_prefix(&self.pool, prefix, use_sparse_index).await
    }

    pub async fn fetch_by_hash_prefixes(
        &self,
        prefixes: &[String],
        use_sparse_index: bool,
    ) -> Vec<GeoPoint> {
        queries::fetch_by_hash_prefixes(&self.pool, prefixes, use_sparse_index).await
    }

    pub async fn write_batch(&self, items: &[GeoPoint]) -> WriteBatchStats {
        queries::write_batch(&self.pool, items, self.p_pk, self.p_sk, self.p_gsi, self.population_p95).await
    }

    pub async fn create_route_record(&self, start: GeoPoint2, end: GeoPoint2) -> Result<String, AppError> {
        queries::create_route_record(&self.pool, start, end).await
    }

    pub async fn update_route_record(&self, id: &str, outcome: &OptimizationOutcome) -> Result<(), AppError> {
        queries::update_route_record(&self.pool, id, outcome).await
    }

    pub async fn get_route_record(&self, id: &str) -> Result<Option<RouteRecord>, AppError> {
        queries::get_route_record(&self.pool, id).await
    }

    pub async fn fetch_pending_route_records(
        &self,
        max_age: chrono::Duration,
        limit: i64,
    ) -> Result<Vec<RouteRecord>, AppError> {
        queries::fetch_pending_route_records(&self.pool, max_age, limit).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
