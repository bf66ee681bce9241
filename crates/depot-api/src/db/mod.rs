//! # Database Persistence Layer
//!
//! Optional Postgres write-through for the deployment store via SQLx.
//!
//! ## Architecture
//!
//! The in-memory [`Store`](depot_custody::Store) is the system of record
//! while the process runs; every mutation commits there first. When a
//! database URL is configured, handlers then write the committed document
//! through to Postgres, and the store is hydrated from the table on
//! startup. When absent, the API operates in in-memory-only mode.
//!
//! Each deployment is one row holding the JSON document plus a few
//! indexed columns. QR seeds never appear in a deployment's JSON form, so
//! they live in their own `asset_seeds` column.
//!
//! Handlers reach the table through [`WriteThrough`], so a failing
//! database can be stood in for in tests.

pub mod deployments;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use depot_state::Deployment;

/// Destination for committed deployments.
#[async_trait]
pub trait WriteThrough: Send + Sync {
    /// Upsert `deployment`. `Ok(false)` means the stored copy is already at
    /// this version or newer and nothing was written.
    async fn save(&self, deployment: &Deployment) -> Result<bool, sqlx::Error>;
}

/// [`WriteThrough`] into the `deployments` table.
#[derive(Debug, Clone)]
pub struct PgWriteThrough {
    pool: PgPool,
}

impl PgWriteThrough {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WriteThrough for PgWriteThrough {
    async fn save(&self, deployment: &Deployment) -> Result<bool, sqlx::Error> {
        deployments::save(&self.pool, deployment).await
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}
