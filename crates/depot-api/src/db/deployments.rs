//! Deployment persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `deployments` table.
//! The lifecycle rules are enforced by the custody services before anything
//! reaches this module; SQL only guards against writing an older version
//! over a newer one.

use std::collections::HashMap;

use sqlx::PgPool;

use depot_state::{Deployment, QrSeed};

/// Serialize the deployment document. Seeds are skipped by the document's
/// own serializer and stored through [`seeds_column`].
fn document_column(deployment: &Deployment) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(deployment).map_err(|e| {
        tracing::error!(deployment_id = %deployment.id, error = %e, "failed to serialize deployment");
        sqlx::Error::Encode(Box::new(e))
    })
}

/// Asset seeds keyed by asset id.
fn seeds_column(deployment: &Deployment) -> serde_json::Value {
    let seeds: serde_json::Map<String, serde_json::Value> = deployment
        .assets
        .iter()
        .filter(|a| !a.seed.is_empty())
        .map(|a| {
            (
                a.asset_id.to_string(),
                serde_json::Value::String(a.seed.expose().to_string()),
            )
        })
        .collect();
    serde_json::Value::Object(seeds)
}

fn version_column(deployment: &Deployment) -> Result<i64, sqlx::Error> {
    i64::try_from(deployment.version).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Upsert a committed deployment.
///
/// An existing row is only replaced by a newer version. Returns `false`
/// when the stored row is already at this version or newer, i.e. a
/// concurrent request persisted a later commit first. A row whose earlier
/// write failed is created by the next successful one.
pub async fn save(pool: &PgPool, deployment: &Deployment) -> Result<bool, sqlx::Error> {
    let document = document_column(deployment)?;
    let version = version_column(deployment)?;

    let result = sqlx::query(
        "INSERT INTO deployments (id, status, priority, declarator_id, expected_return_date,
                                  created_at, version, document, asset_seeds)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (id) DO UPDATE
         SET status = EXCLUDED.status,
             priority = EXCLUDED.priority,
             expected_return_date = EXCLUDED.expected_return_date,
             version = EXCLUDED.version,
             document = EXCLUDED.document,
             asset_seeds = EXCLUDED.asset_seeds,
             updated_at = now()
         WHERE deployments.version < EXCLUDED.version",
    )
    .bind(deployment.id.as_uuid())
    .bind(deployment.status.as_str())
    .bind(deployment.priority.as_str())
    .bind(deployment.declarator_id.as_str())
    .bind(*deployment.expected_return_date.as_datetime())
    .bind(*deployment.created_at.as_datetime())
    .bind(version)
    .bind(&document)
    .bind(seeds_column(deployment))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all deployments, oldest first, with their seeds restored.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(
        "SELECT document, asset_seeds FROM deployments ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DeploymentRow::into_deployment).collect()
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DeploymentRow {
    document: serde_json::Value,
    asset_seeds: serde_json::Value,
}

impl DeploymentRow {
    fn into_deployment(self) -> Result<Deployment, sqlx::Error> {
        let mut deployment: Deployment = serde_json::from_value(self.document).map_err(|e| {
            tracing::error!(error = %e, "stored deployment document does not decode");
            sqlx::Error::Decode(Box::new(e))
        })?;
        let seeds: HashMap<String, String> =
            serde_json::from_value(self.asset_seeds).map_err(|e| {
                tracing::error!(deployment_id = %deployment.id, error = %e, "stored asset seeds do not decode");
                sqlx::Error::Decode(Box::new(e))
            })?;
        restore_seeds(&mut deployment, &seeds);
        Ok(deployment)
    }
}

fn restore_seeds(deployment: &mut Deployment, seeds: &HashMap<String, String>) {
    for asset in &mut deployment.assets {
        match seeds.get(asset.asset_id.as_str()) {
            Some(seed) => asset.seed = QrSeed::new(seed.as_str()),
            None => tracing::warn!(
                deployment_id = %deployment.id,
                asset_id = %asset.asset_id,
                "no stored seed for asset; its tokens will not verify"
            ),
        }
    }
}
