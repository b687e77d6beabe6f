//! Provider and model reference tables.

use super::{Database, StoreError};
use crate::config::ProviderConfig;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRecord {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub base_url: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRecord {
    pub id: i64,
    pub provider_id: i64,
    pub slug: String,
    pub name: String,
    pub context_window: u32,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub active: bool,
}

const PROVIDER_COLUMNS: &str = "id, slug, name, base_url, active";
const MODEL_COLUMNS: &str = "id, provider_id, slug, name, context_window, input_cost_per_1k, output_cost_per_1k, active";

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<ProviderRecord> {
    Ok(ProviderRecord {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        base_url: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
    })
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<ModelRecord> {
    Ok(ModelRecord {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        slug: row.get(2)?,
        name: row.get(3)?,
        context_window: row.get(4)?,
        input_cost_per_1k: row.get(5)?,
        output_cost_per_1k: row.get(6)?,
        active: row.get::<_, i64>(7)? != 0,
    })
}

impl Database {
    /// Insert or refresh a provider and its models in one transaction.
    pub async fn upsert_provider(&self, provider: &ProviderConfig) -> Result<(), StoreError> {
        let provider = provider.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO providers (id, slug, name, base_url, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     slug = excluded.slug,
                     name = excluded.name,
                     base_url = excluded.base_url,
                     active = excluded.active",
                params![
                    provider.id,
                    provider.slug,
                    provider.name,
                    provider.base_url,
                    provider.active as i64
                ],
            )?;
            for model in &provider.models {
                tx.execute(
                    "INSERT INTO models (id, provider_id, slug, name, context_window,
                                         input_cost_per_1k, output_cost_per_1k, active)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                         provider_id = excluded.provider_id,
                         slug = excluded.slug,
                         name = excluded.name,
                         context_window = excluded.context_window,
                         input_cost_per_1k = excluded.input_cost_per_1k,
                         output_cost_per_1k = excluded.output_cost_per_1k,
                         active = excluded.active",
                    params![
                        model.id,
                        provider.id,
                        model.slug,
                        model.name.clone().unwrap_or_else(|| model.slug.clone()),
                        model.context_window,
                        model.input_cost_per_1k,
                        model.output_cost_per_1k,
                        model.active as i64
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn provider_by_id(&self, id: i64) -> Result<Option<ProviderRecord>, StoreError> {
        self.run(move |conn| {
            let provider = conn
                .query_row(
                    &format!("SELECT {} FROM providers WHERE id = ?1", PROVIDER_COLUMNS),
                    params![id],
                    provider_from_row,
                )
                .optional()?;
            Ok(provider)
        })
        .await
    }

    /// Case-insensitive slug lookup.
    pub async fn provider_by_slug(&self, slug: &str) -> Result<Option<ProviderRecord>, StoreError> {
        let slug = slug.trim().to_string();
        self.run(move |conn| {
            let provider = conn
                .query_row(
                    &format!("SELECT {} FROM providers WHERE slug = ?1", PROVIDER_COLUMNS),
                    params![slug],
                    provider_from_row,
                )
                .optional()?;
            Ok(provider)
        })
        .await
    }

    pub async fn list_providers(&self) -> Result<Vec<ProviderRecord>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM providers ORDER BY id",
                PROVIDER_COLUMNS
            ))?;
            let providers = stmt
                .query_map([], provider_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(providers)
        })
        .await
    }

    pub async fn model_by_id(&self, id: i64) -> Result<Option<ModelRecord>, StoreError> {
        self.run(move |conn| {
            let model = conn
                .query_row(
                    &format!("SELECT {} FROM models WHERE id = ?1", MODEL_COLUMNS),
                    params![id],
                    model_from_row,
                )
                .optional()?;
            Ok(model)
        })
        .await
    }

    /// Case-insensitive model lookup by slug within one provider.
    pub async fn model_by_slug(
        &self,
        provider_id: i64,
        slug: &str,
    ) -> Result<Option<ModelRecord>, StoreError> {
        let slug = slug.trim().to_string();
        self.run(move |conn| {
            let model = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM models WHERE provider_id = ?1 AND slug = ?2",
                        MODEL_COLUMNS
                    ),
                    params![provider_id, slug],
                    model_from_row,
                )
                .optional()?;
            Ok(model)
        })
        .await
    }

    /// The lowest-id active model of a provider.
    pub async fn first_active_model(
        &self,
        provider_id: i64,
    ) -> Result<Option<ModelRecord>, StoreError> {
        self.run(move |conn| {
            let model = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM models WHERE provider_id = ?1 AND active = 1 ORDER BY id LIMIT 1",
                        MODEL_COLUMNS
                    ),
                    params![provider_id],
                    model_from_row,
                )
                .optional()?;
            Ok(model)
        })
        .await
    }
}
