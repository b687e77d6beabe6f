//! Per-tenant provider credential rows.

use super::{now_string, parse_timestamp, Database, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

/// A stored credential. `encrypted_key` is never the plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub id: i64,
    pub tenant_id: i64,
    pub provider_id: i64,
    pub label: String,
    pub encrypted_key: String,
    pub key_hash: String,
    pub is_default: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Insert payload; key material is already encrypted and hashed.
#[derive(Debug, Clone)]
pub struct NewCredentialRow {
    pub tenant_id: i64,
    pub provider_id: i64,
    pub label: String,
    pub encrypted_key: String,
    pub key_hash: String,
    pub is_default: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// What a revoke removed, and which sibling (if any) inherited the default.
#[derive(Debug, Clone, PartialEq)]
pub struct RevokeOutcome {
    pub provider_id: i64,
    pub was_default: bool,
    pub promoted: Option<i64>,
}

const CREDENTIAL_COLUMNS: &str = "id, tenant_id, provider_id, label, encrypted_key, key_hash, is_default, expires_at, last_used_at, created_at";

fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<CredentialRecord> {
    Ok(CredentialRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        provider_id: row.get(2)?,
        label: row.get(3)?,
        encrypted_key: row.get(4)?,
        key_hash: row.get(5)?,
        is_default: row.get::<_, i64>(6)? != 0,
        expires_at: parse_timestamp(row.get(7)?),
        last_used_at: parse_timestamp(row.get(8)?),
        created_at: parse_timestamp(row.get(9)?),
    })
}

impl Database {
    /// Insert a credential. When it is marked default, sibling defaults are
    /// cleared in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the tenant already stored the same
    /// key (by hash) for this provider.
    pub async fn insert_credential(&self, row: NewCredentialRow) -> Result<i64, StoreError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            if row.is_default {
                tx.execute(
                    "UPDATE provider_credentials SET is_default = 0
                     WHERE tenant_id = ?1 AND provider_id = ?2 AND is_default = 1",
                    params![row.tenant_id, row.provider_id],
                )?;
            }
            tx.execute(
                "INSERT INTO provider_credentials
                     (tenant_id, provider_id, label, encrypted_key, key_hash, is_default,
                      expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    row.tenant_id,
                    row.provider_id,
                    row.label,
                    row.encrypted_key,
                    row.key_hash,
                    row.is_default as i64,
                    row.expires_at.map(|at| at.to_rfc3339()),
                    now_string()
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    /// The tenant's default credential for a provider, if any.
    pub async fn default_credential(
        &self,
        tenant_id: i64,
        provider_id: i64,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.run(move |conn| {
            let record = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM provider_credentials
                         WHERE tenant_id = ?1 AND provider_id = ?2 AND is_default = 1
                         ORDER BY id DESC LIMIT 1",
                        CREDENTIAL_COLUMNS
                    ),
                    params![tenant_id, provider_id],
                    credential_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    pub async fn credential(
        &self,
        tenant_id: i64,
        credential_id: i64,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        self.run(move |conn| {
            let record = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM provider_credentials WHERE id = ?1 AND tenant_id = ?2",
                        CREDENTIAL_COLUMNS
                    ),
                    params![credential_id, tenant_id],
                    credential_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    pub async fn list_credentials(&self, tenant_id: i64) -> Result<Vec<CredentialRecord>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM provider_credentials WHERE tenant_id = ?1 ORDER BY provider_id, id",
                CREDENTIAL_COLUMNS
            ))?;
            let records = stmt
                .query_map(params![tenant_id], credential_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    /// Make `credential_id` the only default among its (tenant, provider)
    /// siblings with a single UPDATE.
    ///
    /// Returns `false` when the credential does not belong to the tenant.
    pub async fn promote_credential(
        &self,
        tenant_id: i64,
        credential_id: i64,
    ) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE provider_credentials
                 SET is_default = CASE WHEN id = ?2 THEN 1 ELSE 0 END
                 WHERE tenant_id = ?1
                   AND provider_id = (
                       SELECT provider_id FROM provider_credentials
                       WHERE id = ?2 AND tenant_id = ?1
                   )",
                params![tenant_id, credential_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Delete a credential; if it was the default, the newest remaining
    /// sibling becomes default in the same transaction.
    pub async fn revoke_credential(
        &self,
        tenant_id: i64,
        credential_id: i64,
    ) -> Result<Option<RevokeOutcome>, StoreError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let target: Option<(i64, bool)> = tx
                .query_row(
                    "SELECT provider_id, is_default FROM provider_credentials
                     WHERE id = ?1 AND tenant_id = ?2",
                    params![credential_id, tenant_id],
                    |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
                )
                .optional()?;

            let Some((provider_id, was_default)) = target else {
                return Ok(None);
            };

            tx.execute(
                "DELETE FROM provider_credentials WHERE id = ?1 AND tenant_id = ?2",
                params![credential_id, tenant_id],
            )?;

            let promoted = if was_default {
                let successor: Option<i64> = tx
                    .query_row(
                        "UPDATE provider_credentials SET is_default = 1
                         WHERE id = (
                             SELECT id FROM provider_credentials
                             WHERE tenant_id = ?1 AND provider_id = ?2
                             ORDER BY created_at DESC, id DESC LIMIT 1
                         )
                         RETURNING id",
                        params![tenant_id, provider_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                successor
            } else {
                None
            };

            tx.commit()?;
            Ok(Some(RevokeOutcome {
                provider_id,
                was_default,
                promoted,
            }))
        })
        .await
    }

    /// Record that a credential was just used for a backend call.
    pub async fn touch_credential(&self, credential_id: i64) -> Result<(), StoreError> {
        self.run(move |conn| {
            conn.execute(
                "UPDATE provider_credentials SET last_used_at = ?2 WHERE id = ?1",
                params![credential_id, now_string()],
            )?;
            Ok(())
        })
        .await
    }
}
