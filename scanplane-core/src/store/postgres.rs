//! Postgres-backed stores.
//!
//! `scan_results` carries a unique constraint on `(digest, endpoint_id)`; the
//! create gate additionally locks the existing row so the check and the
//! insert happen in one transaction. Result creation and adapter removal
//! both take a transaction-scoped advisory lock keyed by the adapter id.
//! Status writes are conditional updates on `status_code` and never
//! read-modify-write.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scanplane_model::{AdapterId, Endpoint, ResultId, ScanResult, ScanStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use super::{AdapterRemoval, AdapterStore, CreateOutcome, EndpointQuery, ResultStore};
use crate::error::{Result, ScanError};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const RESULT_COLUMNS: &str = "id, digest, endpoint_id, vendor, job_id, status, \
     status_code, report, start_time, end_time";

const ENDPOINT_COLUMNS: &str = "uid, url, auth, access_cred, adapter, disabled, \
     is_default, create_time, update_time";

fn result_from_row(row: &PgRow) -> Result<ScanResult> {
    let status: String = row.try_get("status")?;
    let status: ScanStatus = status
        .parse()
        .map_err(|e| ScanError::Store(format!("corrupt status column: {e}")))?;
    let endpoint_id: String = row.try_get("endpoint_id")?;
    Ok(ScanResult {
        id: ResultId(row.try_get("id")?),
        digest: row.try_get("digest")?,
        adapter_id: AdapterId(endpoint_id),
        vendor: row.try_get("vendor")?,
        job_id: row.try_get("job_id")?,
        status,
        status_code: row.try_get("status_code")?,
        report: row.try_get("report")?,
        start_time: row.try_get::<DateTime<Utc>, _>("start_time")?,
        end_time: row.try_get::<Option<DateTime<Utc>>, _>("end_time")?,
    })
}

fn endpoint_from_row(row: &PgRow) -> Result<Endpoint> {
    let uid: String = row.try_get("uid")?;
    Ok(Endpoint {
        id: AdapterId(uid),
        url: row.try_get("url")?,
        auth: row.try_get("auth")?,
        access_credential: row.try_get("access_cred")?,
        adapter: row.try_get("adapter")?,
        disabled: row.try_get("disabled")?,
        is_default: row.try_get("is_default")?,
        create_time: row.try_get("create_time")?,
        update_time: row.try_get("update_time")?,
    })
}

async fn lock_adapter(tx: &mut Transaction<'_, Postgres>, id: &AdapterId) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("scanner_endpoint:{}", id.as_str()))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Case-insensitive substring pattern with `%`, `_` and `\` taken literally.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[derive(Clone)]
pub struct PostgresResultStore {
    pool: PgPool,
}

impl fmt::Debug for PostgresResultStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresResultStore")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    async fn insert_superseding(&self, result: ScanResult) -> Result<CreateOutcome> {
        let mut tx = self.pool.begin().await?;
        lock_adapter(&mut tx, &result.adapter_id).await?;

        let registered: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM scanner_endpoints WHERE uid = $1)",
        )
        .bind(result.adapter_id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if !registered {
            tx.rollback().await?;
            return Ok(CreateOutcome::UnknownAdapter);
        }

        let lock_sql = format!(
            "SELECT {RESULT_COLUMNS} FROM scan_results \
             WHERE digest = $1 AND endpoint_id = $2 FOR UPDATE"
        );
        let existing = sqlx::query(&lock_sql)
            .bind(&result.digest)
            .bind(result.adapter_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = existing.as_ref() {
            let existing = result_from_row(row)?;
            if existing.is_active() {
                tx.rollback().await?;
                return Ok(CreateOutcome::Active(existing));
            }
            sqlx::query("DELETE FROM scan_results WHERE id = $1")
                .bind(existing.id.get())
                .execute(&mut *tx)
                .await?;
            debug!(id = %existing.id, "superseded terminal scan result");
        }

        let inserted = sqlx::query(
            "INSERT INTO scan_results \
             (digest, endpoint_id, vendor, job_id, status, status_code, report, start_time, end_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (digest, endpoint_id) DO NOTHING \
             RETURNING id",
        )
        .bind(&result.digest)
        .bind(result.adapter_id.as_str())
        .bind(&result.vendor)
        .bind(&result.job_id)
        .bind(result.status.as_str())
        .bind(result.status_code)
        .bind(&result.report)
        .bind(result.start_time)
        .bind(result.end_time)
        .fetch_optional(&mut *tx)
        .await?;

        match inserted {
            Some(row) => {
                let id: i64 = row.try_get("id")?;
                tx.commit().await?;
                Ok(CreateOutcome::Created(ResultId(id)))
            }
            None => {
                // A concurrent transaction inserted the pair first.
                tx.rollback().await?;
                let winner = self
                    .find(&result.digest, &result.adapter_id)
                    .await?
                    .ok_or_else(|| {
                        ScanError::Store(
                            "scan result vanished after a conflicting insert".into(),
                        )
                    })?;
                Ok(CreateOutcome::Active(winner))
            }
        }
    }

    async fn update(&self, result: &ScanResult) -> Result<bool> {
        let outcome = sqlx::query(
            "UPDATE scan_results SET \
               report = $2, end_time = $3, job_id = $4, \
               status = CASE WHEN status_code < $6 THEN $5 ELSE status END, \
               status_code = GREATEST(status_code, $6) \
             WHERE id = $1",
        )
        .bind(result.id.get())
        .bind(&result.report)
        .bind(result.end_time)
        .bind(&result.job_id)
        .bind(result.status.as_str())
        .bind(result.status.code())
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn update_status_if_advancing(
        &self,
        id: ResultId,
        status: ScanStatus,
    ) -> Result<bool> {
        let outcome = sqlx::query(
            "UPDATE scan_results SET status = $2, status_code = $3 \
             WHERE id = $1 AND status_code < $3",
        )
        .bind(id.get())
        .bind(status.as_str())
        .bind(status.code())
        .execute(&self.pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn set_job_id(&self, id: ResultId, job_id: &str) -> Result<bool> {
        let outcome = sqlx::query("UPDATE scan_results SET job_id = $2 WHERE id = $1")
            .bind(id.get())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn get(&self, id: ResultId) -> Result<Option<ScanResult>> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM scan_results WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(result_from_row).transpose()
    }

    async fn find(
        &self,
        digest: &str,
        adapter_id: &AdapterId,
    ) -> Result<Option<ScanResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM scan_results \
             WHERE digest = $1 AND endpoint_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(digest)
            .bind(adapter_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(result_from_row).transpose()
    }

    async fn list_by_digest(&self, digest: &str) -> Result<Vec<ScanResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM scan_results WHERE digest = $1 ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(digest)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(result_from_row).collect()
    }

    async fn delete(&self, id: ResultId) -> Result<bool> {
        let outcome = sqlx::query("DELETE FROM scan_results WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(outcome.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PostgresAdapterStore {
    pool: PgPool,
}

impl fmt::Debug for PostgresAdapterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresAdapterStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresAdapterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Verifies connectivity and applies pending migrations.
    pub async fn migrate(pool: &PgPool) -> Result<()> {
        MIGRATOR
            .run(pool)
            .await
            .map_err(|e| ScanError::Store(format!("migration failed: {e}")))?;
        info!("scanner schema migrations applied");
        Ok(())
    }
}

fn map_unique(err: sqlx::Error, endpoint: &Endpoint) -> ScanError {
    if is_unique_violation(&err) {
        ScanError::ResourceConflict(format!(
            "endpoint {} or url {} is already registered",
            endpoint.id, endpoint.url
        ))
    } else {
        err.into()
    }
}

#[async_trait]
impl AdapterStore for PostgresAdapterStore {
    async fn insert(&self, endpoint: &Endpoint) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if endpoint.is_default {
            sqlx::query(
                "UPDATE scanner_endpoints SET is_default = FALSE, update_time = NOW() \
                 WHERE is_default AND uid <> $1",
            )
            .bind(endpoint.id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "INSERT INTO scanner_endpoints \
             (uid, url, auth, access_cred, adapter, disabled, is_default, create_time, update_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(endpoint.id.as_str())
        .bind(&endpoint.url)
        .bind(&endpoint.auth)
        .bind(&endpoint.access_credential)
        .bind(&endpoint.adapter)
        .bind(endpoint.disabled)
        .bind(endpoint.is_default)
        .bind(endpoint.create_time)
        .bind(endpoint.update_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, endpoint))?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &AdapterId) -> Result<Option<Endpoint>> {
        let sql = format!("SELECT {ENDPOINT_COLUMNS} FROM scanner_endpoints WHERE uid = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(endpoint_from_row).transpose()
    }

    async fn update(&self, endpoint: &Endpoint) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        if endpoint.is_default {
            sqlx::query(
                "UPDATE scanner_endpoints SET is_default = FALSE, update_time = NOW() \
                 WHERE is_default AND uid <> $1",
            )
            .bind(endpoint.id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        let outcome = sqlx::query(
            "UPDATE scanner_endpoints SET url = $2, auth = $3, access_cred = $4, \
             adapter = $5, disabled = $6, is_default = $7, update_time = $8 \
             WHERE uid = $1",
        )
        .bind(endpoint.id.as_str())
        .bind(&endpoint.url)
        .bind(&endpoint.auth)
        .bind(&endpoint.access_credential)
        .bind(&endpoint.adapter)
        .bind(endpoint.disabled)
        .bind(endpoint.is_default)
        .bind(endpoint.update_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, endpoint))?;
        tx.commit().await?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn delete(&self, id: &AdapterId) -> Result<AdapterRemoval> {
        let mut tx = self.pool.begin().await?;
        lock_adapter(&mut tx, id).await?;

        let busy: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM scan_results \
             WHERE endpoint_id = $1 AND status_code < 2)",
        )
        .bind(id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if busy {
            tx.rollback().await?;
            return Ok(AdapterRemoval::Busy);
        }

        let outcome = sqlx::query("DELETE FROM scanner_endpoints WHERE uid = $1")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(if outcome.rows_affected() > 0 {
            AdapterRemoval::Removed
        } else {
            AdapterRemoval::Missing
        })
    }

    async fn list(&self, query: &EndpointQuery) -> Result<Vec<Endpoint>> {
        let mut sql = format!("SELECT {ENDPOINT_COLUMNS} FROM scanner_endpoints WHERE TRUE");
        let mut binds = Vec::new();
        // Keyword names double as column names.
        for column in EndpointQuery::KEYWORDS {
            if let Some(value) = query.keywords.get(column) {
                binds.push(like_pattern(value));
                sql.push_str(&format!(
                    " AND LOWER({column}) LIKE ${} ESCAPE '\\'",
                    binds.len()
                ));
            }
        }
        sql.push_str(" ORDER BY create_time, uid");
        if let Some((offset, limit)) = query.window() {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }

        let mut statement = sqlx::query(&sql);
        for value in &binds {
            statement = statement.bind(value);
        }
        let rows = statement.fetch_all(&self.pool).await?;
        rows.iter().map(endpoint_from_row).collect()
    }

    async fn default_endpoint(&self) -> Result<Option<Endpoint>> {
        let sql = format!(
            "SELECT {ENDPOINT_COLUMNS} FROM scanner_endpoints \
             WHERE is_default AND NOT disabled LIMIT 1"
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(endpoint_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder(digest: &str, adapter: &str) -> ScanResult {
        ScanResult::new(digest, AdapterId::from(adapter), "trivy")
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Trivy"), "%trivy%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    async fn registered(pool: &PgPool) -> PostgresAdapterStore {
        let adapters = PostgresAdapterStore::new(pool.clone());
        adapters
            .insert(&Endpoint::new("trivy-1", "http://trivy:8080", "trivy"))
            .await
            .unwrap();
        adapters
    }

    #[sqlx::test(migrator = "crate::store::postgres::MIGRATOR")]
    async fn create_gate_and_monotonic_status(pool: PgPool) {
        registered(&pool).await;
        let store = PostgresResultStore::new(pool);
        let CreateOutcome::Created(id) = store
            .insert_superseding(placeholder("sha256:abc", "trivy-1"))
            .await
            .unwrap()
        else {
            panic!("first insert must create");
        };

        let again = store
            .insert_superseding(placeholder("sha256:abc", "trivy-1"))
            .await
            .unwrap();
        assert!(matches!(again, CreateOutcome::Active(_)));

        assert!(store
            .update_status_if_advancing(id, ScanStatus::Success)
            .await
            .unwrap());
        assert!(!store
            .update_status_if_advancing(id, ScanStatus::Running)
            .await
            .unwrap());

        let superseded = store
            .insert_superseding(placeholder("sha256:abc", "trivy-1"))
            .await
            .unwrap();
        assert!(matches!(superseded, CreateOutcome::Created(new_id) if new_id != id));
        assert_eq!(store.list_by_digest("sha256:abc").await.unwrap().len(), 1);
    }

    #[sqlx::test(migrator = "crate::store::postgres::MIGRATOR")]
    async fn endpoint_url_is_unique(pool: PgPool) {
        let store = PostgresAdapterStore::new(pool);
        store
            .insert(&Endpoint::new("a", "http://trivy:8080", "trivy").as_default())
            .await
            .unwrap();
        let err = store
            .insert(&Endpoint::new("b", "http://trivy:8080", "trivy"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ResourceConflict(_)));
        let default = store.default_endpoint().await.unwrap().unwrap();
        assert_eq!(default.id.as_str(), "a");
    }

    #[sqlx::test(migrator = "crate::store::postgres::MIGRATOR")]
    async fn delete_and_create_respect_each_other(pool: PgPool) {
        let adapters = registered(&pool).await;
        let results = PostgresResultStore::new(pool);
        let id = AdapterId::from("trivy-1");

        let CreateOutcome::Created(row) = results
            .insert_superseding(placeholder("sha256:abc", "trivy-1"))
            .await
            .unwrap()
        else {
            panic!("insert must create");
        };
        assert_eq!(adapters.delete(&id).await.unwrap(), AdapterRemoval::Busy);

        results
            .update_status_if_advancing(row, ScanStatus::Error)
            .await
            .unwrap();
        assert_eq!(adapters.delete(&id).await.unwrap(), AdapterRemoval::Removed);
        assert_eq!(
            results
                .insert_superseding(placeholder("sha256:def", "trivy-1"))
                .await
                .unwrap(),
            CreateOutcome::UnknownAdapter
        );
    }

    #[sqlx::test(migrator = "crate::store::postgres::MIGRATOR")]
    async fn keyword_wildcards_match_literally(pool: PgPool) {
        let store = PostgresAdapterStore::new(pool);
        store
            .insert(&Endpoint::new("a", "http://scan_a:8080", "trivy"))
            .await
            .unwrap();
        store
            .insert(&Endpoint::new("b", "http://scanxa:8080", "trivy"))
            .await
            .unwrap();

        let query = EndpointQuery::default().with_keyword("url", "scan_a");
        let found = store.list(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_str(), "a");
    }
}
