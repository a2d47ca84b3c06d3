use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use tracing::info;

use super::MetadataStore;
use crate::{BlobError, BlobRecord, BlobResult, UploadClaim, UploadLease, UploadToken};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS blobs (
    name          TEXT PRIMARY KEY,
    backend       TEXT NOT NULL,
    uploaded      INTEGER NOT NULL DEFAULT 0,
    created_at    INTEGER NOT NULL,
    upload_token  TEXT,
    lease_until   INTEGER
);
CREATE INDEX IF NOT EXISTS idx_blobs_pending ON blobs (uploaded, created_at);
";

const SELECT_COLUMNS: &str =
    "SELECT name, backend, uploaded, created_at, upload_token, lease_until FROM blobs";

/// SQLite-backed metadata store
///
/// Timestamps are stored as unix milliseconds. A single pooled connection
/// serializes writes, which is what makes `create` and `claim_upload`
/// atomic.
#[derive(Debug, Clone)]
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Open (or create) the database file at `path`
    pub async fn open(path: impl AsRef<Path>) -> BlobResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new().filename(path);
        Self::connect_with(options).await
    }

    /// Connect using a `sqlite:` URL, e.g. `sqlite://nimble.db`
    pub async fn connect(url: &str) -> BlobResult<Self> {
        let options = SqliteConnectOptions::from_str(url).map_err(BlobError::backend)?;
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> BlobResult<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(BlobError::backend)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> BlobResult<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(BlobError::backend)?;
        info!("SQLite metadata schema ready");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_record(&self, name: &str) -> BlobResult<Option<BlobRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE name = ?1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(BlobError::backend)?;

        row.as_ref().map(record_from_row).transpose()
    }
}

fn millis_to_utc(millis: i64) -> BlobResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        BlobError::backend(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("timestamp out of range: {millis}"),
        ))
    })
}

fn record_from_row(row: &SqliteRow) -> BlobResult<BlobRecord> {
    let token: Option<String> = row.try_get("upload_token").map_err(BlobError::backend)?;
    let lease_until: Option<i64> = row.try_get("lease_until").map_err(BlobError::backend)?;

    let upload = match (token, lease_until) {
        (Some(token), Some(until)) => Some(UploadLease {
            token: UploadToken::from_string(token),
            lease_until: millis_to_utc(until)?,
        }),
        _ => None,
    };

    Ok(BlobRecord {
        name: row.try_get("name").map_err(BlobError::backend)?,
        backend: row.try_get("backend").map_err(BlobError::backend)?,
        uploaded: row.try_get("uploaded").map_err(BlobError::backend)?,
        created_at: millis_to_utc(row.try_get("created_at").map_err(BlobError::backend)?)?,
        upload,
    })
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn exists(&self, name: &str) -> BlobResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM blobs WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(BlobError::backend)?;
        Ok(found.is_some())
    }

    async fn create(&self, name: &str, backend: &str) -> BlobResult<BlobRecord> {
        let record = BlobRecord::new(name, backend);

        let result = sqlx::query(
            "INSERT INTO blobs (name, backend, uploaded, created_at) VALUES (?1, ?2, 0, ?3)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&record.name)
        .bind(&record.backend)
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(BlobError::backend)?;

        // Zero rows: a record with this name already exists
        if result.rows_affected() == 0 {
            return Err(BlobError::conflict(name));
        }
        Ok(record)
    }

    async fn get(&self, name: &str) -> BlobResult<BlobRecord> {
        self.fetch_record(name)
            .await?
            .ok_or_else(|| BlobError::not_found(name))
    }

    async fn mark_uploaded(&self, name: &str) -> BlobResult<()> {
        let result = sqlx::query(
            "UPDATE blobs SET uploaded = 1, upload_token = NULL, lease_until = NULL WHERE name = ?1",
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(BlobError::backend)?;

        if result.rows_affected() == 0 {
            return Err(BlobError::not_found(name));
        }
        Ok(())
    }

    async fn claim_upload(
        &self,
        name: &str,
        token: &UploadToken,
        lease_until: DateTime<Utc>,
    ) -> BlobResult<UploadClaim> {
        let now = Utc::now().timestamp_millis();

        let result = sqlx::query(
            "UPDATE blobs SET upload_token = ?1, lease_until = ?2
             WHERE name = ?3 AND uploaded = 0
               AND (upload_token IS NULL OR lease_until IS NULL OR lease_until <= ?4)",
        )
        .bind(token.as_str())
        .bind(lease_until.timestamp_millis())
        .bind(name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(BlobError::backend)?;

        if result.rows_affected() == 1 {
            return Ok(UploadClaim::Acquired);
        }

        let record = self.get(name).await?;
        if record.uploaded {
            return Ok(UploadClaim::AlreadyUploaded);
        }
        Ok(UploadClaim::Held {
            lease_until: record
                .upload
                .map(|lease| lease.lease_until)
                .unwrap_or(lease_until),
        })
    }

    async fn release_upload(&self, name: &str, token: &UploadToken) -> BlobResult<()> {
        let result = sqlx::query(
            "UPDATE blobs SET upload_token = NULL, lease_until = NULL
             WHERE name = ?1 AND upload_token = ?2",
        )
        .bind(name)
        .bind(token.as_str())
        .execute(&self.pool)
        .await
        .map_err(BlobError::backend)?;

        if result.rows_affected() == 0 && !self.exists(name).await? {
            return Err(BlobError::not_found(name));
        }
        Ok(())
    }

    async fn list_pending(&self) -> BlobResult<Vec<BlobRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE uploaded = 0 ORDER BY created_at, name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(BlobError::backend)?;

        rows.iter().map(record_from_row).collect()
    }
}
