use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use precall_core::{PrecallError, PrecallResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// How long a connection binding stays valid.
pub const CONNECTION_TTL_HOURS: i64 = 24;

/// A durable binding from a live connection to its session.
///
/// Created when a connection is accepted, deleted at disconnect or expiry.
/// At most one record exists per connection id; a session may have several
/// concurrently bound connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Transport-assigned connection identifier.
    pub id: Uuid,
    /// The session this connection is bound to.
    pub session_id: Uuid,
    /// UTC timestamp of connection accept.
    pub connected_at: DateTime<Utc>,
    /// Expiry of the binding.
    pub expires_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Creates a binding expiring [`CONNECTION_TTL_HOURS`] from now.
    pub fn new(id: Uuid, session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            session_id,
            connected_at: now,
            expires_at: now + Duration::hours(CONNECTION_TTL_HOURS),
        }
    }

    /// Whether the binding has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Durable connection-to-session binding storage with expiry.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Upserts a binding.
    async fn put(&self, record: &ConnectionRecord) -> PrecallResult<()>;
    /// Loads a binding; expired records are treated as absent.
    async fn get(&self, id: Uuid) -> PrecallResult<Option<ConnectionRecord>>;
    /// Deletes a binding. Deleting a missing binding is not an error.
    async fn delete(&self, id: Uuid) -> PrecallResult<()>;
}

/// File-based connection store: one JSON file per connection.
pub struct FileConnectionStore {
    dir: PathBuf,
}

impl FileConnectionStore {
    /// Opens the store, creating `dir` if needed.
    pub async fn new(dir: PathBuf) -> PrecallResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.connection.json"))
    }
}

#[async_trait]
impl ConnectionStore for FileConnectionStore {
    async fn put(&self, record: &ConnectionRecord) -> PrecallResult<()> {
        let path = self.record_path(record.id);
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> PrecallResult<Option<ConnectionRecord>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let record: ConnectionRecord = serde_json::from_str(&data)
            .map_err(|e| PrecallError::Connection(format!("Failed to parse connection: {e}")))?;
        if record.is_expired() {
            // Lazy expiry: drop the stale file on read.
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn delete(&self, id: Uuid) -> PrecallResult<()> {
        let path = self.record_path(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}
