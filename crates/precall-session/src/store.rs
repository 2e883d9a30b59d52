use crate::session::Session;
use async_trait::async_trait;
use precall_core::{PrecallError, PrecallResult};
use std::path::PathBuf;
use uuid::Uuid;

/// Durable session metadata storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session.
    async fn create(&self, session: &Session) -> PrecallResult<()>;
    /// Loads a session by id; `None` if it does not exist.
    async fn get(&self, id: Uuid) -> PrecallResult<Option<Session>>;
    /// Upserts a session.
    async fn update(&self, session: &Session) -> PrecallResult<()>;
    /// Removes a session. Removing a missing session is not an error.
    async fn delete(&self, id: Uuid) -> PrecallResult<()>;
}

/// File-based session store: one JSON file per session.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Opens the store, creating `dir` if needed.
    pub async fn new(dir: PathBuf) -> PrecallResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session: &Session) -> PrecallResult<()> {
        let path = self.session_path(session.id);
        let json = serde_json::to_string_pretty(session)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> PrecallResult<Option<Session>> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let session: Session = serde_json::from_str(&data)
            .map_err(|e| PrecallError::Session(format!("Failed to parse session: {e}")))?;
        Ok(Some(session))
    }

    async fn update(&self, session: &Session) -> PrecallResult<()> {
        self.create(session).await
    }

    async fn delete(&self, id: Uuid) -> PrecallResult<()> {
        let path = self.session_path(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path().to_path_buf()).await.unwrap();

        let mut session = Session::new("sales", "en-US");
        session.pin = Some("4921".into());
        session.consent = true;
        store.create(&session).await.unwrap();

        let loaded = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.agent_role, "sales");
        assert_eq!(loaded.pin.as_deref(), Some("4921"));
        assert!(loaded.consent);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path().to_path_buf()).await.unwrap();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_persists_status_transition() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path().to_path_buf()).await.unwrap();

        let mut session = Session::new("sales", "en-US");
        store.create(&session).await.unwrap();

        assert!(session.complete());
        store.update(&session).await.unwrap();

        let loaded = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, crate::session::SessionStatus::Completed);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FileSessionStore::new(tmp.path().to_path_buf()).await.unwrap();

        let session = Session::new("sales", "en-US");
        store.create(&session).await.unwrap();
        store.delete(session.id).await.unwrap();
        store.delete(session.id).await.unwrap();
        assert!(store.get(session.id).await.unwrap().is_none());
    }
}
