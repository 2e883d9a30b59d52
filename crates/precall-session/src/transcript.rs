use async_trait::async_trait;
use chrono::Utc;
use precall_core::{MessageRecord, NewMessage, PrecallError, PrecallResult};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// The ordered per-session message log.
///
/// `append` assigns the next monotonic sequence position for the message's
/// session, making total order a store guarantee. Records are immutable
/// once appended.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Appends a message, assigning its sequence position, and returns the
    /// persisted record.
    async fn append(&self, message: NewMessage) -> PrecallResult<MessageRecord>;
    /// Reads the full transcript of a session ordered by sequence position.
    async fn read(&self, session_id: Uuid) -> PrecallResult<Vec<MessageRecord>>;
}

/// File-based transcript store: one JSONL file per session.
pub struct FileTranscriptStore {
    dir: PathBuf,
    // Next seq per session; lazily initialized from the file. The mutex is
    // held across the append so seq assignment and the write are atomic
    // per key.
    next_seq: Mutex<HashMap<Uuid, u64>>,
}

impl FileTranscriptStore {
    /// Opens the store, creating `dir` if needed.
    pub async fn new(dir: PathBuf) -> PrecallResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            next_seq: Mutex::new(HashMap::new()),
        })
    }

    fn transcript_path(&self, session_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}.transcript.jsonl"))
    }

    async fn load_records(&self, session_id: Uuid) -> PrecallResult<Vec<MessageRecord>> {
        let path = self.transcript_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut records: Vec<MessageRecord> = data
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PrecallError::Transcript(format!("Failed to parse transcript: {e}")))?;
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn append(&self, message: NewMessage) -> PrecallResult<MessageRecord> {
        let session_id = message.session_id;
        let mut counters = self.next_seq.lock().await;

        let next = match counters.get(&session_id) {
            Some(n) => *n,
            None => {
                let existing = self.load_records(session_id).await?;
                existing.last().map_or(0, |r| r.seq + 1)
            }
        };

        let record = MessageRecord {
            session_id,
            turn_id: message.turn_id,
            seq: next,
            sender: message.sender,
            content: message.content,
            content_type: message.content_type,
            stage: message.stage,
            created_at: Utc::now(),
            expires_at: message.expires_at,
        };

        let path = self.transcript_path(session_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let _ = counters.insert(session_id, next + 1);
        Ok(record)
    }

    async fn read(&self, session_id: Uuid) -> PrecallResult<Vec<MessageRecord>> {
        self.load_records(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use precall_core::{ContentType, Sender};

    fn inbound(session_id: Uuid, turn_id: &str, content: &str) -> NewMessage {
        NewMessage {
            session_id,
            turn_id: turn_id.into(),
            sender: Sender::Customer,
            content: content.into(),
            content_type: ContentType::PlainText,
            stage: "pre_consultation".into(),
            expires_at: Utc::now() + Duration::days(90),
        }
    }

    fn outbound(session_id: Uuid, turn_id: &str, content: &str) -> NewMessage {
        NewMessage {
            sender: Sender::Agent,
            ..inbound(session_id, turn_id, content)
        }
    }

    #[tokio::test]
    async fn append_assigns_monotonic_seq() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileTranscriptStore::new(tmp.path().to_path_buf()).await.unwrap();
        let sid = Uuid::new_v4();

        let a = store.append(inbound(sid, "t1", "hello")).await.unwrap();
        let b = store.append(outbound(sid, "t1", "hi there")).await.unwrap();
        let c = store.append(inbound(sid, "t2", "next")).await.unwrap();

        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
        assert_eq!(c.seq, 2);
    }

    #[tokio::test]
    async fn read_returns_records_in_seq_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileTranscriptStore::new(tmp.path().to_path_buf()).await.unwrap();
        let sid = Uuid::new_v4();

        store.append(inbound(sid, "t1", "first")).await.unwrap();
        store.append(outbound(sid, "t1", "second")).await.unwrap();

        let records = store.read(sid).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sender, Sender::Customer);
        assert_eq!(records[1].sender, Sender::Agent);
        assert!(records[0].seq < records[1].seq);
    }

    #[tokio::test]
    async fn seq_continues_across_store_instances() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        let sid = Uuid::new_v4();

        {
            let store = FileTranscriptStore::new(dir.clone()).await.unwrap();
            store.append(inbound(sid, "t1", "one")).await.unwrap();
            store.append(outbound(sid, "t1", "two")).await.unwrap();
        }

        let store2 = FileTranscriptStore::new(dir).await.unwrap();
        let rec = store2.append(inbound(sid, "t2", "three")).await.unwrap();
        assert_eq!(rec.seq, 2);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileTranscriptStore::new(tmp.path().to_path_buf()).await.unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.append(inbound(a, "t1", "for a")).await.unwrap();
        let rec = store.append(inbound(b, "t1", "for b")).await.unwrap();

        assert_eq!(rec.seq, 0);
        assert_eq!(store.read(a).await.unwrap().len(), 1);
        assert_eq!(store.read(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_transcript_reads_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileTranscriptStore::new(tmp.path().to_path_buf()).await.unwrap();
        assert!(store.read(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
