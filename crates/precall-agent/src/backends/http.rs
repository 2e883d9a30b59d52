use super::{AgentBackend, AgentReply};
use crate::directory::AgentEndpoint;
use crate::stream::StreamEvent;
use async_trait::async_trait;
use futures_util::StreamExt;
use precall_core::{PrecallError, PrecallResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Nested-encoding unwrap limit for one wire record.
const MAX_ENCODING_DEPTH: usize = 3;

/// Backend for hosted agents reachable over HTTP.
///
/// The agent streams its response as line-delimited JSON records. Records
/// may arrive double-encoded (a JSON string whose contents are themselves
/// JSON); the backend unwraps the nesting and normalizes each record into
/// a [`StreamEvent`]. Unrecognized records are skipped.
pub struct HttpAgentBackend {
    http: reqwest::Client,
}

impl HttpAgentBackend {
    /// Creates a backend with a default HTTP client.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAgentBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentBackend for HttpAgentBackend {
    async fn invoke(
        &self,
        endpoint: &AgentEndpoint,
        session_id: Uuid,
        prompt: &str,
    ) -> PrecallResult<(
        mpsc::Receiver<StreamEvent>,
        JoinHandle<PrecallResult<AgentReply>>,
    )> {
        let mut body = serde_json::json!({
            "sessionId": session_id,
            "prompt": prompt,
        });
        if let Some(sys) = &endpoint.overrides.system_instructions {
            body["systemInstructions"] = serde_json::json!(sys);
        }
        if let Some(model) = &endpoint.overrides.model {
            body["model"] = serde_json::json!(model);
        }
        if let Some(name) = &endpoint.overrides.display_name {
            body["displayName"] = serde_json::json!(name);
        }

        let resp = self
            .http
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PrecallError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(PrecallError::Http(format!(
                "Agent endpoint error {status}: {error_body}"
            )));
        }

        let (tx, rx) = mpsc::channel::<StreamEvent>(256);
        let byte_stream = resp.bytes_stream();

        let handle = tokio::spawn(async move {
            let mut stream = byte_stream;
            let mut buffer = String::new();
            let mut full_text = String::new();
            let mut final_text: Option<String> = None;
            let mut stream_error: Option<String> = None;

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let message = format!("Stream read error: {e}");
                        let _ = tx
                            .send(StreamEvent::Error {
                                message: message.clone(),
                            })
                            .await;
                        return Err(PrecallError::Http(message));
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    if let Some(event) = normalize_line(&line) {
                        match &event {
                            StreamEvent::TextChunk { text } => full_text.push_str(text),
                            StreamEvent::FinalResult { text } => final_text = Some(text.clone()),
                            StreamEvent::Error { message } => {
                                stream_error = Some(message.clone());
                            }
                            StreamEvent::ToolInvocation { .. } => {}
                        }
                        let _ = tx.send(event).await;
                        if let Some(message) = &stream_error {
                            return Err(PrecallError::Agent(message.clone()));
                        }
                    } else {
                        debug!(line_len = line.len(), "Skipping unrecognized stream record");
                    }
                }
            }

            // Trailing record without a newline terminator.
            let tail = buffer.trim();
            if !tail.is_empty() {
                if let Some(event) = normalize_line(tail) {
                    match &event {
                        StreamEvent::TextChunk { text } => full_text.push_str(text),
                        StreamEvent::FinalResult { text } => final_text = Some(text.clone()),
                        StreamEvent::Error { message } => stream_error = Some(message.clone()),
                        StreamEvent::ToolInvocation { .. } => {}
                    }
                    let _ = tx.send(event).await;
                    if let Some(message) = stream_error {
                        return Err(PrecallError::Agent(message));
                    }
                } else {
                    debug!(line_len = tail.len(), "Skipping unrecognized stream record");
                }
            }

            Ok(AgentReply {
                text: final_text.unwrap_or(full_text),
            })
        });

        Ok((rx, handle))
    }
}

/// Decodes one wire line into a stream event.
///
/// Unwraps up to [`MAX_ENCODING_DEPTH`] nested string-encoding layers,
/// then maps the record by its `type` field. Returns `None` for records
/// this protocol version does not know.
fn normalize_line(line: &str) -> Option<StreamEvent> {
    let mut value: serde_json::Value = serde_json::from_str(line).ok()?;

    for _ in 0..MAX_ENCODING_DEPTH {
        match value {
            serde_json::Value::String(inner) => match serde_json::from_str(&inner) {
                Ok(unwrapped) => value = unwrapped,
                Err(_) => return None,
            },
            _ => break,
        }
    }

    let record = value.as_object()?;
    match record.get("type")?.as_str()? {
        "chunk" => Some(StreamEvent::TextChunk {
            text: record.get("content")?.as_str()?.to_string(),
        }),
        "tool" => Some(StreamEvent::ToolInvocation {
            tool_name: record
                .get("toolName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            status: record
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("started")
                .to_string(),
            payload: record.get("payload").cloned(),
        }),
        "final" => Some(StreamEvent::FinalResult {
            text: record.get("content")?.as_str()?.to_string(),
        }),
        "error" => Some(StreamEvent::Error {
            message: record
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("agent stream error")
                .to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use precall_core::AgentOverrides;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn normalizes_plain_records() {
        let event = normalize_line(r#"{"type":"chunk","content":"Hel"}"#).unwrap();
        assert!(matches!(event, StreamEvent::TextChunk { text } if text == "Hel"));

        let event = normalize_line(r#"{"type":"final","content":"Hello."}"#).unwrap();
        assert!(matches!(event, StreamEvent::FinalResult { text } if text == "Hello."));

        let event = normalize_line(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert!(matches!(event, StreamEvent::Error { message } if message == "boom"));
    }

    #[test]
    fn unwraps_double_encoded_records() {
        // A JSON string whose contents are a JSON record.
        let line = r#""{\"type\":\"chunk\",\"content\":\"hi\"}""#;
        let event = normalize_line(line).unwrap();
        assert!(matches!(event, StreamEvent::TextChunk { text } if text == "hi"));
    }

    #[test]
    fn unknown_records_are_skipped() {
        assert!(normalize_line(r#"{"type":"heartbeat"}"#).is_none());
        assert!(normalize_line("not json at all").is_none());
        assert!(normalize_line(r#"{"content":"no type"}"#).is_none());
    }

    #[test]
    fn tool_records_keep_payload() {
        let line = r#"{"type":"tool","toolName":"crm_lookup","status":"finished","payload":{"hits":2}}"#;
        match normalize_line(line).unwrap() {
            StreamEvent::ToolInvocation {
                tool_name,
                status,
                payload,
            } => {
                assert_eq!(tool_name, "crm_lookup");
                assert_eq!(status, "finished");
                assert_eq!(payload.unwrap()["hits"], 2);
            }
            other => panic!("expected ToolInvocation, got {other:?}"),
        }
    }

    fn endpoint(url: String) -> AgentEndpoint {
        AgentEndpoint {
            url,
            overrides: AgentOverrides::default(),
        }
    }

    #[tokio::test]
    async fn streams_chunks_and_aggregates_reply() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"type\":\"chunk\",\"content\":\"Hello \"}\n",
            "{\"type\":\"chunk\",\"content\":\"there.\"}\n",
        );
        Mock::given(method("POST"))
            .and(path("/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
            .mount(&server)
            .await;

        let backend = HttpAgentBackend::new();
        let (mut rx, handle) = backend
            .invoke(
                &endpoint(format!("{}/invoke", server.uri())),
                Uuid::new_v4(),
                "hi",
            )
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(event) = rx.recv().await {
            if let StreamEvent::TextChunk { text } = event {
                chunks.push(text);
            }
        }
        assert_eq!(chunks, vec!["Hello ", "there."]);

        let reply = handle.await.unwrap().unwrap();
        assert_eq!(reply.text, "Hello there.");
    }

    #[tokio::test]
    async fn final_record_supersedes_chunks() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"type\":\"chunk\",\"content\":\"partial\"}\n",
            "{\"type\":\"final\",\"content\":\"the consolidated text\"}\n",
        );
        Mock::given(method("POST"))
            .and(path("/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
            .mount(&server)
            .await;

        let backend = HttpAgentBackend::new();
        let (mut rx, handle) = backend
            .invoke(
                &endpoint(format!("{}/invoke", server.uri())),
                Uuid::new_v4(),
                "hi",
            )
            .await
            .unwrap();
        while rx.recv().await.is_some() {}

        let reply = handle.await.unwrap().unwrap();
        assert_eq!(reply.text, "the consolidated text");
    }

    #[tokio::test]
    async fn error_record_fails_the_invocation() {
        let server = MockServer::start().await;
        let ndjson = "{\"type\":\"error\",\"message\":\"model unavailable\"}\n";
        Mock::given(method("POST"))
            .and(path("/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
            .mount(&server)
            .await;

        let backend = HttpAgentBackend::new();
        let (mut rx, handle) = backend
            .invoke(
                &endpoint(format!("{}/invoke", server.uri())),
                Uuid::new_v4(),
                "hi",
            )
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::Error { .. }));
        assert!(handle.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn non_success_status_is_an_invoke_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/invoke"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = HttpAgentBackend::new();
        let result = backend
            .invoke(
                &endpoint(format!("{}/invoke", server.uri())),
                Uuid::new_v4(),
                "hi",
            )
            .await;
        assert!(result.is_err());
    }
}
