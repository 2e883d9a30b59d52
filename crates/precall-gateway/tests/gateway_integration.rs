#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end gateway tests over a real WebSocket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use precall_agent::backends::{AgentBackend, AgentReply};
use precall_agent::directory::{AgentEndpoint, StaticAgentDirectory};
use precall_agent::{AgentClient, StreamEvent};
use precall_core::{AgentOverrides, PrecallResult};
use precall_gateway::{GatewayDeps, GatewayServer, StaticTokenVerifier};
use precall_session::{
    FileConnectionStore, FileSessionStore, FileTranscriptStore, Session, TranscriptStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Backend replaying a fixed event script.
struct ScriptedBackend {
    events: Vec<StreamEvent>,
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    async fn invoke(
        &self,
        _endpoint: &AgentEndpoint,
        _session_id: Uuid,
        _prompt: &str,
    ) -> PrecallResult<(
        mpsc::Receiver<StreamEvent>,
        JoinHandle<PrecallResult<AgentReply>>,
    )> {
        let events = self.events.clone();
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(async move {
            let mut full_text = String::new();
            for event in events {
                if let StreamEvent::TextChunk { text } = &event {
                    full_text.push_str(text);
                }
                let _ = tx.send(event).await;
            }
            Ok(AgentReply { text: full_text })
        });
        Ok((rx, handle))
    }
}

struct TestServer {
    addr: String,
    sessions: Arc<FileSessionStore>,
    transcripts: Arc<FileTranscriptStore>,
    _tmp: tempfile::TempDir,
}

/// Helper: build a test server on a random port with a scripted agent.
async fn start_test_server(events: Vec<StreamEvent>) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let sessions = Arc::new(
        FileSessionStore::new(tmp.path().join("sessions"))
            .await
            .unwrap(),
    );
    let transcripts = Arc::new(
        FileTranscriptStore::new(tmp.path().join("transcripts"))
            .await
            .unwrap(),
    );
    let connections = Arc::new(
        FileConnectionStore::new(tmp.path().join("connections"))
            .await
            .unwrap(),
    );

    let mut endpoints = HashMap::new();
    for role in ["sales", "planner"] {
        endpoints.insert(
            role.to_string(),
            AgentEndpoint {
                url: "http://agent.local/invoke".into(),
                overrides: AgentOverrides::default(),
            },
        );
    }

    let app = GatewayServer::build(GatewayDeps {
        sessions: sessions.clone(),
        transcripts: transcripts.clone(),
        connections,
        agent: Arc::new(AgentClient::from_backend(Box::new(ScriptedBackend {
            events,
        }))),
        directory: Arc::new(StaticAgentDirectory::new(endpoints)),
        verifier: Arc::new(StaticTokenVerifier::new(vec!["op-token".into()])),
        message_ttl: chrono::Duration::days(90),
        planning_role: "planner".into(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let addr_str = format!("127.0.0.1:{}", addr.port());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Small yield to let the server task start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    TestServer {
        addr: addr_str,
        sessions,
        transcripts,
        _tmp: tmp,
    }
}

async fn seed_session(server: &TestServer) -> Session {
    let mut session = Session::new("sales", "en-US");
    session.pin = Some("4921".into());
    session.consent = true;
    use precall_session::SessionStore;
    server.sessions.create(&session).await.unwrap();
    session
}

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_ws(addr: &str) -> Ws {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

async fn next_json(ws: &mut Ws) -> serde_json::Value {
    let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    serde_json::from_str(&msg.into_text().unwrap()).unwrap()
}

async fn authorize(ws: &mut Ws, session: &Session) {
    let frame = serde_json::json!({
        "action": "connect",
        "sessionId": session.id,
        "pin": "4921",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();
    let reply = next_json(ws).await;
    assert_eq!(reply["type"], "connected");
}

#[tokio::test]
async fn health_endpoint_responds() {
    let server = start_test_server(vec![]).await;
    let url = format!("http://{}/health", server.addr);
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "precall");
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn pin_connect_is_accepted() {
    let server = start_test_server(vec![]).await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    let frame = serde_json::json!({
        "action": "connect",
        "sessionId": session.id,
        "pin": "4921",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "connected");
    assert_eq!(reply["sessionId"], session.id.to_string());
    assert!(reply["connectionId"].is_string());

    // The live registry tracks the authorized connection.
    let url = format!("http://{}/health", server.addr);
    let health: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(health["connections"], 1);
}

#[tokio::test]
async fn wrong_pin_is_rejected_and_socket_closed() {
    let server = start_test_server(vec![]).await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    let frame = serde_json::json!({
        "action": "connect",
        "sessionId": session.id,
        "pin": "0000",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");

    // The server closes the socket after an authorization failure.
    let next = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .unwrap();
    assert!(matches!(next, None | Some(Ok(Message::Close(_)))));
}

#[tokio::test]
async fn token_connect_is_accepted() {
    let server = start_test_server(vec![]).await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    let frame = serde_json::json!({
        "action": "connect",
        "sessionId": session.id,
        "token": "op-token",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "connected");
}

#[tokio::test]
async fn send_message_streams_chunks_then_done() {
    let server = start_test_server(vec![
        StreamEvent::TextChunk {
            text: "Hello ".into(),
        },
        StreamEvent::TextChunk {
            text: "there.".into(),
        },
    ])
    .await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    authorize(&mut ws, &session).await;

    let frame = serde_json::json!({
        "action": "sendMessage",
        "sessionId": session.id,
        "message": "hi",
        "turnId": "t-1",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let first = next_json(&mut ws).await;
    assert_eq!(first["type"], "chunk");
    assert_eq!(first["content"], "Hello ");

    let second = next_json(&mut ws).await;
    assert_eq!(second["type"], "chunk");

    let done = next_json(&mut ws).await;
    assert_eq!(done["type"], "done");
    assert_eq!(done["contentType"], "plain-text");
    assert_eq!(done["isComplete"], false);
    assert_eq!(done["turnId"], "t-1");

    let transcript = server.transcripts.read(session.id).await.unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].content, "Hello there.");
}

#[tokio::test]
async fn completing_turn_reports_is_complete() {
    let server = start_test_server(vec![StreamEvent::TextChunk {
        text: "Thanks for your time. EOF".into(),
    }])
    .await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    authorize(&mut ws, &session).await;

    let frame = serde_json::json!({
        "action": "sendMessage",
        "sessionId": session.id,
        "message": "bye",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let chunk = next_json(&mut ws).await;
    assert_eq!(chunk["type"], "chunk");
    let done = next_json(&mut ws).await;
    assert_eq!(done["type"], "done");
    assert_eq!(done["isComplete"], true);

    let transcript = server.transcripts.read(session.id).await.unwrap();
    assert_eq!(transcript[1].content, "Thanks for your time.");
}

#[tokio::test]
async fn send_message_without_connect_is_an_error() {
    let server = start_test_server(vec![]).await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    let frame = serde_json::json!({
        "action": "sendMessage",
        "sessionId": session.id,
        "message": "hi",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(server.transcripts.read(session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn unroutable_frame_gets_single_error_event() {
    let server = start_test_server(vec![]).await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    authorize(&mut ws, &session).await;

    ws.send(Message::Text("{\"action\":\"warpDrive\"}".to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");

    // The connection is still usable afterwards.
    let frame = serde_json::json!({
        "action": "sendPlanningMessage",
        "sessionId": session.id,
        "message": "plan?",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert!(reply["type"] == "done" || reply["type"] == "chunk");
}

#[tokio::test]
async fn planning_turn_is_not_persisted() {
    let server = start_test_server(vec![StreamEvent::TextChunk {
        text: "Plan: open with budget.".into(),
    }])
    .await;
    let session = seed_session(&server).await;

    let mut ws = connect_ws(&server.addr).await;
    authorize(&mut ws, &session).await;

    let frame = serde_json::json!({
        "action": "sendPlanningMessage",
        "sessionId": session.id,
        "message": "how should I open the call?",
    });
    ws.send(Message::Text(frame.to_string())).await.unwrap();

    let chunk = next_json(&mut ws).await;
    assert_eq!(chunk["type"], "chunk");
    let done = next_json(&mut ws).await;
    assert_eq!(done["type"], "done");
    assert_eq!(done["isComplete"], false);

    assert!(server.transcripts.read(session.id).await.unwrap().is_empty());
}
