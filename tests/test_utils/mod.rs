//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{Router, body::Body};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_rusqlite::Connection;

use recipebot::ai::chat::TranscriptStore;
use recipebot::ai::recipe::RecipeBot;
use recipebot::api::AppState;
use recipebot::api::app;
use recipebot::core::AppConfig;
use recipebot::core::db::async_db;

pub const PANCAKES_HTML: &str = r#"<html>
<body>
  <h1>Pancakes</h1>
  <ul><li>2 cups flour</li><li>2 large eggs</li><li>1 1/2 cups milk</li></ul>
  <p>Whisk everything together.</p>
  <p>Cook on a hot griddle.</p>
</body>
</html>"#;

pub const PANCAKES_RESPONSE: &str = r#"{"type": "RecipeResponse", "response": {"name": "Pancakes", "prep_time": "10 minutes", "cook_time": "15 minutes", "recipe_yield": "4 servings", "ingredients": [{"quantity": "2 cups", "name": "flour", "id": "$I1", "section": "", "annotations": ""}, {"quantity": "2", "name": "large eggs", "id": "$I2", "section": "", "annotations": ""}, {"quantity": "1 1/2 cups", "name": "milk", "id": "$I3", "section": "", "annotations": ""}], "instructions": [{"id": "$S1", "text": "Whisk everything together.", "annotations": ""}, {"id": "$S2", "text": "Cook on a hot griddle.", "annotations": ""}], "additional_info": ""}}"#;

pub struct TestApp {
    pub router: Router,
    pub db: Connection,
    pub store: TranscriptStore,
    // Removes the directory on drop
    _dir: TempDir,
}

impl TestApp {
    /// Polls the store until the session has at least `turns` turns.
    /// Sessions are saved after the response body closes so a test
    /// that just read the body might get there first.
    pub async fn wait_for_session(&self, id: &str, turns: usize) -> RecipeBot {
        for _ in 0..100 {
            if let Some(bot) = self.store.load::<RecipeBot>(id).await.unwrap()
                && bot.session.transcript().len() >= turns
            {
                return bot;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("Session {} was not saved with {} turns", id, turns);
    }

    pub async fn session_count(&self) -> i64 {
        self.db
            .call(|conn| {
                let count = conn.query_row("SELECT COUNT(*) FROM session_record", [], |row| {
                    row.get(0)
                })?;
                Ok(count)
            })
            .await
            .unwrap()
    }
}

/// Creates a test application router backed by a temporary db. Model
/// requests go to `llm_host`, usually a `mockito` server.
pub async fn test_app(llm_host: &str) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("db");
    let db_path = db_path.to_str().unwrap().to_string();

    let db = async_db(&db_path)
        .await
        .expect("Failed to connect to async db");
    let store = TranscriptStore::new(&db);
    store.initialize().await.expect("Failed to initialize db");

    let app_config = AppConfig {
        db_path,
        static_path: dir.path().join("static").display().to_string(),
        openai_model: String::from("gpt-4o-mini"),
        openai_api_hostname: llm_host.to_string(),
        openai_api_key: String::from("test-api-key"),
        request_timeout_secs: 5,
    };
    let app_state = AppState::new(db.clone(), app_config);

    TestApp {
        router: app(Arc::new(RwLock::new(app_state))),
        db,
        store,
        _dir: dir,
    }
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not utf-8")
}

/// An event stream body for a chat completion that streams `text` in
/// pieces of `size` characters.
pub fn completion_sse(text: &str, size: usize) -> String {
    let mut body = String::new();
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();

    let first = json!({"choices": [{"delta": {"role": "assistant", "content": ""}, "finish_reason": null}]});
    body.push_str(&format!("data: {}\n\n", first));
    for chunk in chunks {
        let event = json!({"choices": [{"delta": {"content": chunk}, "finish_reason": null}]});
        body.push_str(&format!("data: {}\n\n", event));
    }
    let last = json!({"choices": [{"delta": {}, "finish_reason": "stop"}]});
    body.push_str(&format!("data: {}\n\n", last));
    body.push_str("data: [DONE]\n\n");
    body
}

/// An event stream that starts streaming `text` and then fails.
pub fn failing_sse(text: &str) -> String {
    let event = json!({"choices": [{"delta": {"content": text}, "finish_reason": null}]});
    let error = json!({"error": {"message": "The server is overloaded", "type": "server_error"}});
    format!("data: {}\n\ndata: {}\n\n", event, error)
}

/// Serves one event stream response that sends `text` and then stalls
/// until the client hangs up. The returned receiver fires once the
/// connection is closed.
pub async fn stalled_sse_server(text: &str) -> (String, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let event = json!({"choices": [{"delta": {"content": text}, "finish_reason": null}]});
    let first = format!("data: {}\n\n", event);
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await.unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n")
            .await
            .unwrap();
        socket
            .write_all(format!("{:x}\r\n{}\r\n", first.len(), first).as_bytes())
            .await
            .unwrap();
        socket.flush().await.unwrap();

        // Never finishes. Reads return 0 once the client hangs up.
        while socket.read(&mut buf).await.map(|n| n > 0).unwrap_or(false) {}
        let _ = closed_tx.send(());
    });

    (format!("http://{}", addr), closed_rx)
}
