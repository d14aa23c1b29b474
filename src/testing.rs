//! In-memory transport used by unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, ErrorCategory, LspResult};
use crate::lsp::transport::LspTransport;

#[derive(Debug, Clone)]
pub enum Scripted {
    Json(Value),
    Fail(ErrorCategory),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// Replies from per-path scripts. The last scripted reply for a path keeps
/// repeating; unscripted paths fail like an HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

#[allow(clippy::unwrap_used)]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn respond(&self, path: &str, reply: Scripted) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn respond_json(&self, path: &str, value: Value) -> &Self {
        self.respond(path, Scripted::Json(value))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn reply(&self, method: &'static str, path: &str, body: Option<Value>) -> LspResult<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            body,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(path).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        match next {
            Some(Scripted::Json(value)) => Ok(value),
            Some(Scripted::Fail(category)) => {
                Err(AppError::with_category(category, "scripted failure"))
            }
            None => Err(AppError::transport_error(format!("HTTP 404: no script for {}", path))),
        }
    }
}

#[async_trait]
impl LspTransport for ScriptedTransport {
    async fn get_json(&self, path: &str) -> LspResult<Value> {
        self.reply("GET", path, None).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> LspResult<Value> {
        self.reply("POST", path, Some(body.clone())).await
    }
}
