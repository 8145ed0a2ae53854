#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::Method;
use rustjesse::session::{ApiError, ApiTransport};
use rustjesse::stores::StoreContext;
use rustjesse::{AppEvent, Notifier};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// 记录所有请求；按 (method, path) 返回预设响应，默认 `{}`
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    responses: Mutex<HashMap<(Method, String), Result<Value, ApiError>>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: Method, path: &str, resp: Result<Value, ApiError>) {
        self.responses
            .lock()
            .unwrap()
            .insert((method, path.to_string()), resp);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }
}

#[async_trait]
impl ApiTransport for RecordingTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(Call {
            method: method.clone(),
            path: path.to_string(),
            body,
        });
        self.responses
            .lock()
            .unwrap()
            .get(&(method, path.to_string()))
            .cloned()
            .unwrap_or_else(|| Ok(serde_json::json!({})))
    }
}

pub struct Harness {
    pub api: Arc<RecordingTransport>,
    pub ctx: StoreContext,
    pub events: mpsc::UnboundedReceiver<AppEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let api = RecordingTransport::new();
        let (notifier, events) = Notifier::channel();
        let ctx = StoreContext::new(api.clone(), notifier);
        Self { api, ctx, events }
    }

    /// 取出目前为止的全部提示
    pub fn drain(&mut self) -> Vec<AppEvent> {
        let mut out = Vec::new();
        while let Ok(evt) = self.events.try_recv() {
            out.push(evt);
        }
        out
    }
}
