use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 服务端返回非 2xx
    #[error("[{status}]: {status_text}")]
    Status { status: u16, status_text: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn status(status: u16, status_text: impl Into<String>) -> Self {
        Self::Status {
            status,
            status_text: status_text.into(),
        }
    }
}

/// REST 调用的抽象，store 只依赖这个 trait
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, method: Method, path: &str, body: Option<Value>)
        -> Result<Value, ApiError>;

    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn post_empty(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::POST, path, None).await
    }

    async fn delete(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(Method::DELETE, path, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_renders_status_and_text() {
        let err = ApiError::status(500, "Internal Server Error");
        assert_eq!(err.to_string(), "[500]: Internal Server Error");
    }

    #[test]
    fn network_error_keeps_cause() {
        let err = ApiError::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "network error: connection refused");
    }
}
