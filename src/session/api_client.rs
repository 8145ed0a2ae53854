use super::auth::AuthState;
use super::types::{ApiError, ApiTransport};
use super::urls::URL_AUTH;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;

/// 后端 REST 客户端
///
/// 所有请求都带上 `Authorization` 头（若已登录）。
/// 非 2xx 响应统一转换为 `ApiError::Status`，不做自动重试。
pub struct ApiClient {
    client: Client,
    base_url: String,
    auth: AuthState,
}

impl ApiClient {
    /// 创建一个新的 ApiClient
    ///
    /// # 参数
    ///
    /// * `base_url` - 后端地址，如 `http://127.0.0.1:9000`
    /// * `auth` - 与推送通道共享的登录状态
    /// * `timeout` - 单个请求的超时
    pub fn new(
        base_url: impl Into<String>,
        auth: AuthState,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("rustjesse/0.1")
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 用密码换取 token，成功后推送通道即可开始连接
    pub async fn login(&self, password: &str) -> Result<(), ApiError> {
        let resp = self
            .send(Method::POST, URL_AUTH, Some(json!({ "password": password })))
            .await?;

        let token = resp
            .get("auth_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ApiError::InvalidResponse("missing auth_token".to_string()))?;

        self.auth.set_token(token);
        info!("{} login(...) [ok]", self);
        Ok(())
    }
}

#[async_trait]
impl ApiTransport for ApiClient {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(token) = self.auth.token() {
            request = request.header("Authorization", token);
        }
        if let Some(ref body) = body {
            request = request.json(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("{} {} {} [{}]", self, method, url, status);
            return Err(ApiError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
            ));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        info!("{} {} {} [{}]", self, method, url, status);

        // 204 或空 body 视为 null
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}, 原始报文: {}", e, text)))
    }
}

impl std::fmt::Display for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ApiClient [{}]>", self.base_url)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ApiClient [{}]>", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = ApiClient::new(
            "http://localhost:9000/",
            AuthState::new(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.url("/backtest"), "http://localhost:9000/backtest");
    }
}
