use log::warn;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid env {0}: {1}")]
    InvalidEnv(&'static str, String),
    #[error("cannot read job config {0}: {1}")]
    JobConfig(String, String),
}

/// 推送通道的时间参数
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: String,
    /// 连续重连次数上限
    pub reopen_attempts: u32,
    pub reopen_interval: Duration,
    pub login_poll_interval: Duration,
    pub request_timeout: Duration,
    /// 为 true 时连接错误也会提示给用户
    pub debug: bool,
}

impl ChannelConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reopen_attempts: 3,
            reopen_interval: Duration::from_millis(3000),
            login_poll_interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(30),
            debug: false,
        }
    }
}

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    /// REST 请求超时
    pub http_timeout: Duration,
    pub channel: ChannelConfig,
    pub auth_token: Option<String>,
    pub password: Option<String>,
    pub state_dir: PathBuf,
    /// 启动任务时作为 `config` 字段发送
    pub job_config: Value,
}

impl AppConfig {
    /// 从环境变量读取（调用方负责先加载 .env）
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("JESSE_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string())
            .trim_end_matches('/')
            .to_string();
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidEnv("JESSE_API_URL", api_url));
        }

        let http_timeout = match non_empty_env("JESSE_HTTP_TIMEOUT_SECS") {
            Some(s) => parse_timeout_secs("JESSE_HTTP_TIMEOUT_SECS", &s)?,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        let ws_url = std::env::var("JESSE_WS_URL").unwrap_or_else(|_| ws_url_from_api(&api_url));

        let mut channel = ChannelConfig::new(ws_url);
        channel.debug = std::env::var("JESSE_DEBUG")
            .map(|s| is_truthy(&s))
            .unwrap_or(false);

        let auth_token = non_empty_env("JESSE_AUTH_TOKEN");
        let password = non_empty_env("JESSE_PASSWORD");
        let state_dir = std::env::var("JESSE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".rustjesse"));

        let job_config = match non_empty_env("JESSE_JOB_CONFIG") {
            Some(path) => load_job_config(Path::new(&path))?,
            None => json!({}),
        };

        Ok(Self {
            api_url,
            http_timeout,
            channel,
            auth_token,
            password,
            state_dir,
            job_config,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 正整数秒
fn parse_timeout_secs(key: &'static str, s: &str) -> Result<Duration, ConfigError> {
    match s.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidEnv(key, s.to_string())),
    }
}

fn is_truthy(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// http://host:port -> ws://host:port/ws
pub fn ws_url_from_api(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}/ws", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}/ws", rest)
    } else {
        format!("ws://{}/ws", base)
    }
}

fn load_job_config(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::JobConfig(path.display().to_string(), e.to_string()))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| ConfigError::JobConfig(path.display().to_string(), e.to_string()))?;
    if !value.is_object() {
        warn!("job config {} 不是 JSON 对象", path.display());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_follows_api_scheme() {
        assert_eq!(ws_url_from_api("http://127.0.0.1:9000"), "ws://127.0.0.1:9000/ws");
        assert_eq!(ws_url_from_api("https://jesse.example/"), "wss://jesse.example/ws");
    }

    #[test]
    fn channel_defaults() {
        let cfg = ChannelConfig::new("ws://x/ws");
        assert_eq!(cfg.reopen_attempts, 3);
        assert_eq!(cfg.reopen_interval, Duration::from_millis(3000));
        assert_eq!(cfg.login_poll_interval, Duration::from_millis(1000));
        assert!(!cfg.debug);
    }

    #[test]
    fn timeout_must_be_positive_seconds() {
        assert_eq!(
            parse_timeout_secs("T", "45").unwrap(),
            Duration::from_secs(45)
        );
        assert!(parse_timeout_secs("T", "0").is_err());
        assert!(parse_timeout_secs("T", "1.5").is_err());
        let err = parse_timeout_secs("JESSE_HTTP_TIMEOUT_SECS", "soon").unwrap_err();
        assert_eq!(err.to_string(), "invalid env JESSE_HTTP_TIMEOUT_SECS: soon");
    }

    #[test]
    fn truthy_values() {
        assert!(is_truthy("yes"));
        assert!(is_truthy(" TRUE "));
        assert!(!is_truthy("no"));
        assert!(!is_truthy(""));
    }
}
