use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::format::timestamp_to_time;

/// 进度快照，后到覆盖先到
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub estimated_remaining_seconds: f64,
}

impl Progress {
    pub fn from_value(data: &Value) -> Self {
        serde_json::from_value(data.clone()).unwrap_or_default()
    }
}

/// 后端报告的任务异常；`error` 非空即视为失败
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub traceback: String,
}

impl Exception {
    pub fn is_set(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn clear(&mut self) {
        self.error.clear();
        self.traceback.clear();
    }

    pub fn from_value(data: &Value) -> Self {
        Self {
            error: str_field(data, "error"),
            traceback: str_field(data, "traceback"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl Alert {
    pub fn from_value(data: &Value) -> Self {
        Self {
            message: str_field(data, "message"),
            kind: str_field(data, "type"),
        }
    }
}

/// 图表上的一个点
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub time: i64,
    pub value: f64,
}

/// 交易路由（交易所 + 交易对 + 周期 + 策略）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub strategy: String,
}

impl Route {
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            strategy: strategy.into(),
        }
    }
}

/// 交易对统一转大写
pub fn uppercase_symbols(routes: &mut [Route]) {
    for route in routes.iter_mut() {
        route.symbol = route.symbol.to_uppercase();
    }
}

/// routes_info 表格中的单元格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub value: String,
    pub style: String,
}

/// 表头一行 + 每条路由一行
pub fn routes_info_table(data: &Value) -> Vec<Vec<TableCell>> {
    let header = ["Exchange", "Symbol", "Timeframe", "Strategy"]
        .iter()
        .map(|h| TableCell {
            value: h.to_string(),
            style: String::new(),
        })
        .collect();

    let mut rows = vec![header];
    if let Some(items) = data.as_array() {
        for item in items {
            rows.push(
                ["exchange", "symbol", "timeframe", "strategy_name"]
                    .iter()
                    .map(|k| TableCell {
                        value: str_field(item, k),
                        style: String::new(),
                    })
                    .collect(),
            );
        }
    }
    rows
}

/// `[YYYY-MM-DD HH:MM:SS] message\n`
pub fn log_line(data: &Value) -> String {
    let ts = data.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
    format!("[{}] {}\n", timestamp_to_time(ts), str_field(data, "message"))
}

pub fn str_field(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// 一次后端任务的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Terminated,
}

/// 标签页当前绑定的会话
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBinding {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionBinding {
    pub fn new(id: String) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// 新的会话 id（UUID v4，小写 8-4-4-4-12）
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 各领域结果共有的部分，用于推导会话状态
pub trait JobResults {
    fn executing(&self) -> bool;
    fn set_executing(&mut self, executing: bool);
    fn show_results(&self) -> bool;
    fn set_show_results(&mut self, show: bool);
    fn terminated(&self) -> bool;
    fn set_terminated(&mut self, terminated: bool);
    fn exception(&self) -> &Exception;

    fn status(&self) -> SessionStatus {
        if self.executing() {
            SessionStatus::Running
        } else if self.exception().is_set() {
            SessionStatus::Failed
        } else if self.terminated() {
            SessionStatus::Terminated
        } else if self.show_results() {
            SessionStatus::Completed
        } else {
            SessionStatus::Idle
        }
    }
}

/// 结果结构体都有 `executing`、`show_results`、`terminated`、`exception` 四个字段
macro_rules! impl_job_results {
    ($ty:ty) => {
        impl $crate::stores::common::JobResults for $ty {
            fn executing(&self) -> bool {
                self.executing
            }
            fn set_executing(&mut self, executing: bool) {
                self.executing = executing;
            }
            fn show_results(&self) -> bool {
                self.show_results
            }
            fn set_show_results(&mut self, show: bool) {
                self.show_results = show;
            }
            fn terminated(&self) -> bool {
                self.terminated
            }
            fn set_terminated(&mut self, terminated: bool) {
                self.terminated = terminated;
            }
            fn exception(&self) -> &$crate::stores::common::Exception {
                &self.exception
            }
        }
    };
}
pub(crate) use impl_job_results;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uppercase_only_touches_symbol() {
        let mut routes = vec![Route::new("Binance", "btc-usdt", "1h", "Example")];
        uppercase_symbols(&mut routes);
        assert_eq!(routes[0].symbol, "BTC-USDT");
        assert_eq!(routes[0].exchange, "Binance");
    }

    #[test]
    fn routes_info_has_header_row() {
        let rows = routes_info_table(&json!([
            {"exchange": "Binance", "symbol": "BTC-USDT", "timeframe": "4h", "strategy_name": "A"}
        ]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].value, "Exchange");
        assert_eq!(rows[1][3].value, "A");
    }

    #[test]
    fn log_line_format() {
        let line = log_line(&json!({"timestamp": 1_609_459_200_000i64, "message": "hello"}));
        assert_eq!(line, "[2021-01-01 00:00:00] hello\n");
    }

    #[test]
    fn exception_and_alert_from_payload() {
        let e = Exception::from_value(&json!({"error": "E", "traceback": "T"}));
        assert!(e.is_set());
        assert_eq!(e.traceback, "T");

        let a = Alert::from_value(&json!({"message": "done", "type": "success"}));
        assert_eq!(a.kind, "success");
    }

    #[test]
    fn progress_tolerates_partial_payload() {
        let p = Progress::from_value(&json!({"current": 50}));
        assert_eq!(p.current, 50.0);
        assert_eq!(p.estimated_remaining_seconds, 0.0);
        assert_eq!(Progress::from_value(&Value::Null), Progress::default());
    }
}
