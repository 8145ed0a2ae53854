pub mod backtest;
pub mod candles;
pub mod common;
pub mod exchange_keys;
pub mod form_defaults;
pub mod format;
pub mod live;
pub mod monte_carlo;
pub mod notification_keys;
pub mod optimization;
pub mod sessions;
pub mod strategy;
pub mod tabs;

pub use backtest::{BacktestEvent, BacktestStore};
pub use candles::{CandlesEvent, CandlesStore};
pub use common::{Route, SessionStatus};
pub use exchange_keys::ExchangeKeysStore;
pub use form_defaults::FormDefaults;
pub use live::{LiveEvent, LiveStore};
pub use monte_carlo::{MonteCarloEvent, MonteCarloStore};
pub use notification_keys::NotificationKeysStore;
pub use optimization::{OptimizationEvent, OptimizationStore};
pub use sessions::SessionsStore;
pub use strategy::StrategyStore;
pub use tabs::{Tab, TabSet};

use crate::notifier::Notifier;
use crate::session::ApiTransport;
use serde_json::Value;
use std::sync::Arc;

/// (标签, 格式化后的值)
pub type MetricRow = (String, String);

/// 所有 store 共用的依赖
#[derive(Clone)]
pub struct StoreContext {
    pub api: Arc<dyn ApiTransport>,
    pub notifier: Notifier,
    pub defaults: FormDefaults,
    /// 启动任务时原样放进请求体的 `config`
    pub job_config: Value,
}

impl StoreContext {
    pub fn new(api: Arc<dyn ApiTransport>, notifier: Notifier) -> Self {
        Self {
            api,
            notifier,
            defaults: FormDefaults::disabled(),
            job_config: Value::Object(Default::default()),
        }
    }

    pub fn with_defaults(mut self, defaults: FormDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_job_config(mut self, job_config: Value) -> Self {
        self.job_config = job_config;
        self
    }
}

pub(crate) fn metric(label: &str, value: impl Into<String>) -> MetricRow {
    (label.to_string(), value.into())
}
