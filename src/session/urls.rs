/// 认证
pub const URL_AUTH: &str = "/auth";

/// 回测相关路径
pub const URL_BACKTEST: &str = "/backtest";
pub const URL_BACKTEST_SESSIONS: &str = "/backtest/sessions";
pub const URL_BACKTEST_PURGE_SESSIONS: &str = "/backtest/purge-sessions";
pub fn url_backtest_session(id: &str) -> String {
    format!("{}/{}", URL_BACKTEST_SESSIONS, id)
}
pub fn url_backtest_session_remove(id: &str) -> String {
    format!("{}/{}/remove", URL_BACKTEST_SESSIONS, id)
}
pub fn url_backtest_session_notes(id: &str) -> String {
    format!("{}/{}/notes", URL_BACKTEST_SESSIONS, id)
}
pub fn url_backtest_session_chart_data(id: &str) -> String {
    format!("{}/{}/chart-data", URL_BACKTEST_SESSIONS, id)
}
pub fn url_backtest_session_strategy_code(id: &str) -> String {
    format!("{}/{}/strategy-code", URL_BACKTEST_SESSIONS, id)
}
pub fn url_backtest_logs(id: &str) -> String {
    format!("/backtest/logs/{}", id)
}

/// Monte Carlo 相关路径
pub const URL_MONTE_CARLO: &str = "/monte-carlo";
pub const URL_MONTE_CARLO_CANCEL: &str = "/monte-carlo/cancel";
pub const URL_MONTE_CARLO_TERMINATE: &str = "/monte-carlo/terminate";
pub const URL_MONTE_CARLO_SESSIONS: &str = "/monte-carlo/sessions";
pub const URL_MONTE_CARLO_PURGE_SESSIONS: &str = "/monte-carlo/purge-sessions";
pub fn url_monte_carlo_session(id: &str) -> String {
    format!("{}/{}", URL_MONTE_CARLO_SESSIONS, id)
}
pub fn url_monte_carlo_session_remove(id: &str) -> String {
    format!("{}/{}/remove", URL_MONTE_CARLO_SESSIONS, id)
}
pub fn url_monte_carlo_session_equity_curves(id: &str) -> String {
    format!("{}/{}/equity-curves", URL_MONTE_CARLO_SESSIONS, id)
}

/// 优化相关路径
pub const URL_OPTIMIZATION: &str = "/optimization";
pub const URL_OPTIMIZATION_RESUME: &str = "/optimization/resume";
pub const URL_OPTIMIZATION_RERUN: &str = "/optimization/rerun";
pub const URL_OPTIMIZATION_TERMINATE: &str = "/optimization/terminate";
pub const URL_OPTIMIZATION_SESSIONS: &str = "/optimization/sessions";
pub const URL_OPTIMIZATION_PURGE_SESSIONS: &str = "/optimization/purge-sessions";
pub fn url_optimization_session(id: &str) -> String {
    format!("{}/{}", URL_OPTIMIZATION_SESSIONS, id)
}
pub fn url_optimization_session_remove(id: &str) -> String {
    format!("{}/{}/remove", URL_OPTIMIZATION_SESSIONS, id)
}
pub fn url_optimization_session_notes(id: &str) -> String {
    format!("{}/{}/notes", URL_OPTIMIZATION_SESSIONS, id)
}

/// 实盘 / 模拟盘
pub const URL_LIVE: &str = "/live";
pub const URL_LIVE_SESSIONS: &str = "/live/sessions";
pub const URL_LIVE_LOGS: &str = "/live/logs";
pub const URL_LIVE_ORDERS: &str = "/live/orders";

/// K 线导入
pub const URL_CANDLES_IMPORT: &str = "/candles/import";

/// 交易所密钥
pub const URL_EXCHANGE_API_KEYS: &str = "/exchange/api-keys";
pub const URL_EXCHANGE_API_KEYS_STORE: &str = "/exchange/api-keys/store";
pub const URL_EXCHANGE_API_KEYS_DELETE: &str = "/exchange/api-keys/delete";
pub const URL_EXCHANGE_SUPPORTED_SYMBOLS: &str = "/exchange/supported-symbols";

/// 通知密钥
pub const URL_NOTIFICATION_API_KEYS: &str = "/notification/api-keys";
pub const URL_NOTIFICATION_API_KEYS_STORE: &str = "/notification/api-keys/store";
pub const URL_NOTIFICATION_API_KEYS_DELETE: &str = "/notification/api-keys/delete";

/// 策略
pub const URL_STRATEGY_ALL: &str = "/strategy/all";
pub const URL_STRATEGY_GET: &str = "/strategy/get";
pub const URL_STRATEGY_SAVE: &str = "/strategy/save";
pub const URL_STRATEGY_DELETE: &str = "/strategy/delete";
pub const URL_STRATEGY_PERIODS: &str = "/strategy/periods";
pub const URL_STRATEGY_INDEX: &str = "/strategy/index";
pub const URL_STRATEGY_IMPORT: &str = "/strategy/import";
pub fn url_strategy_jesse_trade(slug: &str) -> String {
    format!("/strategy/jesse-trade/{}", slug)
}
pub fn url_strategy_jesse_trade_metrics(slug: &str) -> String {
    format!("/strategy/jesse-trade/{}/metrics", slug)
}
