use super::format::timestamp_to_date;
use super::StoreContext;
use crate::notifier::Notifier;
use crate::session::{
    url_backtest_logs, url_backtest_session, url_backtest_session_chart_data,
    url_backtest_session_notes, url_backtest_session_remove, url_backtest_session_strategy_code,
    url_monte_carlo_session, url_monte_carlo_session_equity_curves,
    url_monte_carlo_session_remove, url_optimization_session, url_optimization_session_notes,
    url_optimization_session_remove, ApiError, ApiTransport, URL_BACKTEST_PURGE_SESSIONS,
    URL_BACKTEST_SESSIONS, URL_LIVE_LOGS, URL_LIVE_ORDERS, URL_LIVE_SESSIONS,
    URL_MONTE_CARLO_PURGE_SESSIONS, URL_MONTE_CARLO_SESSIONS, URL_OPTIMIZATION_PURGE_SESSIONS,
    URL_OPTIMIZATION_RERUN, URL_OPTIMIZATION_RESUME, URL_OPTIMIZATION_SESSIONS,
    URL_OPTIMIZATION_TERMINATE,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 历史记录分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Backtest,
    Optimization,
    MonteCarlo,
    Live,
}

impl HistoryKind {
    fn list_url(self) -> &'static str {
        match self {
            HistoryKind::Backtest => URL_BACKTEST_SESSIONS,
            HistoryKind::Optimization => URL_OPTIMIZATION_SESSIONS,
            HistoryKind::MonteCarlo => URL_MONTE_CARLO_SESSIONS,
            HistoryKind::Live => URL_LIVE_SESSIONS,
        }
    }

    fn purge_url(self) -> Option<&'static str> {
        match self {
            HistoryKind::Backtest => Some(URL_BACKTEST_PURGE_SESSIONS),
            HistoryKind::Optimization => Some(URL_OPTIMIZATION_PURGE_SESSIONS),
            HistoryKind::MonteCarlo => Some(URL_MONTE_CARLO_PURGE_SESSIONS),
            HistoryKind::Live => None,
        }
    }

    fn session_url(self, id: &str) -> Option<String> {
        match self {
            HistoryKind::Backtest => Some(url_backtest_session(id)),
            HistoryKind::Optimization => Some(url_optimization_session(id)),
            HistoryKind::MonteCarlo => Some(url_monte_carlo_session(id)),
            HistoryKind::Live => None,
        }
    }

    fn remove_url(self, id: &str) -> Option<String> {
        match self {
            HistoryKind::Backtest => Some(url_backtest_session_remove(id)),
            HistoryKind::Optimization => Some(url_optimization_session_remove(id)),
            HistoryKind::MonteCarlo => Some(url_monte_carlo_session_remove(id)),
            HistoryKind::Live => None,
        }
    }

    fn notes_url(self, id: &str) -> Option<String> {
        match self {
            HistoryKind::Backtest => Some(url_backtest_session_notes(id)),
            HistoryKind::Optimization => Some(url_optimization_session_notes(id)),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HistoryKind::Backtest => "backtest",
            HistoryKind::Optimization => "optimization",
            HistoryKind::MonteCarlo => "Monte Carlo",
            HistoryKind::Live => "live",
        };
        write!(f, "{}", name)
    }
}

/// 历史列表中的一条记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSummary {
    pub id: String,
    pub status: Option<String>,
    pub strategy_name: Option<String>,
    pub symbol: Option<String>,
    pub exchange: Option<String>,
    pub completed: bool,
    /// 毫秒时间戳
    pub created_at: Option<i64>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SessionSummary {
    fn created_date(&self) -> Option<String> {
        self.created_at.map(timestamp_to_date)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Failed,
}

impl StatusFilter {
    fn matches(self, session: &SessionSummary) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Completed => session.completed,
            StatusFilter::Failed => !session.completed,
        }
    }
}

/// 只在本地生效的过滤条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub search: String,
    /// `YYYY-MM-DD`，含当天
    pub date_from: String,
    pub date_to: String,
    pub status: StatusFilter,
}

impl Filters {
    fn matches_search(&self, fields: &[Option<&String>]) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        fields
            .iter()
            .flatten()
            .any(|f| f.to_lowercase().contains(&needle))
    }

    fn matches_dates(&self, session: &SessionSummary) -> bool {
        if self.date_from.is_empty() && self.date_to.is_empty() {
            return true;
        }
        // 没有创建时间的记录无法判断，直接排除
        let Some(date) = session.created_date() else {
            return false;
        };
        (self.date_from.is_empty() || date.as_str() >= self.date_from.as_str())
            && (self.date_to.is_empty() || date.as_str() <= self.date_to.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            total: 0,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> u32 {
        // 页码来自用户输入，超大页码钉在 u32::MAX
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// 会话历史
pub struct SessionsStore {
    api: Arc<dyn ApiTransport>,
    notifier: Notifier,

    pub backtest_sessions: Vec<SessionSummary>,
    pub optimization_sessions: Vec<SessionSummary>,
    pub monte_carlo_sessions: Vec<SessionSummary>,
    pub live_sessions: Vec<SessionSummary>,

    pub loading: bool,
    pub filters: Filters,
    pub pagination: Pagination,

    pub selected_session: Option<Value>,
    pub session_chart_data: Option<Value>,
    pub session_strategy_code: Option<String>,
    pub session_logs: String,
}

impl SessionsStore {
    pub fn new(ctx: &StoreContext) -> Self {
        Self {
            api: ctx.api.clone(),
            notifier: ctx.notifier.clone(),
            backtest_sessions: Vec::new(),
            optimization_sessions: Vec::new(),
            monte_carlo_sessions: Vec::new(),
            live_sessions: Vec::new(),
            loading: false,
            filters: Filters::default(),
            pagination: Pagination::default(),
            selected_session: None,
            session_chart_data: None,
            session_strategy_code: None,
            session_logs: String::new(),
        }
    }

    pub fn sessions(&self, kind: HistoryKind) -> &[SessionSummary] {
        match kind {
            HistoryKind::Backtest => &self.backtest_sessions,
            HistoryKind::Optimization => &self.optimization_sessions,
            HistoryKind::MonteCarlo => &self.monte_carlo_sessions,
            HistoryKind::Live => &self.live_sessions,
        }
    }

    fn sessions_mut(&mut self, kind: HistoryKind) -> &mut Vec<SessionSummary> {
        match kind {
            HistoryKind::Backtest => &mut self.backtest_sessions,
            HistoryKind::Optimization => &mut self.optimization_sessions,
            HistoryKind::MonteCarlo => &mut self.monte_carlo_sessions,
            HistoryKind::Live => &mut self.live_sessions,
        }
    }

    // ---- 派生视图 ----

    pub fn filtered_backtest_sessions(&self) -> Vec<&SessionSummary> {
        let f = &self.filters;
        self.backtest_sessions
            .iter()
            .filter(|s| {
                f.matches_search(&[
                    s.strategy_name.as_ref(),
                    s.symbol.as_ref(),
                    s.exchange.as_ref(),
                ])
            })
            .filter(|s| f.status.matches(s))
            .filter(|s| f.matches_dates(s))
            .collect()
    }

    pub fn filtered_optimization_sessions(&self) -> Vec<&SessionSummary> {
        let f = &self.filters;
        self.optimization_sessions
            .iter()
            .filter(|s| f.matches_search(&[s.strategy_name.as_ref(), s.symbol.as_ref()]))
            .filter(|s| f.status.matches(s))
            .filter(|s| f.matches_dates(s))
            .collect()
    }

    pub fn filtered_monte_carlo_sessions(&self) -> Vec<&SessionSummary> {
        let f = &self.filters;
        self.monte_carlo_sessions
            .iter()
            .filter(|s| f.matches_search(&[s.strategy_name.as_ref()]))
            .collect()
    }

    /// 统一流程：loading -> 请求 -> 失败时提示 -> 复位 loading
    async fn guarded<F>(&mut self, action: &str, call: F) -> Option<Value>
    where
        F: Future<Output = Result<Value, ApiError>>,
    {
        self.loading = true;
        let result = call.await;
        self.loading = false;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("[Sessions] {} 失败: {}", action, e);
                self.notifier.error(format!("Failed to {}: {}", action, e));
                None
            }
        }
    }

    // ---- 通用操作 ----

    pub async fn fetch_sessions(&mut self, kind: HistoryKind) {
        let api = self.api.clone();
        let body = json!({
            "limit": self.pagination.per_page,
            "offset": self.pagination.offset(),
        });
        let action = format!("fetch {} sessions", kind);
        let Some(resp) = self.guarded(&action, api.post(kind.list_url(), body)).await else {
            return;
        };

        let sessions = parse_sessions(&resp);
        self.pagination.total = resp
            .get("total")
            .and_then(Value::as_u64)
            .map(|t| t as u32)
            .unwrap_or(sessions.len() as u32);
        info!("[Sessions] 获取 {} 条 {} 记录", sessions.len(), kind);
        *self.sessions_mut(kind) = sessions;
    }

    pub async fn fetch_session(&mut self, kind: HistoryKind, id: &str) -> Option<Value> {
        let Some(url) = kind.session_url(id) else {
            warn!("[Sessions] {} 不支持查看单条记录", kind);
            return None;
        };
        let api = self.api.clone();
        let resp = self.guarded("fetch session", api.post_empty(&url)).await?;
        self.selected_session = Some(resp.clone());
        Some(resp)
    }

    pub async fn remove_session(&mut self, kind: HistoryKind, id: &str) {
        let Some(url) = kind.remove_url(id) else {
            warn!("[Sessions] {} 不支持删除", kind);
            return;
        };
        let api = self.api.clone();
        if self
            .guarded("remove session", api.post_empty(&url))
            .await
            .is_some()
        {
            self.sessions_mut(kind).retain(|s| s.id != id);
            self.notifier.success("Session removed successfully");
        }
    }

    pub async fn purge_sessions(&mut self, kind: HistoryKind) {
        let Some(url) = kind.purge_url() else {
            warn!("[Sessions] {} 不支持清空", kind);
            return;
        };
        let api = self.api.clone();
        if self
            .guarded("purge sessions", api.post_empty(url))
            .await
            .is_some()
        {
            self.sessions_mut(kind).clear();
            self.notifier.success("All sessions purged");
        }
    }

    /// 先改本地，失败时恢复
    pub async fn update_notes(&mut self, kind: HistoryKind, id: &str, notes: &str) {
        let Some(url) = kind.notes_url(id) else {
            warn!("[Sessions] {} 不支持备注", kind);
            return;
        };

        let previous = self
            .sessions_mut(kind)
            .iter_mut()
            .find(|s| s.id == id)
            .map(|s| std::mem::replace(&mut s.notes, Some(notes.to_string())));

        let api = self.api.clone();
        let ok = self
            .guarded("update notes", api.post(&url, json!({ "notes": notes })))
            .await
            .is_some();

        if ok {
            self.notifier.success("Notes updated");
        } else if let Some(old) = previous {
            if let Some(s) = self.sessions_mut(kind).iter_mut().find(|s| s.id == id) {
                s.notes = old;
            }
        }
    }

    // ---- 回测 ----

    pub async fn fetch_backtest_sessions(&mut self) {
        self.fetch_sessions(HistoryKind::Backtest).await
    }

    pub async fn fetch_backtest_session(&mut self, id: &str) -> Option<Value> {
        self.fetch_session(HistoryKind::Backtest, id).await
    }

    pub async fn remove_backtest_session(&mut self, id: &str) {
        self.remove_session(HistoryKind::Backtest, id).await
    }

    pub async fn update_backtest_session_notes(&mut self, id: &str, notes: &str) {
        self.update_notes(HistoryKind::Backtest, id, notes).await
    }

    pub async fn fetch_backtest_chart_data(&mut self, id: &str) -> Option<Value> {
        let api = self.api.clone();
        let url = url_backtest_session_chart_data(id);
        let resp = self.guarded("fetch chart data", api.post_empty(&url)).await?;
        self.session_chart_data = Some(resp.clone());
        Some(resp)
    }

    pub async fn fetch_backtest_strategy_code(&mut self, id: &str) -> Option<String> {
        let api = self.api.clone();
        let url = url_backtest_session_strategy_code(id);
        let resp = self
            .guarded("fetch strategy code", api.post_empty(&url))
            .await?;
        let code = resp.get("code").and_then(Value::as_str).map(str::to_string);
        self.session_strategy_code = code.clone();
        code
    }

    pub async fn fetch_backtest_logs(&mut self, id: &str) -> String {
        let api = self.api.clone();
        let url = url_backtest_logs(id);
        let Some(resp) = self.guarded("fetch logs", api.get(&url)).await else {
            return String::new();
        };
        self.session_logs = logs_of(&resp);
        self.session_logs.clone()
    }

    pub async fn purge_backtest_sessions(&mut self) {
        self.purge_sessions(HistoryKind::Backtest).await
    }

    // ---- 优化 ----

    pub async fn fetch_optimization_sessions(&mut self) {
        self.fetch_sessions(HistoryKind::Optimization).await
    }

    pub async fn fetch_optimization_session(&mut self, id: &str) -> Option<Value> {
        self.fetch_session(HistoryKind::Optimization, id).await
    }

    pub async fn remove_optimization_session(&mut self, id: &str) {
        self.remove_session(HistoryKind::Optimization, id).await
    }

    pub async fn update_optimization_session_notes(&mut self, id: &str, notes: &str) {
        self.update_notes(HistoryKind::Optimization, id, notes).await
    }

    pub async fn resume_optimization(&mut self, session_id: &str) -> Option<Value> {
        let api = self.api.clone();
        let resp = self
            .guarded(
                "resume optimization",
                api.post(URL_OPTIMIZATION_RESUME, json!({ "session_id": session_id })),
            )
            .await?;
        self.notifier.success("Optimization resumed");
        Some(resp)
    }

    pub async fn rerun_optimization(&mut self, session_id: &str) -> Option<Value> {
        let api = self.api.clone();
        let resp = self
            .guarded(
                "rerun optimization",
                api.post(URL_OPTIMIZATION_RERUN, json!({ "session_id": session_id })),
            )
            .await?;
        self.notifier.success("Optimization restarted");
        Some(resp)
    }

    /// 终止当前正在运行的优化任务（后端同时只跑一个）
    pub async fn terminate_optimization(&mut self) {
        let api = self.api.clone();
        if self
            .guarded(
                "terminate optimization",
                api.post_empty(URL_OPTIMIZATION_TERMINATE),
            )
            .await
            .is_some()
        {
            self.notifier.success("Optimization terminated");
        }
    }

    pub async fn purge_optimization_sessions(&mut self) {
        self.purge_sessions(HistoryKind::Optimization).await
    }

    // ---- Monte Carlo ----

    pub async fn fetch_monte_carlo_sessions(&mut self) {
        self.fetch_sessions(HistoryKind::MonteCarlo).await
    }

    pub async fn fetch_monte_carlo_session(&mut self, id: &str) -> Option<Value> {
        self.fetch_session(HistoryKind::MonteCarlo, id).await
    }

    pub async fn remove_monte_carlo_session(&mut self, id: &str) {
        self.remove_session(HistoryKind::MonteCarlo, id).await
    }

    pub async fn fetch_monte_carlo_equity_curves(&mut self, id: &str) -> Option<Value> {
        let api = self.api.clone();
        let url = url_monte_carlo_session_equity_curves(id);
        self.guarded("fetch equity curves", api.post_empty(&url))
            .await
    }

    pub async fn purge_monte_carlo_sessions(&mut self) {
        self.purge_sessions(HistoryKind::MonteCarlo).await
    }

    // ---- 实盘 ----

    pub async fn fetch_live_sessions(&mut self) {
        self.fetch_sessions(HistoryKind::Live).await
    }

    pub async fn fetch_live_logs(&mut self, session_id: &str) -> String {
        let api = self.api.clone();
        self.guarded(
            "fetch logs",
            api.post(URL_LIVE_LOGS, json!({ "session_id": session_id })),
        )
        .await
        .map(|resp| logs_of(&resp))
        .unwrap_or_default()
    }

    pub async fn fetch_live_orders(&mut self, session_id: &str) -> Vec<Value> {
        let api = self.api.clone();
        self.guarded(
            "fetch orders",
            api.post(URL_LIVE_ORDERS, json!({ "session_id": session_id })),
        )
        .await
        .and_then(|resp| resp.get("orders").and_then(Value::as_array).cloned())
        .unwrap_or_default()
    }

    // ---- 工具 ----

    pub fn clear_filters(&mut self) {
        self.filters = Filters::default();
    }

    pub fn clear_selected_session(&mut self) {
        self.selected_session = None;
        self.session_chart_data = None;
        self.session_strategy_code = None;
        self.session_logs.clear();
    }

    pub fn set_page(&mut self, page: u32) {
        self.pagination.page = page.max(1);
    }
}

/// 逐条解析，格式不对的记录跳过
fn parse_sessions(resp: &Value) -> Vec<SessionSummary> {
    let Some(items) = resp.get("sessions").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("[Sessions] 跳过无法解析的记录: {}", e);
                None
            }
        })
        .collect()
}

fn logs_of(resp: &Value) -> String {
    resp.get("logs")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
