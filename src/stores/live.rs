use super::common::{
    impl_job_results, log_line, new_session_id, str_field, uppercase_symbols, Exception, Progress,
    Route,
};
use super::tabs::TabSet;
use super::StoreContext;
use crate::session::URL_LIVE;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const FORM_KEY: &str = "liveForm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveForm {
    pub exchange_api_key_id: String,
    pub notification_api_key_id: String,
    pub debug_mode: bool,
    pub paper_mode: bool,
    pub routes: Vec<Route>,
    pub extra_routes: Vec<Route>,
}

impl Default for LiveForm {
    fn default() -> Self {
        Self {
            exchange_api_key_id: String::new(),
            notification_api_key_id: String::new(),
            debug_mode: false,
            paper_mode: true,
            routes: Vec::new(),
            extra_routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveResults {
    pub show_results: bool,
    pub executing: bool,
    pub terminated: bool,
    pub progressbar: Progress,
    pub general_info: Value,
    pub positions: Vec<Value>,
    pub orders: Vec<Value>,
    pub watch_list: Vec<Value>,
    /// 各路由当前未收盘的 K 线
    pub current_candles: Value,
    pub info_logs: String,
    pub error_logs: String,
    pub exception: Exception,
}

impl_job_results!(LiveResults);

/// `papertrade.*` 与 `livetrade.*` 共用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEvent {
    Progressbar,
    Positions,
    Orders,
    GeneralInfo,
    WatchList,
    CurrentCandles,
    InfoLog,
    ErrorLog,
    Exception,
    UnexpectedTermination,
    Termination,
}

pub struct LiveStore {
    pub tabs: TabSet<LiveForm, LiveResults>,
    ctx: StoreContext,
}

impl LiveStore {
    pub fn new(ctx: StoreContext) -> Self {
        let form = ctx.defaults.load(FORM_KEY, LiveForm::default());
        Self {
            tabs: TabSet::new(form, LiveResults::default()),
            ctx,
        }
    }

    pub fn add_tab(&mut self) -> u32 {
        let form = self.ctx.defaults.load(FORM_KEY, LiveForm::default());
        self.tabs.insert(form, LiveResults::default())
    }

    pub async fn start_in_new_tab(&mut self, source_id: u32) -> Option<u32> {
        let id = self.tabs.duplicate(source_id)?;
        self.start(id).await;
        Some(id)
    }

    pub async fn start(&mut self, id: u32) {
        let session_id = new_session_id();
        let Some(tab) = self.tabs.get_mut(id) else {
            warn!("[Live] 标签页不存在: {}", id);
            return;
        };
        tab.bind_session(session_id.clone());
        info!(
            "[Live] 启动{}会话 {} (tab {})",
            if tab.form.paper_mode { "模拟盘" } else { "实盘" },
            session_id,
            id
        );

        tab.results = LiveResults {
            executing: true,
            ..LiveResults::default()
        };

        uppercase_symbols(&mut tab.form.routes);
        uppercase_symbols(&mut tab.form.extra_routes);
        self.ctx.defaults.save(FORM_KEY, &tab.form);

        let form = &tab.form;
        let body = json!({
            "id": session_id,
            "exchange_api_key_id": form.exchange_api_key_id,
            "notification_api_key_id": form.notification_api_key_id,
            "routes": form.routes,
            "data_routes": form.extra_routes,
            "config": self.ctx.job_config,
            "debug_mode": form.debug_mode,
            "paper_mode": form.paper_mode,
        });

        if let Err(e) = self.ctx.api.post(URL_LIVE, body).await {
            self.ctx.notifier.error(e.to_string());
            self.tabs.stop_session(&session_id);
        }
    }

    pub async fn cancel(&mut self, id: u32) {
        let Some(session_id) = self.tabs.cancel_target(id) else {
            return;
        };
        // 后端按 paper_mode 区分模拟盘与实盘引擎
        let paper_mode = self.tabs.get(id).map_or(true, |t| t.form.paper_mode);

        if let Err(e) = self
            .ctx
            .api
            .delete(URL_LIVE, json!({ "id": session_id, "paper_mode": paper_mode }))
            .await
        {
            self.ctx.notifier.error(e.to_string());
        }
    }

    pub async fn rerun(&mut self, id: u32) {
        self.tabs.hide_results(id);
        self.start(id).await;
    }

    pub fn new_run(&mut self, id: u32) {
        self.tabs.hide_results(id);
    }

    pub fn handle(&mut self, event: LiveEvent, session_id: &str, data: Value) {
        let Some(tab) = self.tabs.find_by_session(session_id) else {
            debug!("[Live] 未知会话 {}，忽略 {:?}", session_id, event);
            return;
        };
        let results = &mut tab.results;
        let list = |v: Value| match v {
            Value::Array(items) => items,
            _ => Vec::new(),
        };

        match event {
            LiveEvent::Progressbar => results.progressbar = Progress::from_value(&data),
            LiveEvent::Positions => results.positions = list(data),
            LiveEvent::Orders => results.orders = list(data),
            LiveEvent::WatchList => results.watch_list = list(data),
            LiveEvent::CurrentCandles => results.current_candles = data,
            LiveEvent::GeneralInfo => {
                // 收到第一条 general_info 即认为交易已开始
                results.executing = true;
                results.show_results = true;
                results.general_info = data;
            }
            LiveEvent::InfoLog => results.info_logs.push_str(&log_line(&data)),
            LiveEvent::ErrorLog => results.error_logs.push_str(&log_line(&data)),
            LiveEvent::Exception => results.exception = Exception::from_value(&data),
            LiveEvent::UnexpectedTermination => {
                if tab.terminate() {
                    let reason = str_field(&data, "message");
                    if reason.is_empty() {
                        self.ctx.notifier.error("Session terminated unexpectedly");
                    } else {
                        self.ctx
                            .notifier
                            .error(format!("Session terminated unexpectedly: {}", reason));
                    }
                }
            }
            LiveEvent::Termination => {
                if tab.terminate() {
                    self.ctx.notifier.success("Session terminated successfully");
                }
            }
        }
    }
}
