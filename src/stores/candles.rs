use super::common::{impl_job_results, new_session_id, Alert, Exception, Progress};
use super::tabs::TabSet;
use super::StoreContext;
use crate::session::URL_CANDLES_IMPORT;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const FORM_KEY: &str = "candlesForm";

/// 历史 K 线导入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlesForm {
    pub exchange: String,
    pub symbol: String,
    pub start_date: String,
}

impl Default for CandlesForm {
    fn default() -> Self {
        Self {
            exchange: String::new(),
            symbol: String::new(),
            start_date: "2021-01-01".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandlesResults {
    pub show_results: bool,
    pub executing: bool,
    pub terminated: bool,
    pub progressbar: Progress,
    pub exception: Exception,
    pub alert: Alert,
}

impl_job_results!(CandlesResults);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlesEvent {
    Progressbar,
    Alert,
    Exception,
    Termination,
}

pub struct CandlesStore {
    pub tabs: TabSet<CandlesForm, CandlesResults>,
    ctx: StoreContext,
}

impl CandlesStore {
    pub fn new(ctx: StoreContext) -> Self {
        let form = ctx.defaults.load(FORM_KEY, CandlesForm::default());
        Self {
            tabs: TabSet::new(form, CandlesResults::default()),
            ctx,
        }
    }

    pub fn add_tab(&mut self) -> u32 {
        let form = self.ctx.defaults.load(FORM_KEY, CandlesForm::default());
        self.tabs.insert(form, CandlesResults::default())
    }

    pub async fn start_in_new_tab(&mut self, source_id: u32) -> Option<u32> {
        let id = self.tabs.duplicate(source_id)?;
        self.start(id).await;
        Some(id)
    }

    pub async fn start(&mut self, id: u32) {
        let session_id = new_session_id();
        let Some(tab) = self.tabs.get_mut(id) else {
            warn!("[Candles] 标签页不存在: {}", id);
            return;
        };
        tab.bind_session(session_id.clone());
        info!("[Candles] 开始导入 {} (tab {})", session_id, id);

        tab.results = CandlesResults {
            executing: true,
            ..CandlesResults::default()
        };
        tab.form.symbol = tab.form.symbol.to_uppercase();
        self.ctx.defaults.save(FORM_KEY, &tab.form);

        let body = json!({
            "id": session_id,
            "exchange": tab.form.exchange,
            "symbol": tab.form.symbol,
            "start_date": tab.form.start_date,
        });

        if let Err(e) = self.ctx.api.post(URL_CANDLES_IMPORT, body).await {
            self.ctx.notifier.error(e.to_string());
            self.tabs.stop_session(&session_id);
        }
    }

    pub async fn cancel(&mut self, id: u32) {
        let Some(session_id) = self.tabs.cancel_target(id) else {
            return;
        };

        if let Err(e) = self
            .ctx
            .api
            .delete(URL_CANDLES_IMPORT, json!({ "id": session_id }))
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

    pub fn handle(&mut self, event: CandlesEvent, session_id: &str, data: Value) {
        let Some(tab) = self.tabs.find_by_session(session_id) else {
            debug!("[Candles] 未知会话 {}，忽略 {:?}", session_id, event);
            return;
        };
        let results = &mut tab.results;

        match event {
            CandlesEvent::Progressbar => results.progressbar = Progress::from_value(&data),
            CandlesEvent::Exception => results.exception = Exception::from_value(&data),
            CandlesEvent::Alert => {
                results.alert = Alert::from_value(&data);
                tab.finish();
            }
            CandlesEvent::Termination => {
                if tab.terminate() {
                    self.ctx.notifier.success("Import terminated successfully");
                }
            }
        }
    }
}
