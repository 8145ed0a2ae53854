use super::common::{
    impl_job_results, new_session_id, uppercase_symbols, Alert, Exception, Progress, Route,
};
use super::format::display_value;
use super::tabs::TabSet;
use super::{metric, MetricRow, StoreContext};
use crate::session::URL_OPTIMIZATION;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const FORM_KEY: &str = "optimizationForm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationForm {
    pub start_date: String,
    pub finish_date: String,
    pub optimal_total: u32,
    pub trials: u32,
    pub cpu_cores: u32,
    pub fast_mode: bool,
    pub objective_function: String,
    pub routes: Vec<Route>,
    pub extra_routes: Vec<Route>,
}

impl Default for OptimizationForm {
    fn default() -> Self {
        Self {
            start_date: "2021-01-01".to_string(),
            finish_date: "2021-06-01".to_string(),
            optimal_total: 200,
            trials: 200,
            cpu_cores: 1,
            fast_mode: false,
            objective_function: "sharpe".to_string(),
            routes: Vec::new(),
            extra_routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationResults {
    pub show_results: bool,
    pub executing: bool,
    pub terminated: bool,
    pub progressbar: Progress,
    pub general_info: Value,
    pub metrics: Vec<MetricRow>,
    pub best_candidates: Vec<Value>,
    pub exception: Exception,
    pub alert: Alert,
}

impl_job_results!(OptimizationResults);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationEvent {
    Progressbar,
    GeneralInfo,
    Metrics,
    Exception,
    Termination,
    Alert,
    BestCandidates,
}

pub struct OptimizationStore {
    pub tabs: TabSet<OptimizationForm, OptimizationResults>,
    ctx: StoreContext,
}

impl OptimizationStore {
    pub fn new(ctx: StoreContext) -> Self {
        let form = ctx.defaults.load(FORM_KEY, OptimizationForm::default());
        Self {
            tabs: TabSet::new(form, OptimizationResults::default()),
            ctx,
        }
    }

    pub fn add_tab(&mut self) -> u32 {
        let form = self.ctx.defaults.load(FORM_KEY, OptimizationForm::default());
        self.tabs.insert(form, OptimizationResults::default())
    }

    pub async fn start_in_new_tab(&mut self, source_id: u32) -> Option<u32> {
        let id = self.tabs.duplicate(source_id)?;
        self.start(id).await;
        Some(id)
    }

    pub async fn start(&mut self, id: u32) {
        let session_id = new_session_id();
        let Some(tab) = self.tabs.get_mut(id) else {
            warn!("[Optimization] 标签页不存在: {}", id);
            return;
        };
        tab.bind_session(session_id.clone());
        info!("[Optimization] 启动优化 {} (tab {})", session_id, id);

        tab.results = OptimizationResults {
            executing: true,
            ..OptimizationResults::default()
        };

        uppercase_symbols(&mut tab.form.routes);
        uppercase_symbols(&mut tab.form.extra_routes);
        self.ctx.defaults.save(FORM_KEY, &tab.form);

        let form = &tab.form;
        let body = json!({
            "id": session_id,
            "routes": form.routes,
            "data_routes": form.extra_routes,
            "config": self.ctx.job_config,
            "start_date": form.start_date,
            "finish_date": form.finish_date,
            "optimal_total": form.optimal_total,
            "trials": form.trials,
            "cpu_cores": form.cpu_cores,
            "fast_mode": form.fast_mode,
            "objective_function": form.objective_function,
        });

        if let Err(e) = self.ctx.api.post(URL_OPTIMIZATION, body).await {
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
            .delete(URL_OPTIMIZATION, json!({ "id": session_id }))
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

    pub fn handle(&mut self, event: OptimizationEvent, session_id: &str, data: Value) {
        let Some(tab) = self.tabs.find_by_session(session_id) else {
            debug!("[Optimization] 未知会话 {}，忽略 {:?}", session_id, event);
            return;
        };
        let results = &mut tab.results;

        match event {
            OptimizationEvent::Progressbar => results.progressbar = Progress::from_value(&data),
            OptimizationEvent::GeneralInfo => results.general_info = data,
            OptimizationEvent::Metrics => results.metrics = metrics_rows(&data),
            OptimizationEvent::Exception => results.exception = Exception::from_value(&data),
            OptimizationEvent::BestCandidates => {
                results.best_candidates = data.as_array().cloned().unwrap_or_default();
            }
            OptimizationEvent::Alert => {
                results.alert = Alert::from_value(&data);
                tab.finish();
            }
            OptimizationEvent::Termination => {
                if tab.terminate() {
                    self.ctx
                        .notifier
                        .success("Optimization terminated successfully");
                }
            }
        }
    }
}

/// 后端给出的是扁平对象，按键顺序逐行展示
pub fn metrics_rows(data: &Value) -> Vec<MetricRow> {
    match data.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| metric(&humanize_key(k), display_value(v)))
            .collect(),
        None => Vec::new(),
    }
}

/// `best_trial_sharpe` -> `Best Trial Sharpe`
fn humanize_key(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_object_becomes_rows() {
        let rows = metrics_rows(&json!({"best_sharpe": 1.5, "trials_done": 20}));
        assert_eq!(rows.len(), 2);
        assert!(rows.contains(&metric("Best Sharpe", "1.5")));
        assert!(rows.contains(&metric("Trials Done", "20")));
        assert!(metrics_rows(&Value::Null).is_empty());
    }

    #[test]
    fn humanize_handles_odd_keys() {
        assert_eq!(humanize_key("a__b"), "A B");
        assert_eq!(humanize_key(""), "");
    }
}
