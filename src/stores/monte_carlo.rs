use super::backtest::as_time;
use super::common::{
    impl_job_results, log_line, new_session_id, routes_info_table, uppercase_symbols, Alert,
    ChartPoint, Exception, Progress, Route, TableCell,
};
use super::format::{display_value, fmt2, num, round2};
use super::tabs::TabSet;
use super::{metric, MetricRow, StoreContext};
use crate::session::{URL_MONTE_CARLO, URL_MONTE_CARLO_CANCEL, URL_MONTE_CARLO_TERMINATE};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const FORM_KEY: &str = "monteCarloForm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloForm {
    pub start_date: String,
    pub finish_date: String,
    pub debug_mode: bool,
    pub routes: Vec<Route>,
    pub extra_routes: Vec<Route>,
    pub num_simulations: u32,
    pub initial_balance: f64,
    /// 0.005 = 0.5%
    pub spread: f64,
    pub slippage: f64,
    pub fee: f64,
    pub random_starting_equity: bool,
    pub equity_variance: f64,
}

impl Default for MonteCarloForm {
    fn default() -> Self {
        Self {
            start_date: "2021-01-01".to_string(),
            finish_date: "2021-06-01".to_string(),
            debug_mode: false,
            routes: Vec::new(),
            extra_routes: Vec::new(),
            num_simulations: 100,
            initial_balance: 10000.0,
            spread: 0.005,
            slippage: 0.001,
            fee: 0.001,
            random_starting_equity: false,
            equity_variance: 0.1,
        }
    }
}

/// 模拟结果的原始统计值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloStatistics {
    pub median_return: f64,
    pub worst_case_return: f64,
    pub best_case_return: f64,
    pub median_max_drawdown: f64,
    pub worst_case_max_drawdown: f64,
    pub probability_of_profit: f64,
    pub probability_of_ruin: f64,
    pub var_95: f64,
    pub cvar_95: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonteCarloResults {
    pub show_results: bool,
    pub executing: bool,
    pub terminated: bool,
    pub progressbar: Progress,
    pub routes_info: Vec<Vec<TableCell>>,
    pub metrics: Vec<MetricRow>,
    pub scenarios: Value,
    pub general_info: Value,
    pub info_logs: String,
    pub exception: Exception,
    /// 每条模拟一条曲线
    pub equity_curves: Vec<Vec<ChartPoint>>,
    pub alert: Alert,
    pub statistics: MonteCarloStatistics,
}

impl_job_results!(MonteCarloResults);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonteCarloEvent {
    Progressbar,
    InfoLog,
    RoutesInfo,
    GeneralInfo,
    Metrics,
    EquityCurves,
    Scenarios,
    Exception,
    Termination,
    Alert,
}

pub struct MonteCarloStore {
    pub tabs: TabSet<MonteCarloForm, MonteCarloResults>,
    ctx: StoreContext,
}

impl MonteCarloStore {
    pub fn new(ctx: StoreContext) -> Self {
        let form = ctx.defaults.load(FORM_KEY, MonteCarloForm::default());
        Self {
            tabs: TabSet::new(form, MonteCarloResults::default()),
            ctx,
        }
    }

    pub fn add_tab(&mut self) -> u32 {
        let form = self.ctx.defaults.load(FORM_KEY, MonteCarloForm::default());
        self.tabs.insert(form, MonteCarloResults::default())
    }

    pub async fn start_in_new_tab(&mut self, source_id: u32) -> Option<u32> {
        let id = self.tabs.duplicate(source_id)?;
        self.start(id).await;
        Some(id)
    }

    pub async fn start(&mut self, id: u32) {
        let session_id = new_session_id();
        let Some(tab) = self.tabs.get_mut(id) else {
            warn!("[MonteCarlo] 标签页不存在: {}", id);
            return;
        };
        tab.bind_session(session_id.clone());
        info!("[MonteCarlo] 启动模拟 {} (tab {})", session_id, id);

        // 上一次的结果全部作废
        tab.results = MonteCarloResults {
            executing: true,
            statistics: tab.results.statistics.clone(),
            ..MonteCarloResults::default()
        };

        uppercase_symbols(&mut tab.form.routes);
        uppercase_symbols(&mut tab.form.extra_routes);
        self.ctx.defaults.save(FORM_KEY, &tab.form);

        let form = &tab.form;
        let body = json!({
            "id": session_id,
            "routes": form.routes,
            "extra_routes": form.extra_routes,
            "config": self.ctx.job_config,
            "start_date": form.start_date,
            "finish_date": form.finish_date,
            "debug_mode": form.debug_mode,
            "num_simulations": form.num_simulations,
            "initial_balance": form.initial_balance,
            "spread": form.spread,
            "slippage": form.slippage,
            "fee": form.fee,
            "random_starting_equity": form.random_starting_equity,
            "equity_variance": form.equity_variance,
        });

        if let Err(e) = self.ctx.api.post(URL_MONTE_CARLO, body).await {
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
            .post(URL_MONTE_CARLO_CANCEL, json!({ "id": session_id }))
            .await
        {
            self.ctx.notifier.error(e.to_string());
        }
    }

    /// 提前结束模拟，保留已完成部分的结果
    pub async fn terminate(&mut self, id: u32) {
        let Some(session_id) = self
            .tabs
            .get(id)
            .and_then(|t| t.session_id())
            .map(str::to_string)
        else {
            return;
        };
        if let Err(e) = self
            .ctx
            .api
            .post(URL_MONTE_CARLO_TERMINATE, json!({ "id": session_id }))
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

    pub fn handle(&mut self, event: MonteCarloEvent, session_id: &str, data: Value) {
        let Some(tab) = self.tabs.find_by_session(session_id) else {
            debug!("[MonteCarlo] 未知会话 {}，忽略 {:?}", session_id, event);
            return;
        };
        let results = &mut tab.results;

        match event {
            MonteCarloEvent::Progressbar => results.progressbar = Progress::from_value(&data),
            MonteCarloEvent::InfoLog => results.info_logs.push_str(&log_line(&data)),
            MonteCarloEvent::RoutesInfo => results.routes_info = routes_info_table(&data),
            MonteCarloEvent::GeneralInfo => {
                results.executing = true;
                results.general_info = data;
            }
            MonteCarloEvent::Metrics => {
                results.metrics = metrics_rows(&data);
                if !data.is_null() {
                    results.statistics = serde_json::from_value(data).unwrap_or_default();
                }
            }
            MonteCarloEvent::EquityCurves => {
                results.equity_curves = parse_equity_curves(&data);
                tab.finish();
            }
            MonteCarloEvent::Scenarios => results.scenarios = data,
            MonteCarloEvent::Exception => results.exception = Exception::from_value(&data),
            MonteCarloEvent::Termination => {
                if tab.terminate() {
                    self.ctx
                        .notifier
                        .success("Simulation terminated successfully");
                }
            }
            MonteCarloEvent::Alert => {
                results.alert = Alert::from_value(&data);
                tab.finish();
            }
        }
    }
}

/// 模拟指标表，固定 10 行
pub fn metrics_rows(data: &Value) -> Vec<MetricRow> {
    if data.is_null() {
        return Vec::new();
    }
    let pct = |k: &str| format!("{}%", fmt2(num(data, k)));
    let completed = data
        .get("simulations_completed")
        .filter(|v| !v.is_null() && v.as_f64() != Some(0.0))
        .or_else(|| data.get("total_simulations"))
        .map(display_value)
        .unwrap_or_default();

    vec![
        metric("Simulations Completed", completed),
        metric("Median Return", pct("median_return")),
        metric("Best Case Return", pct("best_case_return")),
        metric("Worst Case Return", pct("worst_case_return")),
        metric("Median Max Drawdown", pct("median_max_drawdown")),
        metric("Worst Case Max Drawdown", pct("worst_case_max_drawdown")),
        metric(
            "Probability of Profit",
            format!("{}%", round2(num(data, "probability_of_profit") * 100.0)),
        ),
        metric(
            "Probability of Ruin",
            format!("{}%", round2(num(data, "probability_of_ruin") * 100.0)),
        ),
        metric("VaR (95%)", pct("var_95")),
        metric("CVaR (95%)", pct("cvar_95")),
    ]
}

/// `[[{balance, timestamp}, ...], ...]`
pub fn parse_equity_curves(data: &Value) -> Vec<Vec<ChartPoint>> {
    let Some(curves) = data.as_array() else {
        return Vec::new();
    };
    curves
        .iter()
        .map(|curve| {
            curve
                .as_array()
                .map(|points| {
                    points
                        .iter()
                        .map(|p| ChartPoint {
                            time: p.get("timestamp").and_then(as_time).unwrap_or(0),
                            value: p.get("balance").and_then(Value::as_f64).unwrap_or(0.0),
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}
