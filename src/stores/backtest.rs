use super::common::{
    impl_job_results, log_line, new_session_id, routes_info_table, uppercase_symbols, Alert,
    ChartPoint, Exception, Progress, Route, TableCell,
};
use super::format::{
    display_value, fmt2, num, round2, seconds_to_human_readable, timestamp_to_date,
};
use super::tabs::TabSet;
use super::{metric, MetricRow, StoreContext};
use crate::session::{url_backtest_session_chart_data, ApiError, URL_BACKTEST};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

const FORM_KEY: &str = "backtestForm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestForm {
    pub start_date: String,
    pub finish_date: String,
    pub debug_mode: bool,
    pub export_tradingview: bool,
    pub export_full_reports: bool,
    pub export_csv: bool,
    pub export_json: bool,
    pub routes: Vec<Route>,
    pub extra_routes: Vec<Route>,
}

impl Default for BacktestForm {
    fn default() -> Self {
        Self {
            start_date: "2021-01-01".to_string(),
            finish_date: "2021-06-01".to_string(),
            debug_mode: false,
            export_tradingview: false,
            export_full_reports: false,
            export_csv: false,
            export_json: false,
            routes: Vec::new(),
            extra_routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestCharts {
    pub equity_curve: Vec<ChartPoint>,
    pub candles: Vec<Value>,
    pub orders: Vec<Value>,
    pub lines: Vec<Value>,
    pub shapes: Vec<Value>,
    pub extra_lines: Vec<Value>,
    pub horizontal_lines: Vec<Value>,
    pub extra_horizontal_lines: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestResults {
    pub show_results: bool,
    pub executing: bool,
    pub terminated: bool,
    pub progressbar: Progress,
    pub info: Vec<MetricRow>,
    pub routes_info: Vec<Vec<TableCell>>,
    pub metrics: Vec<MetricRow>,
    pub hyperparameters: Value,
    pub general_info: Value,
    pub info_logs: String,
    pub exception: Exception,
    pub trades: Vec<Value>,
    pub charts: BacktestCharts,
    pub alert: Alert,
}

impl_job_results!(BacktestResults);

/// `backtest.*` 推送事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestEvent {
    CandlesInfo,
    RoutesInfo,
    Progressbar,
    Metrics,
    Hyperparameters,
    InfoLog,
    EquityCurve,
    Exception,
    GeneralInfo,
    Termination,
    Alert,
    Trades,
}

/// 图表数据请求的结果，回到 dashboard 主循环后再写入标签页
#[derive(Debug)]
pub struct ChartDataReply {
    /// 发起请求时标签页绑定的会话
    pub session_id: String,
    pub result: Result<Value, ApiError>,
}

pub struct BacktestStore {
    pub tabs: TabSet<BacktestForm, BacktestResults>,
    ctx: StoreContext,
    chart_tx: mpsc::UnboundedSender<ChartDataReply>,
    chart_rx: Option<mpsc::UnboundedReceiver<ChartDataReply>>,
}

impl BacktestStore {
    pub fn new(ctx: StoreContext) -> Self {
        let form = ctx.defaults.load(FORM_KEY, BacktestForm::default());
        let (chart_tx, chart_rx) = mpsc::unbounded_channel();
        Self {
            tabs: TabSet::new(form, BacktestResults::default()),
            ctx,
            chart_tx,
            chart_rx: Some(chart_rx),
        }
    }

    /// 取走图表数据回复的接收端；只能取一次
    pub fn take_chart_replies(&mut self) -> Option<mpsc::UnboundedReceiver<ChartDataReply>> {
        self.chart_rx.take()
    }

    pub fn add_tab(&mut self) -> u32 {
        let form = self.ctx.defaults.load(FORM_KEY, BacktestForm::default());
        self.tabs.insert(form, BacktestResults::default())
    }

    /// 复制已有标签页的表单到新标签页并立即启动
    pub async fn start_in_new_tab(&mut self, source_id: u32) -> Option<u32> {
        let id = self.tabs.duplicate(source_id)?;
        self.start(id).await;
        Some(id)
    }

    pub async fn start(&mut self, id: u32) {
        let session_id = new_session_id();
        let Some(tab) = self.tabs.get_mut(id) else {
            warn!("[Backtest] 标签页不存在: {}", id);
            return;
        };
        tab.bind_session(session_id.clone());
        info!("[Backtest] 启动会话 {} (tab {})", session_id, id);

        let results = &mut tab.results;
        results.progressbar.current = 0.0;
        results.executing = true;
        results.terminated = false;
        results.info_logs.clear();
        results.exception.clear();
        results.alert.message.clear();

        uppercase_symbols(&mut tab.form.routes);
        uppercase_symbols(&mut tab.form.extra_routes);
        self.ctx.defaults.save(FORM_KEY, &tab.form);

        let form = &tab.form;
        let exchange = form
            .routes
            .first()
            .map(|r| r.exchange.clone())
            .unwrap_or_default();

        let body = json!({
            "id": session_id,
            "exchange": exchange,
            "routes": form.routes,
            "data_routes": form.extra_routes,
            "config": self.ctx.job_config,
            "start_date": form.start_date,
            "finish_date": form.finish_date,
            "debug_mode": form.debug_mode,
            "export_csv": form.export_csv,
            "export_chart": true,
            "export_tradingview": form.export_tradingview,
            "export_json": form.export_json,
            "fast_mode": false,
            "benchmark": false,
        });

        if let Err(e) = self.ctx.api.post(URL_BACKTEST, body).await {
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
            .delete(URL_BACKTEST, json!({ "id": session_id }))
            .await
        {
            self.ctx.notifier.error(e.to_string());
        }
    }

    pub async fn rerun(&mut self, id: u32) {
        self.tabs.hide_results(id);
        self.start(id).await;
    }

    /// 回到配置界面
    pub fn new_backtest(&mut self, id: u32) {
        self.tabs.hide_results(id);
    }

    pub fn handle(&mut self, event: BacktestEvent, session_id: &str, data: Value) {
        if event == BacktestEvent::EquityCurve {
            self.equity_curve_event(session_id, &data);
            return;
        }

        let Some(tab) = self.tabs.find_by_session(session_id) else {
            debug!("[Backtest] 未知会话 {}，忽略 {:?}", session_id, event);
            return;
        };
        let results = &mut tab.results;

        match event {
            BacktestEvent::CandlesInfo => results.info = candles_info_rows(&data),
            BacktestEvent::RoutesInfo => results.routes_info = routes_info_table(&data),
            BacktestEvent::Progressbar => results.progressbar = Progress::from_value(&data),
            BacktestEvent::Metrics => results.metrics = metrics_rows(&data),
            BacktestEvent::Hyperparameters => results.hyperparameters = data,
            BacktestEvent::InfoLog => results.info_logs.push_str(&log_line(&data)),
            BacktestEvent::Exception => results.exception = Exception::from_value(&data),
            BacktestEvent::GeneralInfo => results.general_info = data,
            BacktestEvent::Alert => results.alert = Alert::from_value(&data),
            BacktestEvent::Trades => {
                results.trades = data.as_array().cloned().unwrap_or_default();
            }
            BacktestEvent::Termination => {
                if tab.terminate() {
                    self.ctx.notifier.success("Session terminated successfully");
                }
            }
            BacktestEvent::EquityCurve => {}
        }
    }

    fn equity_curve_event(&mut self, session_id: &str, data: &Value) {
        let Some(tab) = self.tabs.find_by_session(session_id) else {
            debug!("[Backtest] equity_curve: 未知会话 {}", session_id);
            return;
        };

        tab.results.charts.equity_curve = parse_equity_curve(data);
        // 回测结束，展示结果
        tab.finish();

        let tab_id = tab.id;
        self.request_chart_data(tab_id);
    }

    /// 后台拉取完整图表数据，结果经 `take_chart_replies` 的通道送回。
    /// 没有 `general_info.session_id` 时不发请求，返回 false
    pub fn request_chart_data(&self, tab_id: u32) -> bool {
        let Some(tab) = self.tabs.get(tab_id) else {
            return false;
        };
        let (Some(session_id), Some(server_session)) = (
            tab.session_id().map(str::to_string),
            tab.results
                .general_info
                .get("session_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        ) else {
            debug!("[Backtest] 没有 session_id，跳过图表数据");
            return false;
        };

        let api = self.ctx.api.clone();
        let tx = self.chart_tx.clone();
        tokio::spawn(async move {
            let url = url_backtest_session_chart_data(&server_session);
            let result = api.post_empty(&url).await;
            let _ = tx.send(ChartDataReply { session_id, result });
        });
        true
    }

    /// 写入图表数据；标签页已换会话时丢弃，失败不影响已展示的结果
    pub fn apply_chart_data(&mut self, reply: ChartDataReply) {
        let Some(tab) = self.tabs.find_by_session(&reply.session_id) else {
            debug!("[Backtest] 图表数据对应的会话已失效: {}", reply.session_id);
            return;
        };
        let resp = match reply.result {
            Ok(resp) => resp,
            Err(e) => {
                error!("[Backtest] 拉取图表数据失败: {}", e);
                self.ctx.notifier.error("Failed to fetch chart data");
                return;
            }
        };
        let Some(chart_data) = resp.get("chart_data").filter(|v| v.is_object()) else {
            info!("[Backtest] 没有图表数据");
            return;
        };

        let series = |key: &str| -> Vec<Value> {
            chart_data
                .get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let charts = &mut tab.results.charts;
        charts.candles = series("candles_chart");
        charts.orders = series("orders_chart");
        charts.lines = series("add_line_to_candle_chart");
        charts.shapes = series("add_shape_to_candle_chart");
        charts.extra_lines = series("add_extra_line_chart");
        charts.horizontal_lines = series("add_horizontal_line_to_candle_chart");
        charts.extra_horizontal_lines = series("add_horizontal_line_to_extra_chart");
    }
}

fn candles_info_rows(data: &Value) -> Vec<MetricRow> {
    let ts = |k: &str| data.get(k).and_then(Value::as_i64).unwrap_or(0);
    let field = |k: &str| data.get(k).map(display_value).unwrap_or_default();

    let mut rows = vec![
        metric("Period", field("duration")),
        metric("Starting Date", timestamp_to_date(ts("starting_time"))),
        metric("Ending Date", timestamp_to_date(ts("finishing_time"))),
        metric("Exchange Type", field("exchange_type")),
    ];
    if data.get("exchange_type").and_then(Value::as_str) == Some("futures") {
        rows.push(metric("Leverage", field("leverage")));
        rows.push(metric("Leverage Mode", field("leverage_mode")));
    }
    rows
}

/// 回测指标表；`null` 表示没有成交，清空
pub fn metrics_rows(data: &Value) -> Vec<MetricRow> {
    if data.is_null() {
        return Vec::new();
    }
    let n = |k: &str| num(data, k);
    let raw = |k: &str| data.get(k).map(display_value).unwrap_or_default();

    vec![
        metric("Total Closed Trades", raw("total")),
        metric(
            "Total Net Profit",
            format!("{} ({}%)", fmt2(n("net_profit")), fmt2(n("net_profit_percentage"))),
        ),
        metric(
            "Starting => Finishing Balance",
            format!("{} => {}", fmt2(n("starting_balance")), fmt2(n("finishing_balance"))),
        ),
        metric("Open Trades", raw("total_open_trades")),
        metric("Total Paid Fees", fmt2(n("fee"))),
        metric("Max Drawdown", format!("{}%", fmt2(n("max_drawdown")))),
        metric("Annual Return", format!("{}%", fmt2(n("annual_return")))),
        metric(
            "Expectancy",
            format!("{} ({}%)", fmt2(n("expectancy")), fmt2(n("expectancy_percentage"))),
        ),
        metric(
            "Avg Win | Avg Loss",
            format!("{} | {}", fmt2(n("average_win")), fmt2(n("average_loss"))),
        ),
        metric("Ratio Avg Win / Avg Loss", fmt2(n("ratio_avg_win_loss"))),
        metric("Win-rate", format!("{}%", round2(n("win_rate") * 100.0))),
        metric(
            "Longs | Shorts",
            format!(
                "{}% | {}%",
                fmt2(n("longs_percentage")),
                fmt2(n("shorts_percentage"))
            ),
        ),
        metric(
            "Avg Holding Time",
            seconds_to_human_readable(n("average_holding_period")),
        ),
        metric(
            "Winning Trades Avg Holding Time",
            seconds_to_human_readable(n("average_winning_holding_period")),
        ),
        metric(
            "Losing Trades Avg Holding Time",
            seconds_to_human_readable(n("average_losing_holding_period")),
        ),
        metric("Sharpe Ratio", fmt2(n("sharpe_ratio"))),
        metric("Calmar Ratio", fmt2(n("calmar_ratio"))),
        metric("Sortino Ratio", fmt2(n("sortino_ratio"))),
        metric("Omega Ratio", fmt2(n("omega_ratio"))),
        metric("Winning Streak", raw("winning_streak")),
        metric("Losing Streak", raw("losing_streak")),
        metric("Largest Winning Trade", fmt2(n("largest_winning_trade"))),
        metric("Largest Losing Trade", fmt2(n("largest_losing_trade"))),
        metric("Total Winning Trades", raw("total_winning_trades")),
        metric("Total Losing Trades", raw("total_losing_trades")),
    ]
}

/// 两种格式：
/// - `[{name, data: [{time, value}, ...]}, ...]`，取第一条（组合权益）
/// - 旧格式 `[{balance, timestamp}, ...]`
pub fn parse_equity_curve(data: &Value) -> Vec<ChartPoint> {
    let Some(items) = data.as_array().filter(|a| !a.is_empty()) else {
        return Vec::new();
    };

    if let Some(points) = items[0].get("data") {
        return points
            .as_array()
            .map(|pts| {
                pts.iter()
                    .map(|p| point(p, "time", "value"))
                    .collect()
            })
            .unwrap_or_default();
    }

    items
        .iter()
        .map(|item| {
            let value = item
                .get("balance")
                .and_then(Value::as_f64)
                .or_else(|| item.get("value").and_then(Value::as_f64))
                .unwrap_or(0.0);
            let time = item
                .get("timestamp")
                .and_then(as_time)
                .or_else(|| item.get("time").and_then(as_time))
                .unwrap_or(0);
            ChartPoint { time, value }
        })
        .collect()
}

fn point(p: &Value, time_key: &str, value_key: &str) -> ChartPoint {
    ChartPoint {
        time: p.get(time_key).and_then(as_time).unwrap_or(0),
        value: p.get(value_key).and_then(Value::as_f64).unwrap_or(0.0),
    }
}

pub(crate) fn as_time(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}
