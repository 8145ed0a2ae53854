mod common;

use common::Harness;
use reqwest::Method;
use rustjesse::session::{url_backtest_session_chart_data, ApiError, URL_BACKTEST};
use rustjesse::stores::backtest::ChartDataReply;
use rustjesse::stores::{BacktestEvent, BacktestStore, Route, SessionStatus};
use rustjesse::AppEvent;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn store_with_route(h: &Harness) -> BacktestStore {
    let mut store = BacktestStore::new(h.ctx.clone());
    let tab = store.tabs.get_mut(1).unwrap();
    tab.form.routes = vec![Route::new("Binance", "btc-usdt", "4h", "ExampleStrategy")];
    tab.form.extra_routes = vec![Route::new("Binance", "eth-usdt", "1h", "")];
    store
}

fn session_of(store: &BacktestStore, tab: u32) -> String {
    store.tabs.get(tab).unwrap().session_id().unwrap().to_string()
}

#[tokio::test]
async fn start_posts_job_with_fresh_session() {
    let mut h = Harness::new();
    let mut store = store_with_route(&h);

    store.start(1).await;

    let tab = store.tabs.get(1).unwrap();
    assert!(tab.results.executing);
    assert!(!tab.results.exception.is_set());
    assert_eq!(tab.form.routes[0].symbol, "BTC-USDT");
    assert_eq!(tab.form.extra_routes[0].symbol, "ETH-USDT");
    assert_eq!(tab.status(), SessionStatus::Running);

    let calls = h.api.calls_to(URL_BACKTEST);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, Method::POST);
    let body = calls[0].body.clone().unwrap();
    assert_eq!(body["id"], Value::String(session_of(&store, 1)));
    assert_eq!(body["exchange"], "Binance");
    assert_eq!(body["routes"][0]["symbol"], "BTC-USDT");
    assert_eq!(body["data_routes"][0]["symbol"], "ETH-USDT");
    assert_eq!(body["export_chart"], true);
    assert_eq!(body["start_date"], "2021-01-01");
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn each_start_binds_a_new_session() {
    let h = Harness::new();
    let mut store = store_with_route(&h);

    store.start(1).await;
    let first = session_of(&store, 1);
    store.rerun(1).await;
    let second = session_of(&store, 1);

    assert_ne!(first, second);
    // 旧会话的事件不再生效
    store.handle(BacktestEvent::Exception, &first, json!({"error": "late"}));
    assert!(!store.tabs.get(1).unwrap().results.exception.is_set());
}

#[tokio::test]
async fn start_failure_reverts_and_notifies() {
    let mut h = Harness::new();
    h.api.respond(
        Method::POST,
        URL_BACKTEST,
        Err(ApiError::status(500, "Internal Server Error")),
    );
    let mut store = store_with_route(&h);

    store.start(1).await;

    assert!(!store.tabs.get(1).unwrap().results.executing);
    assert_eq!(
        h.drain(),
        vec![AppEvent::Error("[500]: Internal Server Error".to_string())]
    );
}

#[tokio::test]
async fn exception_event_fails_the_tab() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let sid = session_of(&store, 1);

    store.handle(
        BacktestEvent::Exception,
        &sid,
        json!({"error": "ZeroDivisionError", "traceback": "line 1"}),
    );
    store.handle(BacktestEvent::Termination, &sid, Value::Null);

    let r = &store.tabs.get(1).unwrap().results;
    assert_eq!(r.exception.error, "ZeroDivisionError");
    assert_eq!(r.exception.traceback, "line 1");
    assert_eq!(store.tabs.get(1).unwrap().status(), SessionStatus::Failed);
}

#[tokio::test]
async fn empty_equity_curve_finishes_and_shows_results() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let sid = session_of(&store, 1);

    store.handle(BacktestEvent::EquityCurve, &sid, json!([]));

    let tab = store.tabs.get(1).unwrap();
    assert!(!tab.results.executing);
    assert!(tab.results.show_results);
    assert!(tab.results.charts.equity_curve.is_empty());
    assert_eq!(tab.status(), SessionStatus::Completed);
    assert!(tab.session.as_ref().unwrap().finished_at.is_some());
    // 没有 general_info.session_id 时不拉图表
    assert_eq!(h.api.calls().len(), 1);
}

async fn next_chart_reply(replies: &mut mpsc::UnboundedReceiver<ChartDataReply>) -> ChartDataReply {
    timeout(Duration::from_secs(2), replies.recv())
        .await
        .expect("chart data request never finished")
        .unwrap()
}

#[tokio::test]
async fn equity_curve_requests_chart_data_in_background() {
    let h = Harness::new();
    let chart_url = url_backtest_session_chart_data("srv-1");
    h.api.respond(
        Method::POST,
        &chart_url,
        Ok(json!({"chart_data": {
            "candles_chart": [{"time": 1, "open": 1.0}],
            "orders_chart": [{"time": 1}, {"time": 2}],
            "add_horizontal_line_to_extra_chart": [{"y": 3}]
        }})),
    );
    let mut store = store_with_route(&h);
    let mut replies = store.take_chart_replies().unwrap();
    assert!(store.take_chart_replies().is_none());
    store.start(1).await;
    let sid = session_of(&store, 1);

    store.handle(BacktestEvent::GeneralInfo, &sid, json!({"session_id": "srv-1"}));
    store.handle(
        BacktestEvent::EquityCurve,
        &sid,
        json!([{"name": "Portfolio", "data": [{"time": 1, "value": 100.0}]}]),
    );
    // 结果先展示，图表数据稍后写入
    assert!(store.tabs.get(1).unwrap().results.show_results);
    assert!(store.tabs.get(1).unwrap().results.charts.candles.is_empty());

    let reply = next_chart_reply(&mut replies).await;
    assert_eq!(reply.session_id, sid);
    store.apply_chart_data(reply);

    assert_eq!(h.api.calls_to(&chart_url).len(), 1);
    let charts = &store.tabs.get(1).unwrap().results.charts;
    assert_eq!(charts.equity_curve.len(), 1);
    assert_eq!(charts.candles.len(), 1);
    assert_eq!(charts.orders.len(), 2);
    assert_eq!(charts.extra_horizontal_lines.len(), 1);
    assert!(charts.lines.is_empty());
}

#[tokio::test]
async fn chart_data_failure_keeps_results_shown() {
    let mut h = Harness::new();
    let chart_url = url_backtest_session_chart_data("srv-2");
    h.api.respond(
        Method::POST,
        &chart_url,
        Err(ApiError::status(404, "Not Found")),
    );
    let mut store = store_with_route(&h);
    let mut replies = store.take_chart_replies().unwrap();
    store.start(1).await;
    let sid = session_of(&store, 1);
    store.handle(BacktestEvent::GeneralInfo, &sid, json!({"session_id": "srv-2"}));

    store.handle(BacktestEvent::EquityCurve, &sid, json!([]));
    let reply = next_chart_reply(&mut replies).await;
    store.apply_chart_data(reply);

    let r = &store.tabs.get(1).unwrap().results;
    assert!(r.show_results);
    assert!(!r.executing);
    assert_eq!(
        h.drain(),
        vec![AppEvent::Error("Failed to fetch chart data".to_string())]
    );
}

#[tokio::test]
async fn late_chart_data_for_replaced_session_is_dropped() {
    let mut h = Harness::new();
    let chart_url = url_backtest_session_chart_data("srv-3");
    h.api.respond(
        Method::POST,
        &chart_url,
        Ok(json!({"chart_data": {"candles_chart": [{"time": 1}]}})),
    );
    let mut store = store_with_route(&h);
    let mut replies = store.take_chart_replies().unwrap();
    store.start(1).await;
    let sid = session_of(&store, 1);
    store.handle(BacktestEvent::GeneralInfo, &sid, json!({"session_id": "srv-3"}));
    store.handle(BacktestEvent::EquityCurve, &sid, json!([]));
    let reply = next_chart_reply(&mut replies).await;

    // 回复到达前用户已重新运行
    store.rerun(1).await;
    store.apply_chart_data(reply);

    assert!(store.tabs.get(1).unwrap().results.charts.candles.is_empty());
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn termination_notifies_once() {
    let mut h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let sid = session_of(&store, 1);

    store.handle(BacktestEvent::Termination, &sid, Value::Null);
    store.handle(BacktestEvent::Termination, &sid, Value::Null);

    assert_eq!(
        h.drain(),
        vec![AppEvent::Success("Session terminated successfully".to_string())]
    );
    assert_eq!(store.tabs.get(1).unwrap().status(), SessionStatus::Terminated);
}

#[tokio::test]
async fn unknown_session_is_ignored() {
    let mut h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let before = store.tabs.get(1).unwrap().results.clone();

    for ev in [
        BacktestEvent::Progressbar,
        BacktestEvent::Metrics,
        BacktestEvent::Termination,
        BacktestEvent::EquityCurve,
        BacktestEvent::InfoLog,
    ] {
        store.handle(ev, "not-a-session", json!({"current": 50}));
    }

    assert_eq!(store.tabs.get(1).unwrap().results, before);
    assert!(h.drain().is_empty());
    assert_eq!(h.api.calls().len(), 1);
}

#[tokio::test]
async fn null_metrics_clear_previous_rows() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let sid = session_of(&store, 1);

    store.handle(BacktestEvent::Metrics, &sid, json!({"total": 3, "net_profit": 12.5}));
    assert_eq!(store.tabs.get(1).unwrap().results.metrics.len(), 25);

    store.handle(BacktestEvent::Metrics, &sid, Value::Null);
    assert!(store.tabs.get(1).unwrap().results.metrics.is_empty());
}

#[tokio::test]
async fn info_log_appends_lines() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let sid = session_of(&store, 1);

    for msg in ["first", "second"] {
        store.handle(
            BacktestEvent::InfoLog,
            &sid,
            json!({"timestamp": 1_609_459_200_000i64, "message": msg}),
        );
    }

    assert_eq!(
        store.tabs.get(1).unwrap().results.info_logs,
        "[2021-01-01 00:00:00] first\n[2021-01-01 00:00:00] second\n"
    );
}

#[tokio::test]
async fn cancel_with_exception_is_local_only() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let sid = session_of(&store, 1);
    store.handle(BacktestEvent::Exception, &sid, json!({"error": "boom"}));

    store.cancel(1).await;

    assert!(!store.tabs.get(1).unwrap().results.executing);
    assert!(h
        .api
        .calls()
        .iter()
        .all(|c| c.method != Method::DELETE));
}

#[tokio::test]
async fn cancel_sends_delete_with_session_id() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    store.start(1).await;
    let sid = session_of(&store, 1);

    store.cancel(1).await;

    let calls = h.api.calls_to(URL_BACKTEST);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].method, Method::DELETE);
    assert_eq!(calls[1].body, Some(json!({"id": sid})));
    // 结果由后续推送决定
    assert!(store.tabs.get(1).unwrap().results.executing);
}

#[tokio::test]
async fn cancel_without_session_is_local_only() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    store.cancel(1).await;
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn start_in_new_tab_clones_form() {
    let h = Harness::new();
    let mut store = store_with_route(&h);

    let id = store.start_in_new_tab(1).await.unwrap();

    assert_eq!(id, 2);
    assert_eq!(store.tabs.len(), 2);
    let tab = store.tabs.get(2).unwrap();
    assert_eq!(tab.form.routes[0].strategy, "ExampleStrategy");
    assert!(tab.results.executing);
    assert!(store.tabs.get(1).unwrap().session.is_none());
    assert!(store.start_in_new_tab(99).await.is_none());
}

#[tokio::test]
async fn add_tab_and_new_backtest() {
    let h = Harness::new();
    let mut store = store_with_route(&h);
    assert_eq!(store.add_tab(), 2);
    assert_eq!(store.add_tab(), 3);
    assert_eq!(store.tabs.ids(), vec![1, 2, 3]);

    store.tabs.get_mut(1).unwrap().results.show_results = true;
    store.new_backtest(1);
    assert!(!store.tabs.get(1).unwrap().results.show_results);
    assert!(h.api.calls().is_empty());
}
