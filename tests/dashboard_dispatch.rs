mod common;

use common::Harness;
use reqwest::Method;
use rustjesse::channel::PushMessage;
use rustjesse::commands::{AppCommand, Domain};
use rustjesse::session::{
    url_backtest_session_chart_data, URL_EXCHANGE_API_KEYS, URL_NOTIFICATION_API_KEYS_STORE,
    URL_STRATEGY_ALL,
};
use rustjesse::stores::common::JobResults;
use rustjesse::stores::{Route, SessionStatus};
use rustjesse::{AppEvent, Dashboard};
use serde_json::{json, Value};
use tokio::sync::mpsc;

async fn started_dashboard(h: &Harness) -> (Dashboard, String) {
    let mut dash = Dashboard::new(h.ctx.clone());
    dash.execute(AppCommand::Route {
        domain: Domain::Backtest,
        tab: 1,
        route: Route::new("Binance", "btc-usdt", "4h", "ExampleStrategy"),
    })
    .await;
    dash.execute(AppCommand::Start {
        domain: Domain::Backtest,
        tab: 1,
    })
    .await;
    let sid = dash
        .backtest
        .tabs
        .get(1)
        .unwrap()
        .session_id()
        .unwrap()
        .to_string();
    (dash, sid)
}

#[tokio::test]
async fn routes_push_messages_to_owning_store() {
    let h = Harness::new();
    let (mut dash, sid) = started_dashboard(&h).await;

    dash.dispatch(PushMessage::new(
        "backtest.progressbar",
        sid.clone(),
        json!({"current": 30, "estimated_remaining_seconds": 12}),
    ));
    dash.dispatch(PushMessage::new("backtest.equity_curve", sid.clone(), json!([])));

    let tab = dash.backtest.tabs.get(1).unwrap();
    assert_eq!(tab.results.progressbar.current, 30.0);
    assert_eq!(tab.status(), SessionStatus::Completed);
}

#[tokio::test]
async fn unknown_events_and_sessions_are_dropped() {
    let mut h = Harness::new();
    let (mut dash, sid) = started_dashboard(&h).await;
    h.drain();
    let before = dash.backtest.tabs.get(1).unwrap().results.clone();

    dash.dispatch(PushMessage::new("backtest.nonsense", sid.clone(), json!({})));
    dash.dispatch(PushMessage::new("weird", sid.clone(), Value::Null));
    dash.dispatch(PushMessage::new("backtest.termination", "other", Value::Null));
    // 同名事件但属于其他领域：当前会话不在 live store 中
    dash.dispatch(PushMessage::new("livetrade.termination", sid.clone(), Value::Null));

    assert_eq!(dash.backtest.tabs.get(1).unwrap().results, before);
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn papertrade_and_livetrade_reach_live_store() {
    let h = Harness::new();
    let mut dash = Dashboard::new(h.ctx.clone());
    dash.execute(AppCommand::Start {
        domain: Domain::Live,
        tab: 1,
    })
    .await;
    let sid = dash.live.tabs.get(1).unwrap().session_id().unwrap().to_string();

    dash.dispatch(PushMessage::new(
        "papertrade.info_log",
        sid.clone(),
        json!({"timestamp": 0, "message": "paper"}),
    ));
    dash.dispatch(PushMessage::new(
        "livetrade.info_log",
        sid.clone(),
        json!({"timestamp": 0, "message": "live"}),
    ));

    assert_eq!(
        dash.live.tabs.get(1).unwrap().results.info_logs,
        "[1970-01-01 00:00:00] paper\n[1970-01-01 00:00:00] live\n"
    );
}

#[tokio::test]
async fn console_commands_report_missing_tabs() {
    let mut h = Harness::new();
    let mut dash = Dashboard::new(h.ctx.clone());

    dash.execute(AppCommand::Start {
        domain: Domain::Optimization,
        tab: 7,
    })
    .await;
    dash.execute(AppCommand::Dates {
        domain: Domain::Live,
        tab: 1,
        start: "2022-01-01".to_string(),
        finish: None,
    })
    .await;

    let events = h.drain();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, AppEvent::Error(_))));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn run_loop_drains_pushes_and_stops_on_quit() {
    let h = Harness::new();
    let (dash, sid) = started_dashboard(&h).await;
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(dash.run(push_rx, cmd_rx));
    for n in 1..=5 {
        push_tx
            .send(PushMessage::new(
                "backtest.info_log",
                sid.clone(),
                json!({"timestamp": 0, "message": format!("m{}", n)}),
            ))
            .unwrap();
    }
    // 让推送先处理完
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cmd_tx.send(AppCommand::Quit).unwrap();

    let dash = tokio::time::timeout(std::time::Duration::from_secs(2), task)
        .await
        .expect("dashboard did not stop")
        .unwrap();
    assert_eq!(
        dash.backtest.tabs.get(1).unwrap().results.info_logs.lines().count(),
        5
    );
}

#[tokio::test]
async fn run_loop_applies_chart_data_after_equity_curve() {
    let h = Harness::new();
    h.api.respond(
        Method::POST,
        &url_backtest_session_chart_data("srv-9"),
        Ok(json!({"chart_data": {"candles_chart": [{"time": 1}, {"time": 2}]}})),
    );
    let (dash, sid) = started_dashboard(&h).await;
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(dash.run(push_rx, cmd_rx));

    for (event, data) in [
        ("backtest.general_info", json!({"session_id": "srv-9"})),
        ("backtest.equity_curve", json!([])),
        ("backtest.info_log", json!({"timestamp": 0, "message": "after"})),
    ] {
        push_tx
            .send(PushMessage::new(event, sid.clone(), data))
            .unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cmd_tx.send(AppCommand::Quit).unwrap();

    let dash = task.await.unwrap();
    let r = &dash.backtest.tabs.get(1).unwrap().results;
    assert_eq!(r.charts.candles.len(), 2);
    assert_eq!(r.info_logs, "[1970-01-01 00:00:00] after\n");
    assert_eq!(r.status(), SessionStatus::Completed);
}

#[tokio::test]
async fn show_describes_tab() {
    let h = Harness::new();
    let (mut dash, sid) = started_dashboard(&h).await;
    dash.dispatch(PushMessage::new(
        "backtest.metrics",
        sid,
        json!({"total": 4, "net_profit": 10.0}),
    ));

    let text = dash.describe(Domain::Backtest, 1).unwrap();
    assert!(text.starts_with("Tab 1 Running session="));
    assert!(text.contains("Total Closed Trades"));
    assert!(dash.describe(Domain::Backtest, 9).is_none());
}

#[tokio::test]
async fn key_and_strategy_commands_reach_their_stores() {
    let mut h = Harness::new();
    h.api.respond(
        Method::GET,
        URL_EXCHANGE_API_KEYS,
        Ok(json!({"api_keys": [{"id": "e1", "name": "main", "exchange": "Bybit USDT Perpetual"}]})),
    );
    h.api.respond(
        Method::GET,
        URL_STRATEGY_ALL,
        Ok(json!({"strategies": [{"name": "Zeta"}, {"name": "Alpha"}]})),
    );
    let mut dash = Dashboard::new(h.ctx.clone());

    for line in [
        "keys",
        r#"store-key notification {"name": "alerts", "driver": "telegram"}"#,
        "delete-key exchange e1",
        "strategies",
    ] {
        dash.execute(line.parse().unwrap()).await;
    }

    assert_eq!(
        h.api.calls_to(URL_NOTIFICATION_API_KEYS_STORE)[0].body,
        Some(json!({"name": "alerts", "driver": "telegram"}))
    );
    assert!(dash.exchange_keys.api_keys.is_empty());
    assert_eq!(dash.strategy.strategy_names(), vec!["Zeta", "Alpha"]);

    let events = h.drain();
    assert_eq!(
        events[0],
        AppEvent::Info("[exchange]\n  e1  main  Bybit USDT Perpetual\n[notification]".to_string())
    );
    assert!(events.contains(&AppEvent::Success(
        "Notification key saved successfully".to_string()
    )));
    assert!(events.contains(&AppEvent::Success("API key deleted successfully".to_string())));
    assert_eq!(
        events.last(),
        Some(&AppEvent::Info("[strategies] 共 2 个\nAlpha\nZeta".to_string()))
    );
}
