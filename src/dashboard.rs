use crate::channel::PushMessage;
use crate::commands::{AppCommand, Domain, KeyKind, HELP};
use crate::events::{Handler, RoutingTable};
use crate::notifier::Notifier;
use crate::stores::common::{Exception, JobResults, Progress, Route};
use crate::stores::format::fmt2;
use crate::stores::sessions::{HistoryKind, SessionSummary};
use crate::stores::{
    BacktestStore, CandlesStore, ExchangeKeysStore, LiveStore, MetricRow, MonteCarloStore,
    NotificationKeysStore, OptimizationStore, SessionsStore, StoreContext, StrategyStore, TabSet,
};
use log::{debug, info};
use tokio::sync::mpsc;

/// 持有全部 store 与路由表；推送消息与控制台命令都在同一个任务里串行处理
pub struct Dashboard {
    routing: RoutingTable,
    notifier: Notifier,
    pub backtest: BacktestStore,
    pub monte_carlo: MonteCarloStore,
    pub optimization: OptimizationStore,
    pub live: LiveStore,
    pub candles: CandlesStore,
    pub sessions: SessionsStore,
    pub exchange_keys: ExchangeKeysStore,
    pub notification_keys: NotificationKeysStore,
    pub strategy: StrategyStore,
}

impl Dashboard {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            routing: RoutingTable::new(),
            notifier: ctx.notifier.clone(),
            sessions: SessionsStore::new(&ctx),
            exchange_keys: ExchangeKeysStore::new(&ctx),
            notification_keys: NotificationKeysStore::new(&ctx),
            strategy: StrategyStore::new(&ctx),
            backtest: BacktestStore::new(ctx.clone()),
            monte_carlo: MonteCarloStore::new(ctx.clone()),
            optimization: OptimizationStore::new(ctx.clone()),
            live: LiveStore::new(ctx.clone()),
            candles: CandlesStore::new(ctx),
        }
    }

    /// 依次执行事件注册的全部处理函数；处理函数不等待网络
    pub fn dispatch(&mut self, msg: PushMessage) {
        let Some(handlers) = self.routing.handlers(&msg.event) else {
            debug!("未注册的事件: {}", msg.event);
            return;
        };

        for handler in handlers {
            let data = msg.data.clone();
            match *handler {
                Handler::Backtest(ev) => self.backtest.handle(ev, &msg.id, data),
                Handler::MonteCarlo(ev) => self.monte_carlo.handle(ev, &msg.id, data),
                Handler::Optimization(ev) => self.optimization.handle(ev, &msg.id, data),
                Handler::Live(ev) => self.live.handle(ev, &msg.id, data),
                Handler::Candles(ev) => self.candles.handle(ev, &msg.id, data),
            }
        }
    }

    /// 主循环：推送消息与控制台命令共用一个任务，处理严格串行。
    /// 图表数据等后台请求的结果也回到这里写入。退出时交还自身
    pub async fn run(
        mut self,
        mut push_rx: mpsc::UnboundedReceiver<PushMessage>,
        mut cmd_rx: mpsc::UnboundedReceiver<AppCommand>,
    ) -> Self {
        info!("dashboard 主循环启动");
        let mut chart_rx = self.backtest.take_chart_replies();
        loop {
            tokio::select! {
                Some(msg) = push_rx.recv() => self.dispatch(msg),
                Some(reply) = next_reply(&mut chart_rx) => self.backtest.apply_chart_data(reply),
                cmd = cmd_rx.recv() => match cmd {
                    Some(AppCommand::Quit) | None => break,
                    Some(cmd) => self.execute(cmd).await,
                },
            }
        }
        info!("dashboard 主循环退出");
        self
    }

    pub async fn execute(&mut self, cmd: AppCommand) {
        match cmd {
            AppCommand::Tabs { domain } => {
                let lines = match domain {
                    Domain::Backtest => tab_lines(&self.backtest.tabs),
                    Domain::MonteCarlo => tab_lines(&self.monte_carlo.tabs),
                    Domain::Optimization => tab_lines(&self.optimization.tabs),
                    Domain::Live => tab_lines(&self.live.tabs),
                    Domain::Candles => tab_lines(&self.candles.tabs),
                };
                self.notifier.info(format!("[{}]\n{}", domain, lines.join("\n")));
            }
            AppCommand::Add { domain } => {
                let id = match domain {
                    Domain::Backtest => self.backtest.add_tab(),
                    Domain::MonteCarlo => self.monte_carlo.add_tab(),
                    Domain::Optimization => self.optimization.add_tab(),
                    Domain::Live => self.live.add_tab(),
                    Domain::Candles => self.candles.add_tab(),
                };
                self.notifier.info(format!("[{}] 新建 Tab {}", domain, id));
            }
            AppCommand::Start { domain, tab } => {
                if !self.has_tab(domain, tab) {
                    self.notifier.error(format!("[{}] Tab {} 不存在", domain, tab));
                    return;
                }
                match domain {
                    Domain::Backtest => self.backtest.start(tab).await,
                    Domain::MonteCarlo => self.monte_carlo.start(tab).await,
                    Domain::Optimization => self.optimization.start(tab).await,
                    Domain::Live => self.live.start(tab).await,
                    Domain::Candles => self.candles.start(tab).await,
                }
            }
            AppCommand::Clone { domain, tab } => {
                let id = match domain {
                    Domain::Backtest => self.backtest.start_in_new_tab(tab).await,
                    Domain::MonteCarlo => self.monte_carlo.start_in_new_tab(tab).await,
                    Domain::Optimization => self.optimization.start_in_new_tab(tab).await,
                    Domain::Live => self.live.start_in_new_tab(tab).await,
                    Domain::Candles => self.candles.start_in_new_tab(tab).await,
                };
                match id {
                    Some(id) => self
                        .notifier
                        .info(format!("[{}] Tab {} 复制为 Tab {} 并启动", domain, tab, id)),
                    None => self.notifier.error(format!("[{}] Tab {} 不存在", domain, tab)),
                }
            }
            AppCommand::Cancel { domain, tab } => match domain {
                Domain::Backtest => self.backtest.cancel(tab).await,
                Domain::MonteCarlo => self.monte_carlo.cancel(tab).await,
                Domain::Optimization => self.optimization.cancel(tab).await,
                Domain::Live => self.live.cancel(tab).await,
                Domain::Candles => self.candles.cancel(tab).await,
            },
            AppCommand::Rerun { domain, tab } => match domain {
                Domain::Backtest => self.backtest.rerun(tab).await,
                Domain::MonteCarlo => self.monte_carlo.rerun(tab).await,
                Domain::Optimization => self.optimization.rerun(tab).await,
                Domain::Live => self.live.rerun(tab).await,
                Domain::Candles => self.candles.rerun(tab).await,
            },
            AppCommand::Route { domain, tab, route } => self.set_route(domain, tab, route),
            AppCommand::Dates {
                domain,
                tab,
                start,
                finish,
            } => self.set_dates(domain, tab, start, finish),
            AppCommand::Show { domain, tab } => match self.describe(domain, tab) {
                Some(text) => self.notifier.info(text),
                None => self.notifier.error(format!("[{}] Tab {} 不存在", domain, tab)),
            },
            AppCommand::History { domain } => {
                let Some(kind) = history_kind(domain) else {
                    self.notifier.error(format!("[{}] 没有历史记录", domain));
                    return;
                };
                self.sessions.fetch_sessions(kind).await;
                let rows: Vec<&SessionSummary> = match kind {
                    HistoryKind::Backtest => self.sessions.filtered_backtest_sessions(),
                    HistoryKind::Optimization => self.sessions.filtered_optimization_sessions(),
                    HistoryKind::MonteCarlo => self.sessions.filtered_monte_carlo_sessions(),
                    HistoryKind::Live => self.sessions.live_sessions.iter().collect(),
                };
                let text = rows
                    .iter()
                    .map(|s| history_line(s))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.notifier.info(format!(
                    "[{}] 共 {} 条\n{}",
                    domain, self.sessions.pagination.total, text
                ));
            }
            AppCommand::Purge { domain } => match history_kind(domain) {
                Some(kind) => self.sessions.purge_sessions(kind).await,
                None => self.notifier.error(format!("[{}] 没有历史记录", domain)),
            },
            AppCommand::Remove { domain, id } => match history_kind(domain) {
                Some(kind) => self.sessions.remove_session(kind, &id).await,
                None => self.notifier.error(format!("[{}] 没有历史记录", domain)),
            },
            AppCommand::Strategies => {
                self.strategy.fetch_strategies().await;
                let names = self.strategy.sorted_strategies();
                let text = names
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                self.notifier
                    .info(format!("[strategies] 共 {} 个\n{}", names.len(), text));
            }
            AppCommand::ImportStrategy { slug, name } => {
                self.strategy.import_strategy(&slug, &name).await;
            }
            AppCommand::DeleteStrategy { name } => {
                self.strategy.delete_strategy(&name).await;
            }
            AppCommand::Keys => {
                self.exchange_keys.fetch_api_keys().await;
                self.notification_keys.fetch_api_keys().await;
                let mut lines = vec!["[exchange]".to_string()];
                lines.extend(
                    self.exchange_keys
                        .api_keys
                        .iter()
                        .map(|k| format!("  {}  {}  {}", k.id, k.name, k.exchange)),
                );
                lines.push("[notification]".to_string());
                lines.extend(
                    self.notification_keys
                        .api_keys
                        .iter()
                        .map(|k| format!("  {}  {}  {}", k.id, k.name, k.driver)),
                );
                self.notifier.info(lines.join("\n"));
            }
            AppCommand::StoreKey { kind, data } => {
                match kind {
                    KeyKind::Exchange => self.exchange_keys.store_api_key(data).await,
                    KeyKind::Notification => self.notification_keys.store_api_key(data).await,
                };
            }
            AppCommand::DeleteKey { kind, id } => {
                match kind {
                    KeyKind::Exchange => self.exchange_keys.delete_api_key(&id).await,
                    KeyKind::Notification => self.notification_keys.delete_api_key(&id).await,
                };
            }
            AppCommand::Help => self.notifier.info(HELP),
            AppCommand::Quit => {}
            AppCommand::Unknown(msg) => {
                if !msg.is_empty() {
                    self.notifier.error(msg);
                }
            }
        }
    }

    fn has_tab(&self, domain: Domain, tab: u32) -> bool {
        match domain {
            Domain::Backtest => self.backtest.tabs.get(tab).is_some(),
            Domain::MonteCarlo => self.monte_carlo.tabs.get(tab).is_some(),
            Domain::Optimization => self.optimization.tabs.get(tab).is_some(),
            Domain::Live => self.live.tabs.get(tab).is_some(),
            Domain::Candles => self.candles.tabs.get(tab).is_some(),
        }
    }

    fn set_route(&mut self, domain: Domain, tab: u32, route: Route) {
        let found = match domain {
            Domain::Backtest => self
                .backtest
                .tabs
                .get_mut(tab)
                .map(|t| t.form.routes = vec![route]),
            Domain::MonteCarlo => self
                .monte_carlo
                .tabs
                .get_mut(tab)
                .map(|t| t.form.routes = vec![route]),
            Domain::Optimization => self
                .optimization
                .tabs
                .get_mut(tab)
                .map(|t| t.form.routes = vec![route]),
            Domain::Live => self
                .live
                .tabs
                .get_mut(tab)
                .map(|t| t.form.routes = vec![route]),
            Domain::Candles => self.candles.tabs.get_mut(tab).map(|t| {
                t.form.exchange = route.exchange;
                t.form.symbol = route.symbol;
            }),
        };
        if found.is_none() {
            self.notifier.error(format!("[{}] Tab {} 不存在", domain, tab));
        }
    }

    fn set_dates(&mut self, domain: Domain, tab: u32, start: String, finish: Option<String>) {
        fn apply(start_date: &mut String, finish_date: &mut String, start: String, finish: Option<String>) {
            *start_date = start;
            if let Some(finish) = finish {
                *finish_date = finish;
            }
        }

        let found = match domain {
            Domain::Backtest => self.backtest.tabs.get_mut(tab).map(|t| {
                apply(&mut t.form.start_date, &mut t.form.finish_date, start, finish)
            }),
            Domain::MonteCarlo => self.monte_carlo.tabs.get_mut(tab).map(|t| {
                apply(&mut t.form.start_date, &mut t.form.finish_date, start, finish)
            }),
            Domain::Optimization => self.optimization.tabs.get_mut(tab).map(|t| {
                apply(&mut t.form.start_date, &mut t.form.finish_date, start, finish)
            }),
            Domain::Candles => self
                .candles
                .tabs
                .get_mut(tab)
                .map(|t| t.form.start_date = start),
            Domain::Live => {
                self.notifier.error("live 任务没有日期区间");
                return;
            }
        };
        if found.is_none() {
            self.notifier.error(format!("[{}] Tab {} 不存在", domain, tab));
        }
    }

    /// 标签页结果的文本摘要
    pub fn describe(&self, domain: Domain, tab: u32) -> Option<String> {
        let mut out = Vec::new();
        match domain {
            Domain::Backtest => {
                let t = self.backtest.tabs.get(tab)?;
                let r = &t.results;
                out.push(header(&t.name, t.session_id(), r));
                out.push(progress_line(&r.progressbar));
                push_rows(&mut out, &r.info);
                push_rows(&mut out, &r.metrics);
                out.push(format!(
                    "equity points: {}, trades: {}, candles: {}",
                    r.charts.equity_curve.len(),
                    r.trades.len(),
                    r.charts.candles.len()
                ));
                push_exception(&mut out, &r.exception);
                push_alert(&mut out, &r.alert.message);
            }
            Domain::MonteCarlo => {
                let t = self.monte_carlo.tabs.get(tab)?;
                let r = &t.results;
                out.push(header(&t.name, t.session_id(), r));
                out.push(progress_line(&r.progressbar));
                push_rows(&mut out, &r.metrics);
                out.push(format!("equity curves: {}", r.equity_curves.len()));
                push_exception(&mut out, &r.exception);
                push_alert(&mut out, &r.alert.message);
            }
            Domain::Optimization => {
                let t = self.optimization.tabs.get(tab)?;
                let r = &t.results;
                out.push(header(&t.name, t.session_id(), r));
                out.push(progress_line(&r.progressbar));
                push_rows(&mut out, &r.metrics);
                out.push(format!("best candidates: {}", r.best_candidates.len()));
                push_exception(&mut out, &r.exception);
                push_alert(&mut out, &r.alert.message);
            }
            Domain::Live => {
                let t = self.live.tabs.get(tab)?;
                let r = &t.results;
                out.push(header(&t.name, t.session_id(), r));
                out.push(format!(
                    "positions: {}, orders: {}",
                    r.positions.len(),
                    r.orders.len()
                ));
                if !r.error_logs.is_empty() {
                    out.push(r.error_logs.trim_end().to_string());
                }
                push_exception(&mut out, &r.exception);
            }
            Domain::Candles => {
                let t = self.candles.tabs.get(tab)?;
                let r = &t.results;
                out.push(header(&t.name, t.session_id(), r));
                out.push(progress_line(&r.progressbar));
                push_exception(&mut out, &r.exception);
                push_alert(&mut out, &r.alert.message);
            }
        }
        Some(out.join("\n"))
    }
}

/// 接收端已被取走时永远挂起
async fn next_reply<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn history_kind(domain: Domain) -> Option<HistoryKind> {
    match domain {
        Domain::Backtest => Some(HistoryKind::Backtest),
        Domain::MonteCarlo => Some(HistoryKind::MonteCarlo),
        Domain::Optimization => Some(HistoryKind::Optimization),
        Domain::Live => Some(HistoryKind::Live),
        Domain::Candles => None,
    }
}

fn tab_lines<F, R: JobResults>(tabs: &TabSet<F, R>) -> Vec<String> {
    tabs.iter()
        .map(|t| {
            format!(
                "  {} {:?} {}",
                t.name,
                t.status(),
                t.session_id().unwrap_or("-")
            )
        })
        .collect()
}

fn header<R: JobResults>(name: &str, session: Option<&str>, results: &R) -> String {
    format!("{} {:?} session={}", name, results.status(), session.unwrap_or("-"))
}

fn progress_line(p: &Progress) -> String {
    format!(
        "progress: {}% (剩余 {}s)",
        fmt2(p.current),
        fmt2(p.estimated_remaining_seconds)
    )
}

fn push_rows(out: &mut Vec<String>, rows: &[MetricRow]) {
    out.extend(rows.iter().map(|(k, v)| format!("  {:<34}{}", k, v)));
}

fn push_exception(out: &mut Vec<String>, e: &Exception) {
    if e.is_set() {
        out.push(format!("exception: {}", e.error));
    }
}

fn push_alert(out: &mut Vec<String>, message: &str) {
    if !message.is_empty() {
        out.push(format!("alert: {}", message));
    }
}

fn history_line(s: &SessionSummary) -> String {
    format!(
        "  {} {} {} {} {}",
        s.id,
        s.strategy_name.as_deref().unwrap_or("-"),
        s.symbol.as_deref().unwrap_or("-"),
        if s.completed { "completed" } else { "failed" },
        s.created_at
            .map(crate::stores::format::timestamp_to_time)
            .unwrap_or_default()
    )
}
