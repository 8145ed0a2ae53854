use crate::stores::{BacktestEvent, CandlesEvent, LiveEvent, MonteCarloEvent, OptimizationEvent};
use std::collections::HashMap;

/// 推送事件最终落到哪个 store 的哪个处理函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Backtest(BacktestEvent),
    Candles(CandlesEvent),
    Live(LiveEvent),
    Optimization(OptimizationEvent),
    MonteCarlo(MonteCarloEvent),
}

const BACKTEST_EVENTS: &[(&str, BacktestEvent)] = &[
    ("candles_info", BacktestEvent::CandlesInfo),
    ("routes_info", BacktestEvent::RoutesInfo),
    ("progressbar", BacktestEvent::Progressbar),
    ("metrics", BacktestEvent::Metrics),
    ("hyperparameters", BacktestEvent::Hyperparameters),
    ("info_log", BacktestEvent::InfoLog),
    ("equity_curve", BacktestEvent::EquityCurve),
    ("exception", BacktestEvent::Exception),
    ("general_info", BacktestEvent::GeneralInfo),
    ("termination", BacktestEvent::Termination),
    ("alert", BacktestEvent::Alert),
    ("trades", BacktestEvent::Trades),
];

const CANDLES_EVENTS: &[(&str, CandlesEvent)] = &[
    ("progressbar", CandlesEvent::Progressbar),
    ("alert", CandlesEvent::Alert),
    ("exception", CandlesEvent::Exception),
    ("termination", CandlesEvent::Termination),
];

const LIVE_EVENTS: &[(&str, LiveEvent)] = &[
    ("progressbar", LiveEvent::Progressbar),
    ("positions", LiveEvent::Positions),
    ("orders", LiveEvent::Orders),
    ("general_info", LiveEvent::GeneralInfo),
    ("watch_list", LiveEvent::WatchList),
    ("current_candles", LiveEvent::CurrentCandles),
    ("info_log", LiveEvent::InfoLog),
    ("error_log", LiveEvent::ErrorLog),
    ("exception", LiveEvent::Exception),
    ("unexpectedTermination", LiveEvent::UnexpectedTermination),
    ("termination", LiveEvent::Termination),
];

const OPTIMIZATION_EVENTS: &[(&str, OptimizationEvent)] = &[
    ("progressbar", OptimizationEvent::Progressbar),
    ("general_info", OptimizationEvent::GeneralInfo),
    ("metrics", OptimizationEvent::Metrics),
    ("exception", OptimizationEvent::Exception),
    ("termination", OptimizationEvent::Termination),
    ("alert", OptimizationEvent::Alert),
    ("best_candidates", OptimizationEvent::BestCandidates),
];

const MONTE_CARLO_EVENTS: &[(&str, MonteCarloEvent)] = &[
    ("progressbar", MonteCarloEvent::Progressbar),
    ("info_log", MonteCarloEvent::InfoLog),
    ("routes_info", MonteCarloEvent::RoutesInfo),
    ("general_info", MonteCarloEvent::GeneralInfo),
    ("metrics", MonteCarloEvent::Metrics),
    ("equity_curves", MonteCarloEvent::EquityCurves),
    ("scenarios", MonteCarloEvent::Scenarios),
    ("exception", MonteCarloEvent::Exception),
    ("termination", MonteCarloEvent::Termination),
    ("alert", MonteCarloEvent::Alert),
];

/// `papertrade.*` 和 `livetrade.*` 走同一组处理函数
const LIVE_PREFIXES: [&str; 2] = ["papertrade", "livetrade"];

/// 事件名 -> 处理函数列表，构造后只读
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: HashMap<String, Vec<Handler>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        let mut table = Self {
            routes: HashMap::new(),
        };

        for (name, ev) in BACKTEST_EVENTS {
            table.register("backtest", name, Handler::Backtest(*ev));
        }
        for (name, ev) in CANDLES_EVENTS {
            table.register("candles", name, Handler::Candles(*ev));
        }
        for prefix in LIVE_PREFIXES {
            for (name, ev) in LIVE_EVENTS {
                table.register(prefix, name, Handler::Live(*ev));
            }
        }
        for (name, ev) in OPTIMIZATION_EVENTS {
            table.register("optimize", name, Handler::Optimization(*ev));
        }
        for (name, ev) in MONTE_CARLO_EVENTS {
            table.register("monte_carlo", name, Handler::MonteCarlo(*ev));
        }

        table
    }

    fn register(&mut self, domain: &str, event: &str, handler: Handler) {
        self.routes
            .entry(format!("{}.{}", domain, event))
            .or_default()
            .push(handler);
    }

    /// 未注册的事件返回 `None`，由调用方静默忽略
    pub fn handlers(&self, event: &str) -> Option<&[Handler]> {
        self.routes.get(event).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_is_complete() {
        let table = RoutingTable::new();
        let expected = BACKTEST_EVENTS.len()
            + CANDLES_EVENTS.len()
            + 2 * LIVE_EVENTS.len()
            + OPTIMIZATION_EVENTS.len()
            + MONTE_CARLO_EVENTS.len();
        assert_eq!(table.len(), expected);
        assert_eq!(table.len(), 12 + 4 + 22 + 7 + 10);
    }

    #[test]
    fn live_prefixes_alias_same_handlers() {
        let table = RoutingTable::new();
        for name in ["progressbar", "error_log", "unexpectedTermination", "termination"] {
            let paper = table.handlers(&format!("papertrade.{}", name));
            let live = table.handlers(&format!("livetrade.{}", name));
            assert!(paper.is_some(), "papertrade.{} missing", name);
            assert_eq!(paper, live);
        }
    }

    #[test]
    fn lookup_is_exact() {
        let table = RoutingTable::new();
        assert_eq!(
            table.handlers("backtest.equity_curve"),
            Some(&[Handler::Backtest(BacktestEvent::EquityCurve)][..])
        );
        assert_eq!(
            table.handlers("optimize.best_candidates"),
            Some(&[Handler::Optimization(OptimizationEvent::BestCandidates)][..])
        );
        assert!(table.handlers("backtest.equity_curves").is_none());
        assert!(table.handlers("monte_carlo.trades").is_none());
        assert!(table.handlers("").is_none());
    }

    #[test]
    fn every_name_has_domain_prefix() {
        let table = RoutingTable::new();
        let domains = ["backtest.", "candles.", "papertrade.", "livetrade.", "optimize.", "monte_carlo."];
        for name in table.event_names() {
            assert!(domains.iter().any(|d| name.starts_with(d)), "{}", name);
        }
    }
}
