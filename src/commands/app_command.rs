use crate::stores::Route;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 控制台命令作用的业务领域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Backtest,
    MonteCarlo,
    Optimization,
    Live,
    Candles,
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "backtest" | "bt" => Ok(Domain::Backtest),
            "monte-carlo" | "monte_carlo" | "mc" => Ok(Domain::MonteCarlo),
            "optimization" | "optimize" | "opt" => Ok(Domain::Optimization),
            "live" | "papertrade" | "livetrade" => Ok(Domain::Live),
            "candles" | "import" => Ok(Domain::Candles),
            other => Err(format!("未知领域: {}", other)),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Domain::Backtest => "backtest",
            Domain::MonteCarlo => "monte-carlo",
            Domain::Optimization => "optimization",
            Domain::Live => "live",
            Domain::Candles => "candles",
        };
        write!(f, "{}", name)
    }
}

/// API key 的归属：交易所或通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Exchange,
    Notification,
}

impl FromStr for KeyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exchange" | "ex" => Ok(KeyKind::Exchange),
            "notification" | "notify" => Ok(KeyKind::Notification),
            other => Err(format!("未知 key 类型: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Tabs {
        domain: Domain,
    },
    Add {
        domain: Domain,
    },
    Start {
        domain: Domain,
        tab: u32,
    },
    Clone {
        domain: Domain,
        tab: u32,
    },
    Cancel {
        domain: Domain,
        tab: u32,
    },
    Rerun {
        domain: Domain,
        tab: u32,
    },
    Route {
        domain: Domain,
        tab: u32,
        route: Route,
    },
    Dates {
        domain: Domain,
        tab: u32,
        start: String,
        finish: Option<String>,
    },
    Show {
        domain: Domain,
        tab: u32,
    },
    History {
        domain: Domain,
    },
    Purge {
        domain: Domain,
    },
    Remove {
        domain: Domain,
        id: String,
    },
    Strategies,
    ImportStrategy {
        slug: String,
        name: String,
    },
    DeleteStrategy {
        name: String,
    },
    Keys,
    StoreKey {
        kind: KeyKind,
        data: Value,
    },
    DeleteKey {
        kind: KeyKind,
        id: String,
    },
    Help,
    Quit,
    Unknown(String),
}

pub const HELP: &str = "可用命令: tabs <domain> | add <domain> | start <domain> <tab> | clone <domain> <tab> | cancel <domain> <tab> | rerun <domain> <tab> | route <domain> <tab> <exchange> <symbol> <timeframe> [strategy] | dates <domain> <tab> <start> [finish] | show <domain> <tab> | history <domain> | purge <domain> | remove <domain> <id> | strategies | import-strategy <slug> <name> | delete-strategy <name> | keys | store-key <exchange|notification> <json> | delete-key <exchange|notification> <id> | help | quit  (domain: backtest | mc | opt | live | candles)";

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }
        if let Some(cmd) = parse_aux(s, &parts) {
            return Ok(cmd);
        }

        let domain = match parts.get(1).map(|d| d.parse::<Domain>()) {
            Some(Ok(d)) => Some(d),
            Some(Err(e)) => return Ok(AppCommand::Unknown(e)),
            None => None,
        };
        let tab = parts.get(2).and_then(|t| t.parse::<u32>().ok());

        let cmd = match (parts[0], domain, tab) {
            ("help" | "h", _, _) => AppCommand::Help,
            ("quit" | "q" | "exit", _, _) => AppCommand::Quit,

            ("tabs", Some(domain), _) => AppCommand::Tabs { domain },
            ("add", Some(domain), _) => AppCommand::Add { domain },
            ("history", Some(domain), _) => AppCommand::History { domain },
            ("purge", Some(domain), _) => AppCommand::Purge { domain },

            ("start", Some(domain), Some(tab)) => AppCommand::Start { domain, tab },
            ("clone", Some(domain), Some(tab)) => AppCommand::Clone { domain, tab },
            ("cancel", Some(domain), Some(tab)) => AppCommand::Cancel { domain, tab },
            ("rerun", Some(domain), Some(tab)) => AppCommand::Rerun { domain, tab },
            ("show", Some(domain), Some(tab)) => AppCommand::Show { domain, tab },

            ("remove", Some(domain), _) => match parts.get(2) {
                Some(id) => AppCommand::Remove {
                    domain,
                    id: id.to_string(),
                },
                None => AppCommand::Unknown("用法: remove <domain> <id>".to_string()),
            },
            ("route", Some(domain), Some(tab)) => {
                if parts.len() < 6 {
                    AppCommand::Unknown(
                        "用法: route <domain> <tab> <exchange> <symbol> <timeframe> [strategy]"
                            .to_string(),
                    )
                } else {
                    // 交易所名称可能带空格，用下划线代替
                    let exchange = parts[3].replace('_', " ");
                    let strategy = parts.get(6).copied().unwrap_or_default();
                    AppCommand::Route {
                        domain,
                        tab,
                        route: Route::new(exchange, parts[4], parts[5], strategy),
                    }
                }
            }
            ("dates", Some(domain), Some(tab)) => match parts.get(3) {
                Some(start) => AppCommand::Dates {
                    domain,
                    tab,
                    start: start.to_string(),
                    finish: parts.get(4).map(|s| s.to_string()),
                },
                None => AppCommand::Unknown("用法: dates <domain> <tab> <start> [finish]".to_string()),
            },

            (
                "tabs" | "add" | "history" | "purge" | "start" | "clone" | "cancel" | "rerun"
                | "show" | "remove" | "route" | "dates",
                _,
                _,
            ) => AppCommand::Unknown(format!("参数不足: {}，输入 help 查看用法", parts[0])),
            (other, _, _) => AppCommand::Unknown(format!("未知命令: {}", other)),
        };
        Ok(cmd)
    }
}

/// 策略与 API key 相关的命令，不带 domain
fn parse_aux(line: &str, parts: &[&str]) -> Option<AppCommand> {
    let usage = |u: &str| AppCommand::Unknown(format!("用法: {}", u));
    let cmd = match parts[0] {
        "strategies" => AppCommand::Strategies,
        "keys" => AppCommand::Keys,
        "import-strategy" => match (parts.get(1), parts.get(2)) {
            (Some(slug), Some(name)) => AppCommand::ImportStrategy {
                slug: slug.to_string(),
                name: name.to_string(),
            },
            _ => usage("import-strategy <slug> <name>"),
        },
        "delete-strategy" => match parts.get(1) {
            Some(name) => AppCommand::DeleteStrategy {
                name: name.to_string(),
            },
            None => usage("delete-strategy <name>"),
        },
        "store-key" => {
            let kind = match parts.get(1).map(|k| k.parse::<KeyKind>()) {
                Some(Ok(kind)) => kind,
                Some(Err(e)) => return Some(AppCommand::Unknown(e)),
                None => return Some(usage("store-key <exchange|notification> <json>")),
            };
            // JSON 里可能有空格，取第二个词之后的整段
            let json = line
                .trim_start()
                .strip_prefix(parts[0])
                .and_then(|rest| rest.trim_start().strip_prefix(parts[1]))
                .unwrap_or_default();
            match serde_json::from_str::<Value>(json) {
                Ok(data) if data.is_object() => AppCommand::StoreKey { kind, data },
                _ => usage("store-key <exchange|notification> <json>"),
            }
        }
        "delete-key" => match (parts.get(1).map(|k| k.parse::<KeyKind>()), parts.get(2)) {
            (Some(Ok(kind)), Some(id)) => AppCommand::DeleteKey {
                kind,
                id: id.to_string(),
            },
            (Some(Err(e)), _) => AppCommand::Unknown(e),
            _ => usage("delete-key <exchange|notification> <id>"),
        },
        _ => return None,
    };
    Some(cmd)
}
