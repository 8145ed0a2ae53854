use super::StoreContext;
use crate::notifier::Notifier;
use crate::session::{
    url_strategy_jesse_trade, url_strategy_jesse_trade_metrics, ApiError, ApiTransport,
    URL_STRATEGY_ALL, URL_STRATEGY_DELETE, URL_STRATEGY_GET, URL_STRATEGY_IMPORT,
    URL_STRATEGY_INDEX, URL_STRATEGY_PERIODS, URL_STRATEGY_SAVE,
};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyInfo {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedStrategy {
    pub name: String,
    pub code: String,
    pub path: String,
}

/// 本地策略 + 策略市场浏览
pub struct StrategyStore {
    api: Arc<dyn ApiTransport>,
    notifier: Notifier,
    pub strategies: Vec<StrategyInfo>,
    pub loading: bool,
    pub selected_strategy: Option<SelectedStrategy>,
    pub strategy_code: String,
    pub periods: Vec<String>,
    pub jesse_trade_slugs: Vec<Value>,
    pub browsing_strategy: Option<Value>,
    pub browsing_metrics: Option<Value>,
}

impl StrategyStore {
    pub fn new(ctx: &StoreContext) -> Self {
        Self {
            api: ctx.api.clone(),
            notifier: ctx.notifier.clone(),
            strategies: Vec::new(),
            loading: false,
            selected_strategy: None,
            strategy_code: String::new(),
            periods: Vec::new(),
            jesse_trade_slugs: Vec::new(),
            browsing_strategy: None,
            browsing_metrics: None,
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sorted_strategies(&self) -> Vec<&StrategyInfo> {
        let mut sorted: Vec<_> = self.strategies.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }

    fn fail(&self, action: &str, e: ApiError) {
        self.notifier.error(format!("Failed to {}: {}", action, e));
    }

    pub async fn fetch_strategies(&mut self) {
        self.loading = true;
        let result = self.api.get(URL_STRATEGY_ALL).await;
        self.loading = false;
        match result {
            Ok(resp) => {
                self.strategies = resp
                    .get("strategies")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
            }
            Err(e) => self.fail("fetch strategies", e),
        }
    }

    pub async fn get_strategy(&mut self, name: &str) -> Option<Value> {
        self.loading = true;
        let result = self.api.post(URL_STRATEGY_GET, json!({ "name": name })).await;
        self.loading = false;
        match result {
            Ok(resp) => {
                let field = |k: &str| {
                    resp.get(k)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let selected = SelectedStrategy {
                    name: name.to_string(),
                    code: field("code"),
                    path: field("path"),
                };
                self.strategy_code = selected.code.clone();
                self.selected_strategy = Some(selected);
                Some(resp)
            }
            Err(e) => {
                self.fail("get strategy", e);
                None
            }
        }
    }

    pub async fn save_strategy(&mut self, name: &str, code: &str) -> bool {
        match self
            .api
            .post(URL_STRATEGY_SAVE, json!({ "name": name, "code": code }))
            .await
        {
            Ok(_) => {
                self.notifier.success("Strategy saved successfully");
                if let Some(selected) = self.selected_strategy.as_mut() {
                    if selected.name == name {
                        selected.code = code.to_string();
                        self.strategy_code = code.to_string();
                    }
                }
                true
            }
            Err(e) => {
                self.fail("save strategy", e);
                false
            }
        }
    }

    pub async fn delete_strategy(&mut self, name: &str) -> bool {
        match self
            .api
            .post(URL_STRATEGY_DELETE, json!({ "name": name }))
            .await
        {
            Ok(_) => {
                self.strategies.retain(|s| s.name != name);
                if self
                    .selected_strategy
                    .as_ref()
                    .is_some_and(|s| s.name == name)
                {
                    self.clear_selection();
                }
                self.notifier.success("Strategy deleted successfully");
                true
            }
            Err(e) => {
                self.fail("delete strategy", e);
                false
            }
        }
    }

    pub async fn fetch_periods(&mut self) -> Vec<String> {
        match self.api.get(URL_STRATEGY_PERIODS).await {
            Ok(resp) => {
                self.periods = resp
                    .get("periods")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                self.periods.clone()
            }
            Err(e) => {
                self.fail("fetch periods", e);
                Vec::new()
            }
        }
    }

    pub async fn fetch_jesse_trade_index(&mut self) -> Vec<Value> {
        self.loading = true;
        let result = self.api.get(URL_STRATEGY_INDEX).await;
        self.loading = false;
        match result {
            Ok(resp) => {
                self.jesse_trade_slugs = resp
                    .get("strategies")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                self.jesse_trade_slugs.clone()
            }
            Err(e) => {
                self.fail("fetch strategy index", e);
                Vec::new()
            }
        }
    }

    pub async fn fetch_jesse_trade_strategy(&mut self, slug: &str) -> Option<Value> {
        self.loading = true;
        let result = self.api.get(&url_strategy_jesse_trade(slug)).await;
        self.loading = false;
        match result {
            Ok(resp) => {
                self.browsing_strategy = Some(resp.clone());
                Some(resp)
            }
            Err(e) => {
                self.fail("fetch strategy", e);
                None
            }
        }
    }

    /// 并非每个策略都有指标，失败时不提示
    pub async fn fetch_jesse_trade_metrics(&mut self, slug: &str) -> Option<Value> {
        match self.api.get(&url_strategy_jesse_trade_metrics(slug)).await {
            Ok(resp) => {
                self.browsing_metrics = Some(resp.clone());
                Some(resp)
            }
            Err(e) => {
                debug!("策略 {} 没有指标: {}", slug, e);
                self.browsing_metrics = None;
                None
            }
        }
    }

    pub async fn import_strategy(&mut self, slug: &str, name: &str) -> bool {
        match self
            .api
            .post(URL_STRATEGY_IMPORT, json!({ "slug": slug, "name": name }))
            .await
        {
            Ok(_) => {
                self.notifier.success("Strategy imported successfully");
                self.fetch_strategies().await;
                true
            }
            Err(e) => {
                self.fail("import strategy", e);
                false
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected_strategy = None;
        self.strategy_code.clear();
    }

    pub fn clear_browsing(&mut self) {
        self.browsing_strategy = None;
        self.browsing_metrics = None;
    }
}
