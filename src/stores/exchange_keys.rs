use super::StoreContext;
use crate::notifier::Notifier;
use crate::session::{
    ApiTransport, URL_EXCHANGE_API_KEYS, URL_EXCHANGE_API_KEYS_DELETE,
    URL_EXCHANGE_API_KEYS_STORE, URL_EXCHANGE_SUPPORTED_SYMBOLS,
};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeApiKey {
    pub id: String,
    pub name: String,
    pub exchange: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// 交易所 API key 管理
pub struct ExchangeKeysStore {
    api: Arc<dyn ApiTransport>,
    notifier: Notifier,
    pub api_keys: Vec<ExchangeApiKey>,
    pub supported_symbols: HashMap<String, Vec<String>>,
    pub loading: bool,
}

impl ExchangeKeysStore {
    pub fn new(ctx: &StoreContext) -> Self {
        Self {
            api: ctx.api.clone(),
            notifier: ctx.notifier.clone(),
            api_keys: Vec::new(),
            supported_symbols: HashMap::new(),
            loading: false,
        }
    }

    pub fn keys_by_exchange(&self, exchange: &str) -> Vec<&ExchangeApiKey> {
        self.api_keys
            .iter()
            .filter(|k| k.exchange == exchange)
            .collect()
    }

    /// 去重后的交易所列表
    pub fn exchanges(&self) -> Vec<String> {
        self.api_keys
            .iter()
            .map(|k| k.exchange.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub async fn fetch_api_keys(&mut self) {
        self.loading = true;
        let result = self.api.get(URL_EXCHANGE_API_KEYS).await;
        self.loading = false;
        match result {
            Ok(resp) => self.api_keys = parse_keys(&resp),
            Err(e) => self
                .notifier
                .error(format!("Failed to fetch API keys: {}", e)),
        }
    }

    /// 保存成功后重新拉取列表
    pub async fn store_api_key(&mut self, key_data: Value) -> bool {
        match self.api.post(URL_EXCHANGE_API_KEYS_STORE, key_data).await {
            Ok(_) => {
                self.notifier.success("API key saved successfully");
                self.fetch_api_keys().await;
                true
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to save API key: {}", e));
                false
            }
        }
    }

    pub async fn delete_api_key(&mut self, id: &str) -> bool {
        match self
            .api
            .post(URL_EXCHANGE_API_KEYS_DELETE, json!({ "id": id }))
            .await
        {
            Ok(_) => {
                self.api_keys.retain(|k| k.id != id);
                self.notifier.success("API key deleted successfully");
                true
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to delete API key: {}", e));
                false
            }
        }
    }

    pub async fn fetch_supported_symbols(&mut self, exchange: &str) -> Vec<String> {
        match self
            .api
            .post(URL_EXCHANGE_SUPPORTED_SYMBOLS, json!({ "exchange": exchange }))
            .await
        {
            Ok(resp) => {
                let symbols: Vec<String> = resp
                    .get("symbols")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                self.supported_symbols
                    .insert(exchange.to_string(), symbols.clone());
                symbols
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to fetch symbols: {}", e));
                Vec::new()
            }
        }
    }
}

/// `{api_keys: [...]}`，`id` 可能是数字
pub(crate) fn parse_keys<T: serde::de::DeserializeOwned>(resp: &Value) -> Vec<T> {
    let Some(items) = resp.get("api_keys").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let mut item = item.clone();
            if let Some(id) = item.get("id").filter(|v| v.is_number()).map(Value::to_string) {
                item["id"] = Value::String(id);
            }
            serde_json::from_value(item)
                .map_err(|e| warn!("跳过无法解析的 API key: {}", e))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_with_numeric_ids() {
        let keys: Vec<ExchangeApiKey> = parse_keys(&json!({"api_keys": [
            {"id": 7, "name": "main", "exchange": "Binance", "created_at": 1},
            {"id": "b", "name": "alt", "exchange": "Bybit"}
        ]}));
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].id, "7");
        assert_eq!(keys[0].extra.get("created_at"), Some(&json!(1)));
    }

    #[test]
    fn missing_list_is_empty() {
        let keys: Vec<ExchangeApiKey> = parse_keys(&json!({}));
        assert!(keys.is_empty());
    }
}
