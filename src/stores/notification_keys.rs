use super::exchange_keys::parse_keys;
use super::StoreContext;
use crate::notifier::Notifier;
use crate::session::{
    ApiTransport, URL_NOTIFICATION_API_KEYS, URL_NOTIFICATION_API_KEYS_DELETE,
    URL_NOTIFICATION_API_KEYS_STORE,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const SUPPORTED_DRIVERS: [&str; 2] = ["telegram", "discord"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationApiKey {
    pub id: String,
    pub name: String,
    pub driver: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// 通知渠道（telegram / discord）的 key 管理
pub struct NotificationKeysStore {
    api: Arc<dyn ApiTransport>,
    notifier: Notifier,
    pub api_keys: Vec<NotificationApiKey>,
    pub loading: bool,
}

impl NotificationKeysStore {
    pub fn new(ctx: &StoreContext) -> Self {
        Self {
            api: ctx.api.clone(),
            notifier: ctx.notifier.clone(),
            api_keys: Vec::new(),
            loading: false,
        }
    }

    pub fn supported_drivers(&self) -> &'static [&'static str] {
        &SUPPORTED_DRIVERS
    }

    pub fn keys_by_driver(&self, driver: &str) -> Vec<&NotificationApiKey> {
        self.api_keys.iter().filter(|k| k.driver == driver).collect()
    }

    pub async fn fetch_api_keys(&mut self) {
        self.loading = true;
        let result = self.api.get(URL_NOTIFICATION_API_KEYS).await;
        self.loading = false;
        match result {
            Ok(resp) => self.api_keys = parse_keys(&resp),
            Err(e) => self
                .notifier
                .error(format!("Failed to fetch notification keys: {}", e)),
        }
    }

    pub async fn store_api_key(&mut self, key_data: Value) -> bool {
        match self.api.post(URL_NOTIFICATION_API_KEYS_STORE, key_data).await {
            Ok(_) => {
                self.notifier.success("Notification key saved successfully");
                self.fetch_api_keys().await;
                true
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to save notification key: {}", e));
                false
            }
        }
    }

    pub async fn delete_api_key(&mut self, id: &str) -> bool {
        match self
            .api
            .post(URL_NOTIFICATION_API_KEYS_DELETE, json!({ "id": id }))
            .await
        {
            Ok(_) => {
                self.api_keys.retain(|k| k.id != id);
                self.notifier
                    .success("Notification key deleted successfully");
                true
            }
            Err(e) => {
                self.notifier
                    .error(format!("Failed to delete notification key: {}", e));
                false
            }
        }
    }
}
