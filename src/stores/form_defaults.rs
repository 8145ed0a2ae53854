use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// 表单默认值的本地持久化
///
/// 每个表单一个 `<key>.json`。读取时把已保存的字段覆盖到默认值上，
/// 读不到或格式不对时直接用默认值。
#[derive(Debug, Clone, Default)]
pub struct FormDefaults {
    dir: Option<PathBuf>,
}

impl FormDefaults {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// 不落盘，总是返回默认值
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{}.json", key)))
    }

    pub fn load<T>(&self, key: &str, defaults: T) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        let Some(path) = self.path(key) else {
            return defaults;
        };
        let Some(stored) = read_json(&path) else {
            return defaults;
        };

        let Ok(mut merged) = serde_json::to_value(&defaults) else {
            return defaults;
        };
        merge_known_keys(&mut merged, stored);

        match serde_json::from_value(merged) {
            Ok(form) => form,
            Err(e) => {
                warn!("忽略无效的表单缓存 {}: {}", path.display(), e);
                defaults
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, form: &T) {
        let Some(path) = self.path(key) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("无法创建目录 {}: {}", parent.display(), e);
                return;
            }
        }
        match serde_json::to_string_pretty(form) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&path, text) {
                    warn!("无法保存表单 {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("表单序列化失败 {}: {}", key, e),
        }
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// 只覆盖默认值里已有的字段，旧版本遗留的字段直接丢弃
fn merge_known_keys(base: &mut Value, stored: Value) {
    if let (Value::Object(base), Value::Object(stored)) = (base, stored) {
        for (k, v) in stored {
            if let Some(slot) = base.get_mut(&k) {
                *slot = v;
            }
        }
    }
}
