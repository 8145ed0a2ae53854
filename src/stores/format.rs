use chrono::{DateTime, Utc};
use serde_json::Value;

/// 保留两位小数，0.5 向正无穷进位。
/// 按十进制字符串移位再取整，1.005 得 1.01 而不是 1
pub fn round2(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let shifted: f64 = format!("{}e2", x).parse().unwrap_or(x * 100.0);
    let floor = shifted.floor();
    let rounded = if shifted - floor >= 0.5 { floor + 1.0 } else { floor };
    let r: f64 = format!("{}e-2", rounded).parse().unwrap_or(rounded / 100.0);
    // 避免输出 "-0"
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

/// 从负载中取数值，缺失或非数值时为 0
pub fn num(data: &Value, key: &str) -> f64 {
    data.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// `round2` 后按最短形式输出：12.5、3、-0.25
pub fn fmt2(x: f64) -> String {
    format!("{}", round2(x))
}

/// 原样展示 JSON 值：字符串去引号，null 为空串
pub fn display_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn to_datetime(timestamp_ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
}

/// 毫秒时间戳 -> `YYYY-MM-DD`
pub fn timestamp_to_date(timestamp_ms: i64) -> String {
    to_datetime(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// 毫秒时间戳 -> `YYYY-MM-DD HH:MM:SS`
pub fn timestamp_to_time(timestamp_ms: i64) -> String {
    to_datetime(timestamp_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// 秒数 -> "2 days, 3 hours, 4 minutes"
///
/// 不足一分钟时输出秒数。
pub fn seconds_to_human_readable(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0 seconds".to_string();
    }
    let total = seconds.round() as u64;
    if total < 60 {
        return plural(total, "second");
    }

    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(plural(days, "day"));
    }
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(plural(minutes, "minute"));
    }
    parts.join(", ")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}
