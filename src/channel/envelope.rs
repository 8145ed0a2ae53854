use super::ChannelError;
use base64::Engine;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;

/// 推送通道上收到的一条消息
///
/// `id` 是会话 id（或请求 id），`data` 为事件负载。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub is_compressed: bool,
}

impl PushMessage {
    pub fn new(event: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            id: id.into(),
            data,
            is_compressed: false,
        }
    }
}

/// 解析一帧文本，必要时先解压 `data`
pub fn decode_frame(text: &str) -> Result<PushMessage, ChannelError> {
    let mut msg: PushMessage =
        serde_json::from_str(text).map_err(|e| ChannelError::Decode(e.to_string()))?;

    if msg.is_compressed {
        if let Value::String(ref encoded) = msg.data {
            msg.data = decompress_data(encoded)?;
            msg.is_compressed = false;
        }
    }
    Ok(msg)
}

/// base64 -> gzip -> JSON
pub fn decompress_data(encoded: &str) -> Result<Value, ChannelError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ChannelError::Decompress(format!("base64: {}", e)))?;

    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut raw = String::new();
    decoder
        .read_to_string(&mut raw)
        .map_err(|e| ChannelError::Decompress(format!("gzip: {}", e)))?;

    serde_json::from_str(&raw).map_err(|e| ChannelError::Decompress(format!("json: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    fn gzip_b64(value: &Value) -> String {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(value.to_string().as_bytes()).unwrap();
        let bytes = enc.finish().unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn plain_frame_is_parsed() {
        let msg = decode_frame(r#"{"event":"backtest.progressbar","id":"s1","data":{"current":40,"estimated_remaining_seconds":12}}"#).unwrap();
        assert_eq!(msg.event, "backtest.progressbar");
        assert_eq!(msg.id, "s1");
        assert_eq!(msg.data["current"], 40);
        assert!(!msg.is_compressed);
    }

    #[test]
    fn compressed_frame_is_inflated_before_dispatch() {
        let payload = json!([{"time": 1, "value": 100.5}]);
        let frame = json!({
            "event": "backtest.equity_curve",
            "id": "s1",
            "data": gzip_b64(&payload),
            "is_compressed": true
        });
        let msg = decode_frame(&frame.to_string()).unwrap();
        assert_eq!(msg.data, payload);
        assert!(!msg.is_compressed);
    }

    #[test]
    fn compressed_flag_with_non_string_data_is_left_alone() {
        let frame = json!({"event": "x", "id": "s", "data": {"a": 1}, "is_compressed": true});
        let msg = decode_frame(&frame.to_string()).unwrap();
        assert_eq!(msg.data, json!({"a": 1}));
    }

    #[test]
    fn broken_compressed_payload_is_an_error() {
        let frame = json!({"event": "x", "id": "s", "data": "not-base64!!", "is_compressed": true});
        let err = decode_frame(&frame.to_string()).unwrap_err();
        assert!(matches!(err, ChannelError::Decompress(_)));

        // 合法 base64 但不是 gzip
        let frame = json!({
            "event": "x",
            "id": "s",
            "data": base64::engine::general_purpose::STANDARD.encode("plain"),
            "is_compressed": true
        });
        assert!(matches!(
            decode_frame(&frame.to_string()),
            Err(ChannelError::Decompress(_))
        ));
    }

    #[test]
    fn garbage_frame_is_a_decode_error() {
        assert!(matches!(decode_frame("{oops"), Err(ChannelError::Decode(_))));
    }
}
