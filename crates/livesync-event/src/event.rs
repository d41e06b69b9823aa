//! Event / EventKind 実装

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::EventError;
use crate::{CONNECTED, LIFECYCLE_PREFIX};

/// イベント名
///
/// 語彙は開いている（固定 enum ではない）。既知の名前は [`crate::kinds`] を参照。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKind(String);

impl EventKind {
    /// 空でない名前から EventKind を生成する
    pub fn new(name: impl Into<String>) -> Result<Self, EventError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EventError::EmptyKind);
        }
        Ok(EventKind(name))
    }

    /// `__connected` ライフサイクル kind
    pub fn connected() -> Self {
        EventKind(CONNECTED.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// コアが内部生成するライフサイクルイベントか
    pub fn is_lifecycle(&self) -> bool {
        self.0.starts_with(LIFECYCLE_PREFIX)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for EventKind {
    type Error = EventError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        EventKind::new(name)
    }
}

/// 受信済みイベント（不変）
///
/// フィールドは非公開で、生成後に書き換える手段はない。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    kind: EventKind,
    payload: Value,
    received_at_ms: u64,
}

impl Event {
    /// Event を生成する
    ///
    /// # 引数
    /// - `kind`: イベント名
    /// - `payload`: 任意の JSON 値
    /// - `received_at_ms`: 受信時刻（ミリ秒）
    pub fn new(kind: EventKind, payload: Value, received_at_ms: u64) -> Self {
        Event {
            kind,
            payload,
            received_at_ms,
        }
    }

    /// JSON 文字列のペイロードから Event を生成する
    ///
    /// JS ホストは `JSON.stringify(payload)` した文字列を渡す。
    ///
    /// # エラー
    /// - kind が空
    /// - ペイロードが JSON として不正
    pub fn from_json(
        kind: &str,
        payload_json: &str,
        received_at_ms: u64,
    ) -> Result<Self, EventError> {
        let kind = EventKind::new(kind)?;
        let payload = serde_json::from_str(payload_json)?;
        Ok(Event::new(kind, payload, received_at_ms))
    }

    /// `__connected` ライフサイクルイベントを生成する
    ///
    /// # 引数
    /// - `identity`: トランスポートが割り当てた接続識別子
    /// - `connection_id`: 接続世代番号
    /// - `reconnect`: 2 回目以降の接続成功か
    /// - `now_ms`: 接続成功時刻
    pub fn connected(identity: &str, connection_id: u64, reconnect: bool, now_ms: u64) -> Self {
        Event::new(
            EventKind::connected(),
            json!({
                "identity": identity,
                "connectionId": connection_id,
                "reconnect": reconnect,
            }),
            now_ms,
        )
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at_ms(&self) -> u64 {
        self.received_at_ms
    }

    /// `__connected` かつ再接続による発火か
    pub fn is_reconnect(&self) -> bool {
        self.kind.as_str() == CONNECTED
            && self
                .payload
                .get("reconnect")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds;

    #[test]
    fn test_empty_kind_rejected() {
        assert!(matches!(EventKind::new(""), Err(EventError::EmptyKind)));
    }

    #[test]
    fn test_from_json() {
        let ev = Event::from_json(kinds::ORDER_CREATED, r#"{"id":7,"total":12.5}"#, 1000).unwrap();
        assert_eq!(ev.kind().as_str(), "order-created");
        assert_eq!(ev.payload()["id"], 7);
        assert_eq!(ev.received_at_ms(), 1000);
        assert!(!ev.kind().is_lifecycle());
    }

    #[test]
    fn test_from_json_invalid_payload() {
        let result = Event::from_json(kinds::LOW_STOCK_ALERT, "{not json", 0);
        assert!(matches!(result, Err(EventError::InvalidPayload(_))));
    }

    #[test]
    fn test_connected_event() {
        let first = Event::connected("sock-1", 1, false, 500);
        assert!(first.kind().is_lifecycle());
        assert_eq!(first.kind().as_str(), CONNECTED);
        assert_eq!(first.payload()["identity"], "sock-1");
        assert!(!first.is_reconnect());

        let again = Event::connected("sock-2", 2, true, 900);
        assert!(again.is_reconnect());
        assert_eq!(again.payload()["connectionId"], 2);
    }

    #[test]
    fn test_serialize_camel_case() {
        let ev = Event::new(EventKind::new("inventory-update").unwrap(), json!({"sku": "A"}), 42);
        let text = serde_json::to_string(&ev).unwrap();
        assert!(text.contains("\"receivedAtMs\":42"));
        assert!(text.contains("\"kind\":\"inventory-update\""));
    }
}
