//! Upsert 用のキー抽出

use core::fmt;

use serde_json::Value;

use crate::error::ReduceError;

/// ペイロードから取り出した識別キー
///
/// 文字列キーと整数キーは区別する（`"1"` と `1` は別物）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedKey {
    Str(String),
    Int(i64),
    /// i64 に収まらない正の整数
    Uint(u64),
}

impl FeedKey {
    /// JSON 値をキーとして解釈する
    ///
    /// 空でない文字列と整数のみ有効。null・浮動小数・真偽値・
    /// オブジェクト・配列・空文字列は不正なキーとして `None`。
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(FeedKey::Str(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(FeedKey::Int)
                .or_else(|| n.as_u64().map(FeedKey::Uint)),
            _ => None,
        }
    }
}

/// ドット区切りのフィールドパス（例: `id`, `task.id`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// パス文字列を解析する
    ///
    /// # エラー
    /// - 空文字列、または空のセグメントを含む（`a..b`, `.id`）
    pub fn parse(path: &str) -> Result<Self, ReduceError> {
        let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
        if path.is_empty() || segments.iter().any(String::is_empty) {
            return Err(ReduceError::InvalidKeyPath(path.to_owned()));
        }
        Ok(KeyPath(segments))
    }

    /// ペイロードからキーを取り出す
    ///
    /// パスが途中で途切れる場合やキーが不正な場合は `None`。
    pub fn extract(&self, payload: &Value) -> Option<FeedKey> {
        let mut cursor = payload;
        for segment in &self.0 {
            cursor = cursor.get(segment)?;
        }
        FeedKey::from_value(cursor)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_display() {
        let path = KeyPath::parse("task.id").unwrap();
        assert_eq!(path.to_string(), "task.id");
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        for bad in ["", ".", "a..b", ".id", "id."] {
            assert!(KeyPath::parse(bad).is_err(), "`{}` は不正なパス", bad);
        }
    }

    #[test]
    fn test_extract_nested() {
        let path = KeyPath::parse("task.id").unwrap();
        let payload = json!({"task": {"id": "t-9", "status": "running"}});
        assert_eq!(path.extract(&payload), Some(FeedKey::Str("t-9".into())));
    }

    #[test]
    fn test_extract_malformed_keys() {
        let path = KeyPath::parse("id").unwrap();
        for payload in [
            json!({}),
            json!({"id": null}),
            json!({"id": 1.5}),
            json!({"id": true}),
            json!({"id": ""}),
            json!({"id": {"nested": 1}}),
            json!({"id": [1]}),
            json!("not an object"),
        ] {
            assert_eq!(path.extract(&payload), None, "{} のキーは不正", payload);
        }
    }

    #[test]
    fn test_string_and_int_keys_differ() {
        let path = KeyPath::parse("id").unwrap();
        let s = path.extract(&json!({"id": "1"}));
        let n = path.extract(&json!({"id": 1}));
        assert_ne!(s, n);
        assert_eq!(path.extract(&json!({"id": u64::MAX})), Some(FeedKey::Uint(u64::MAX)));
    }
}
