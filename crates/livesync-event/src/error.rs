//! livesync-event エラー型

/// イベント生成時のエラー
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// kind が空文字列
    #[error("event kind must not be empty")]
    EmptyKind,
    /// ペイロードが JSON として解釈できない
    #[error("invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}
