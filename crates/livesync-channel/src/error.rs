//! livesync-channel エラー型

/// 接続のエラー
///
/// `reconnect = true` では発生しない（無期限に再試行する）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// 再試行を使い切っても接続できなかった
    #[error("endpoint unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },
    /// 接続が切れ、再接続は無効
    #[error("connection dropped and reconnect is disabled")]
    Dropped,
    /// クローズ済みのチャンネル
    #[error("channel is closed")]
    Closed,
}

/// チャンネル設定のエラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// エンドポイント URL として解釈できない
    #[error("invalid endpoint `{endpoint}`: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    /// 対応していないスキーム
    #[error("unsupported endpoint scheme `{0}` (expected ws, wss, http or https)")]
    UnsupportedScheme(String),
    /// 環境変数にエンドポイントがない
    #[error("environment variable `{0}` is not set")]
    MissingEndpoint(&'static str),
    /// 再接続スケジュールが空
    #[error("backoff schedule must contain at least one delay")]
    EmptyBackoffSchedule,
    /// オプション JSON が不正
    #[error("invalid channel options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}
