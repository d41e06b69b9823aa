//! livesync-wasm エラー型

use livesync_channel::{ConfigError, ConnectionError};
use livesync_event::EventError;
use livesync_reduce::ReduceError;
use livesync_router::RouterError;

/// ビュー操作のエラー
///
/// JS 境界では `JsError` に変換される。
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Reduce(#[from] ReduceError),
    #[error(transparent)]
    Router(#[from] RouterError),
    /// ホストから渡された ID が非負の整数でない
    #[error("invalid id from host: {0}")]
    InvalidId(f64),
    /// ハイドレーション結果が JSON として解釈できない
    #[error("hydration result is not valid JSON: {0}")]
    HydrationJson(#[source] serde_json::Error),
}
