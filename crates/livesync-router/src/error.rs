//! livesync-router エラー型

use livesync_event::EventKind;

use crate::router::HandlerId;

/// ハンドラが配信中に失敗した
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// ハンドラがエラーを返した
    #[error("handler rejected event: {0}")]
    Rejected(String),
    /// ハンドラが panic した
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        HandlerError::Rejected(reason.into())
    }
}

/// エラーシンクに渡す失敗情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub kind: EventKind,
    pub handler: HandlerId,
    pub error: HandlerError,
}

/// ルータ操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// クローズ済みのルータへの登録
    #[error("router is closed")]
    Closed,
}
