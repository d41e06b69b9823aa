//! livesync-buffer エラー型

/// 容量設定のエラー
///
/// 挿入時ではなく、フィード登録時に検出する。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapacityConfigError {
    /// 負の容量
    #[error("capacity must not be negative (got {0})")]
    Negative(i64),
    /// 上限を超える容量
    #[error("capacity {requested} exceeds the maximum of {max}")]
    TooLarge { requested: u64, max: usize },
    /// 有限の整数でない（NaN・無限大・小数）
    #[error("capacity must be a finite whole number")]
    NotInteger,
}
