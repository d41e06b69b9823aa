//! livesync-reduce エラー型

use livesync_buffer::CapacityConfigError;

/// リデューサ登録・ハイドレーションのエラー
#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    /// 登録されていないスライス
    #[error("unknown slice `{0}`")]
    UnknownSlice(String),
    /// 同じスライスに異なるポリシーを登録しようとした
    #[error("slice `{0}` is already bound to a different merge policy")]
    PolicyConflict(String),
    /// 未知のポリシー名
    #[error("unknown merge policy `{0}` (expected upsert, prepend or replace)")]
    InvalidPolicy(String),
    /// Upsert にキーパスが指定されていない
    #[error("upsert policy requires a key path")]
    MissingKeyPath,
    /// キーパスの書式が不正
    #[error("invalid key path `{0}`")]
    InvalidKeyPath(String),
    /// ハイドレーション結果の形がスライスに合わない
    #[error("hydration value for `{slice}` must be {expected}")]
    HydrationShape { slice: String, expected: &'static str },
    /// 容量設定が不正
    #[error(transparent)]
    Capacity(#[from] CapacityConfigError),
}
