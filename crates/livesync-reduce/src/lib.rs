//! # livesync-reduce
//!
//! 受信イベントをビューのローカル状態へ統合するリデューサ群。
//!
//! ## マージポリシー
//!
//! | ポリシー  | 用途                                   | 結果             |
//! |-----------|----------------------------------------|------------------|
//! | `Upsert`  | 「ジョブの状態が変わった」系のイベント | 有界フィード     |
//! | `Prepend` | 「事実が起きた」系（監査ログ等）       | 有界フィード     |
//! | `Replace` | 完全なスナップショットを運ぶイベント   | スナップショット |
//!
//! リデューサは純粋関数で、同期的にすぐ終わる（配信経路上で実行されるため）。
//! 通知などの副作用はビュー側のハンドラで行う。
//!
//! ## スライス
//!
//! [`ReconciledState`] は名前付きスライスの集合。各リデューサは自分に
//! 結び付けられたスライスだけを書き換え、ビューはスライスを組み合わせて描画する。
//!
//! ## ハイドレーション
//!
//! 再接続後の再取得結果はスライスを丸ごと置き換え、完了時刻を
//! ウォーターマークとして記録する。それより前に受信したイベントが
//! 後から届いても、再取得結果に含まれているものとして破棄する。

pub mod error;
pub mod key;
pub mod policy;
pub mod state;

pub use error::ReduceError;
pub use key::{FeedKey, KeyPath};
pub use policy::{MergePolicy, PrependPolicy, Reducer, ReplacePolicy, SliceState, UpsertPolicy};
pub use state::{Applied, HydrationOutcome, HydrationTicket, ReconciledState, SliceId};
