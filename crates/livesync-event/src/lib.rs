//! # livesync-event
//!
//! チャンネル上を流れるイベントの定義。
//!
//! ## Event の役割
//!
//! Event はトランスポートが受信した 1 件のメッセージを表す：
//! - `kind`: ルーティングに使うイベント名（例: `order-created`）
//! - `payload`: 任意の構造化データ（コアは中身を解釈しない）
//! - `received_at_ms`: 受信時刻（ホストが `Date.now()` から注入）
//!
//! Event は受信後に変更されない。ハンドラには `&Event` として渡される。
//!
//! ## ライフサイクルイベント
//!
//! `__` で始まる kind はコアが内部で生成するライフサイクルイベント。
//! 現在は [`CONNECTED`]（接続・再接続の成功ごとに 1 回）のみ。

pub mod error;
pub mod event;
pub mod kinds;

pub use error::EventError;
pub use event::{Event, EventKind};

/// 接続（再接続を含む）に成功するたびに発火するライフサイクルイベント
pub const CONNECTED: &str = "__connected";

/// ライフサイクルイベント kind の接頭辞
pub const LIFECYCLE_PREFIX: &str = "__";
