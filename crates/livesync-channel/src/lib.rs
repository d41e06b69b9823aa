//! # livesync-channel
//!
//! ビュー 1 つにつき 1 本のライブ接続を管理する。
//!
//! ## sans-IO
//!
//! このクレートはソケットもタイマーも持たない。ホスト（JS 側）が実際の
//! トランスポートを操作し、結果をコールバックで知らせる：
//!
//! ```text
//! host                         Channel
//!  │  poll(now) ───────────────→ │  Command::Connect { connectionId, endpoint, ... }
//!  │ ←─────────────────────────  │
//!  │  (ソケットを開く)             │
//!  │  transportOpened(id, ...) → │  state = Connected, __connected を配信
//!  │  receive(id, kind, ...)  ─→ │  Router へ配信
//!  │  transportDropped(id)   ──→ │  state = Disconnected, 再接続タイマー設定
//!  │  poll(now) ───────────────→ │  (期限到来) Command::Connect { 新しい id }
//!  │  close() ─────────────────→ │  state = Closed, Command::Disconnect
//! ```
//!
//! ## 状態遷移
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected (切断)
//!                    ↑                          │
//!                    └──── reconnect = true ────┘
//! (任意の状態) → Closed (close() のみ。Closed からの遷移はない)
//! ```
//!
//! ## 接続世代
//!
//! 接続試行ごとに新しい [`ConnectionId`] を払い出す。古い世代の
//! コールバック（切断済みソケットの遅延イベント等）はすべて無視される。

pub mod channel;
pub mod config;
pub mod error;
pub mod manager;

pub use channel::Channel;
pub use config::{BackoffSchedule, ChannelOptions, Credentials, Endpoint};
pub use error::{ConfigError, ConnectionError};
pub use manager::{ChannelStatus, Command, ConnectionId, ConnectionManager, ConnectionState};

/// 既定の再接続待ち時間（ミリ秒）。最後の値で頭打ちになる
pub const DEFAULT_BACKOFF_SCHEDULE_MS: [u64; 4] = [1000, 2000, 5000, 10_000];

/// ネイティブホストがエンドポイントを読む環境変数
pub const ENDPOINT_ENV: &str = "LIVESYNC_ENDPOINT";
