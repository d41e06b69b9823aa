//! # livesync-router
//!
//! 1 本のチャンネルに届くイベントを、kind ごとに登録されたハンドラへ配る。
//!
//! ## 配信規則
//!
//! ```text
//! event(kind=K) ─→ handlers[K] = [h1, h2, h3]   (登録順)
//!                   h1 → Ok
//!                   h2 → Err / panic  → エラーシンクへ報告して続行
//!                   h3 → Ok
//! ```
//!
//! - 同じ kind の複数ハンドラはすべて登録順に同期呼び出しされる
//! - あるハンドラの失敗は後続ハンドラへの配信を妨げない
//! - kind をまたいだ並べ替えはしない（到着順 = 配信順）
//! - 各ハンドラ呼び出しの直前にクローズフラグを確認する
//!
//! ## スレッドモデル
//!
//! `Router<C>` のハンドラは `Send` を要求しないため、ルータは所有スレッドに
//! 固定される。配信は `&mut self` で行うので、同一チャンネル内で並行に
//! 走ることはない。

pub mod error;
pub mod router;

pub use error::{HandlerError, HandlerFailure, RouterError};
pub use router::{CloseHandle, DeliveryReport, HandlerId, Router};
