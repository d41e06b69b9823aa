//! # livesync-buffer
//!
//! 容量固定・挿入順の不変バッファ。
//!
//! 高頻度で届くフィード（アクティビティ一覧、ジョブキュー等）のメモリと
//! 描画コストを上限 N 件に抑えるために使う。
//!
//! ## 挿入ポリシー
//!
//! ```text
//! Prepend: 常に先頭へ追加し、容量を超えた分を末尾（最古）から捨てる
//!   cap=3: [] → A → [A] → B → [B, A] → C → [C, B, A] → D → [D, C, B]
//!
//! Upsert:  キーが一致する要素があればその位置で置き換える（並びは変わらない）
//!          一致がなければ Prepend と同じ
//!   [{1,a}, {2,b}] + {1,a2} → [{1,a2}, {2,b}]
//! ```
//!
//! ## 不変性
//!
//! すべての挿入は新しいバッファを返し、引数のバッファは変更しない。
//! 内部は `Arc<[T]>` なので、描画レイヤーは [`BoundedBuffer::ptr_eq`] で
//! 変更の有無を安価に判定できる。

#![no_std]
extern crate alloc;

pub mod buffer;
pub mod capacity;
pub mod error;

pub use buffer::{no_key, BoundedBuffer, InsertPolicy};
pub use capacity::Capacity;
pub use error::CapacityConfigError;

/// 設定可能な容量の上限
///
/// 1 フィードあたりこれを超える件数を保持する用途は想定しない。
pub const MAX_CAPACITY: usize = 100_000;
