//! マージポリシーとリデューサ

use livesync_buffer::{BoundedBuffer, Capacity};
use serde_json::Value;

use crate::error::ReduceError;
use crate::key::KeyPath;

/// スライスの状態
#[derive(Debug, Clone, PartialEq)]
pub enum SliceState {
    /// 有界フィード（先頭が最新）
    Feed(BoundedBuffer<Value>),
    /// 完全なスナップショット
    Snapshot(Value),
}

impl SliceState {
    /// フィードなら中身を返す
    pub fn as_feed(&self) -> Option<&BoundedBuffer<Value>> {
        match self {
            SliceState::Feed(buf) => Some(buf),
            SliceState::Snapshot(_) => None,
        }
    }

    /// JSON に変換する（フィードは配列、スナップショットはそのまま）
    pub fn to_json(&self) -> Value {
        match self {
            SliceState::Feed(buf) => Value::Array(buf.iter().cloned().collect()),
            SliceState::Snapshot(value) => value.clone(),
        }
    }
}

/// リデューサ: `(前の状態, ペイロード) → 次の状態`
///
/// 純粋かつ同期的であること。I/O やブロッキング処理をしてはいけない。
pub trait Reducer {
    /// 1 件のペイロードを統合した次の状態を返す
    fn reduce(&self, previous: &SliceState, payload: &Value) -> SliceState;

    /// 登録直後の状態
    fn initial_state(&self) -> SliceState;

    /// 初期取得（ハイドレーション）の結果から状態を作る
    fn hydrate(&self, slice: &str, value: &Value) -> Result<SliceState, ReduceError>;
}

/// キー一致なら同じ位置で置換、なければ先頭へ追加
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPolicy {
    pub capacity: Capacity,
    pub key: KeyPath,
}

/// 常に先頭へ追加して容量で切り詰める
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrependPolicy {
    pub capacity: Capacity,
}

/// 前の値を捨てて丸ごと置き換える
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplacePolicy;

/// リデューサごとに選択するマージポリシー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePolicy {
    Upsert(UpsertPolicy),
    Prepend(PrependPolicy),
    Replace(ReplacePolicy),
}

impl MergePolicy {
    /// ホストから渡された文字列設定からポリシーを組み立てる
    ///
    /// # 引数
    /// - `name`: `"upsert"` / `"prepend"` / `"replace"`
    /// - `capacity`: フィードの容量（`replace` では無視）
    /// - `key_path`: `upsert` のキーパス（例: `"id"`）
    ///
    /// # エラー
    /// - 未知のポリシー名
    /// - 容量が負または上限超過
    /// - `upsert` でキーパスがない・不正
    pub fn from_parts(
        name: &str,
        capacity: i64,
        key_path: Option<&str>,
    ) -> Result<Self, ReduceError> {
        match name {
            "upsert" => {
                let key = KeyPath::parse(key_path.ok_or(ReduceError::MissingKeyPath)?)?;
                Ok(MergePolicy::Upsert(UpsertPolicy {
                    capacity: Capacity::from_signed(capacity)?,
                    key,
                }))
            }
            "prepend" => Ok(MergePolicy::Prepend(PrependPolicy {
                capacity: Capacity::from_signed(capacity)?,
            })),
            "replace" => Ok(MergePolicy::Replace(ReplacePolicy)),
            other => Err(ReduceError::InvalidPolicy(other.to_owned())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MergePolicy::Upsert(_) => "upsert",
            MergePolicy::Prepend(_) => "prepend",
            MergePolicy::Replace(_) => "replace",
        }
    }
}

/// 前の状態がフィードでなければ空フィードから始める
fn feed_of(previous: &SliceState) -> BoundedBuffer<Value> {
    previous.as_feed().cloned().unwrap_or_default()
}

fn hydrate_feed(slice: &str, value: &Value, capacity: Capacity) -> Result<SliceState, ReduceError> {
    let items = value.as_array().ok_or_else(|| ReduceError::HydrationShape {
        slice: slice.to_owned(),
        expected: "an array",
    })?;
    Ok(SliceState::Feed(BoundedBuffer::from_items(items.iter().cloned(), capacity)))
}

impl Reducer for UpsertPolicy {
    fn reduce(&self, previous: &SliceState, payload: &Value) -> SliceState {
        let feed = feed_of(previous);
        SliceState::Feed(feed.upsert_by(payload.clone(), self.capacity, |item| {
            self.key.extract(item)
        }))
    }

    fn initial_state(&self) -> SliceState {
        SliceState::Feed(BoundedBuffer::new())
    }

    fn hydrate(&self, slice: &str, value: &Value) -> Result<SliceState, ReduceError> {
        hydrate_feed(slice, value, self.capacity)
    }
}

impl Reducer for PrependPolicy {
    fn reduce(&self, previous: &SliceState, payload: &Value) -> SliceState {
        SliceState::Feed(feed_of(previous).prepend(payload.clone(), self.capacity))
    }

    fn initial_state(&self) -> SliceState {
        SliceState::Feed(BoundedBuffer::new())
    }

    fn hydrate(&self, slice: &str, value: &Value) -> Result<SliceState, ReduceError> {
        hydrate_feed(slice, value, self.capacity)
    }
}

impl Reducer for ReplacePolicy {
    fn reduce(&self, _previous: &SliceState, payload: &Value) -> SliceState {
        SliceState::Snapshot(payload.clone())
    }

    fn initial_state(&self) -> SliceState {
        SliceState::Snapshot(Value::Null)
    }

    fn hydrate(&self, _slice: &str, value: &Value) -> Result<SliceState, ReduceError> {
        Ok(SliceState::Snapshot(value.clone()))
    }
}

impl Reducer for MergePolicy {
    fn reduce(&self, previous: &SliceState, payload: &Value) -> SliceState {
        match self {
            MergePolicy::Upsert(p) => p.reduce(previous, payload),
            MergePolicy::Prepend(p) => p.reduce(previous, payload),
            MergePolicy::Replace(p) => p.reduce(previous, payload),
        }
    }

    fn initial_state(&self) -> SliceState {
        match self {
            MergePolicy::Upsert(p) => p.initial_state(),
            MergePolicy::Prepend(p) => p.initial_state(),
            MergePolicy::Replace(p) => p.initial_state(),
        }
    }

    fn hydrate(&self, slice: &str, value: &Value) -> Result<SliceState, ReduceError> {
        match self {
            MergePolicy::Upsert(p) => p.hydrate(slice, value),
            MergePolicy::Prepend(p) => p.hydrate(slice, value),
            MergePolicy::Replace(p) => p.hydrate(slice, value),
        }
    }
}
