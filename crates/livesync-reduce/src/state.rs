//! ビューごとの統合状態（名前付きスライスの集合）

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use livesync_event::Event;
use serde_json::{Map, Value};

use crate::error::ReduceError;
use crate::policy::{MergePolicy, Reducer, SliceState};

/// スライス名
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SliceId(String);

impl SliceId {
    pub fn new(name: impl Into<String>) -> Self {
        SliceId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SliceId {
    fn from(name: &str) -> Self {
        SliceId::new(name)
    }
}

/// [`ReconciledState::apply`] の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// スライスを更新した
    Updated,
    /// ハイドレーションのウォーターマークより古いイベントとして破棄した
    Stale,
}

/// 発行済みハイドレーションの控え
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationTicket {
    /// 発行順の通し番号（1 始まり）
    pub seq: u64,
    /// 発行時刻（ミリ秒）
    pub issued_at_ms: u64,
}

/// [`ReconciledState::complete_hydration`] の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// 結果を取り込んだスライス
    Applied(Vec<SliceId>),
    /// より新しいハイドレーションが発行済みのため破棄した
    Superseded,
}

#[derive(Debug, Clone)]
struct Slice {
    policy: MergePolicy,
    state: SliceState,
    /// 最後に取り込んだハイドレーションの完了時刻
    watermark_ms: Option<u64>,
}

/// ビューが所有する統合状態
///
/// スライス同士は独立しており、あるリデューサが他のスライスを
/// 書き換えることはない。ビュー間で共有もしない。
#[derive(Debug, Default)]
pub struct ReconciledState {
    slices: BTreeMap<SliceId, Slice>,
    /// 前回の `take_changed` 以降に変化したスライス
    changed: BTreeSet<SliceId>,
    /// 最後に発行したハイドレーション番号
    latest_hydration: u64,
}

impl ReconciledState {
    pub fn new() -> Self {
        Self::default()
    }

    /// スライスにポリシーを結び付ける
    ///
    /// 同じポリシーでの再登録は許可する（複数の kind が 1 つのフィードを共有する場合）。
    ///
    /// # エラー
    /// - 既に別のポリシーで登録済み
    pub fn bind(&mut self, slice: SliceId, policy: MergePolicy) -> Result<(), ReduceError> {
        if let Some(existing) = self.slices.get(&slice) {
            if existing.policy != policy {
                return Err(ReduceError::PolicyConflict(slice.to_string()));
            }
            return Ok(());
        }

        tracing::debug!(slice = %slice, policy = policy.name(), "slice bound");
        let state = policy.initial_state();
        self.slices.insert(
            slice,
            Slice {
                policy,
                state,
                watermark_ms: None,
            },
        );
        Ok(())
    }

    /// 1 件のイベントをスライスへ統合する
    ///
    /// # エラー
    /// - 未登録のスライス
    pub fn apply(&mut self, slice: &SliceId, event: &Event) -> Result<Applied, ReduceError> {
        let entry = self
            .slices
            .get_mut(slice)
            .ok_or_else(|| ReduceError::UnknownSlice(slice.to_string()))?;

        if let Some(watermark) = entry.watermark_ms {
            if event.received_at_ms() < watermark {
                tracing::debug!(
                    slice = %slice,
                    kind = %event.kind(),
                    received_at_ms = event.received_at_ms(),
                    watermark_ms = watermark,
                    "event predates hydration; discarded"
                );
                return Ok(Applied::Stale);
            }
        }

        entry.state = entry.policy.reduce(&entry.state, event.payload());
        self.changed.insert(slice.clone());
        Ok(Applied::Updated)
    }

    /// ハイドレーション（初期取得・再取得）の開始を記録する
    pub fn begin_hydration(&mut self, now_ms: u64) -> HydrationTicket {
        self.latest_hydration += 1;
        HydrationTicket {
            seq: self.latest_hydration,
            issued_at_ms: now_ms,
        }
    }

    /// ハイドレーション結果を取り込む
    ///
    /// `initial` はスライス名をキーとするオブジェクト。含まれていない
    /// スライスはそのまま残す。取り込んだスライスには `completed_at_ms` を
    /// ウォーターマークとして記録する。
    ///
    /// # エラー
    /// - `initial` がオブジェクトでない
    /// - スライスのポリシーに合わない値（フィードに配列以外）
    ///
    /// エラー時はどのスライスも変更しない。
    pub fn complete_hydration(
        &mut self,
        ticket: HydrationTicket,
        initial: &Value,
        completed_at_ms: u64,
    ) -> Result<HydrationOutcome, ReduceError> {
        if ticket.seq < self.latest_hydration {
            tracing::debug!(
                seq = ticket.seq,
                latest = self.latest_hydration,
                "hydration superseded; result discarded"
            );
            return Ok(HydrationOutcome::Superseded);
        }

        let object = initial.as_object().ok_or_else(|| ReduceError::HydrationShape {
            slice: "<root>".to_owned(),
            expected: "an object keyed by slice name",
        })?;

        // 先にすべて検証してから書き込む
        let mut hydrated = Vec::new();
        for (id, slice) in &self.slices {
            if let Some(value) = object.get(id.as_str()) {
                hydrated.push((id.clone(), slice.policy.hydrate(id.as_str(), value)?));
            }
        }

        let mut applied = Vec::with_capacity(hydrated.len());
        for (id, state) in hydrated {
            if let Some(slice) = self.slices.get_mut(&id) {
                slice.state = state;
                slice.watermark_ms = Some(completed_at_ms);
                self.changed.insert(id.clone());
                applied.push(id);
            }
        }

        tracing::debug!(
            seq = ticket.seq,
            slices = applied.len(),
            elapsed_ms = completed_at_ms.saturating_sub(ticket.issued_at_ms),
            "hydration applied"
        );
        Ok(HydrationOutcome::Applied(applied))
    }

    /// スライスの現在の状態
    pub fn snapshot(&self, slice: &SliceId) -> Option<&SliceState> {
        self.slices.get(slice).map(|s| &s.state)
    }

    /// 前回呼び出し以降に変化したスライスを取り出す
    pub fn take_changed(&mut self) -> Vec<SliceId> {
        std::mem::take(&mut self.changed).into_iter().collect()
    }

    /// 全スライスをスライス名キーの JSON オブジェクトにする
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .slices
            .iter()
            .map(|(id, slice)| (id.to_string(), slice.state.to_json()))
            .collect();
        Value::Object(map)
    }
}
