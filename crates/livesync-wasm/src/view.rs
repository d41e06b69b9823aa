//! ViewCore: 1 つのビューのライブ同期（JS 非依存）
//!
//! チャンネル・ルータ・統合状態をまとめ、ビューのライフサイクルに結び付ける。
//! wasm-bindgen 側の [`LiveView`](crate::LiveView) はこれを薄く包むだけなので、
//! パイプライン全体をネイティブでテストできる。
//!
//! ## ハイドレーション
//!
//! ```text
//! mount(now)                      → HydrationTicket（初期取得）
//! transport_opened (初回)          → なし（mount の取得でカバー済み）
//! transport_opened (再接続)        → HydrationTicket（切断中の取りこぼしを再取得）
//! complete_hydration(ticket, ...)  → スライスを置き換え、ウォーターマークを記録
//! ```
//!
//! 再接続の検出は `__connected` ハンドラで行う。ホストはチケットを受け取ったら
//! 非同期に取得を開始し、結果を `complete_hydration` に渡す。

use std::cell::RefCell;
use std::rc::Rc;

use livesync_buffer::Capacity;
use livesync_channel::{
    Channel, ChannelOptions, ChannelStatus, Command, ConnectionError, ConnectionId, ConnectionState,
    Endpoint,
};
use livesync_event::{Event, EventError, EventKind};
use livesync_reduce::{
    HydrationOutcome, HydrationTicket, MergePolicy, ReconciledState, ReduceError, SliceId,
    SliceState,
};
use livesync_router::{
    CloseHandle, DeliveryReport, HandlerError, HandlerFailure, HandlerId, RouterError,
};
use serde_json::Value;

use crate::error::ViewError;

/// ハンドラに渡すビューのコンテキスト
#[derive(Debug, Default)]
pub struct ViewContext {
    state: ReconciledState,
    /// `__connected`（再接続）で発行され、ホストへ渡るのを待っているチケット
    pending_hydration: Option<HydrationTicket>,
}

impl ViewContext {
    pub fn state(&self) -> &ReconciledState {
        &self.state
    }
}

/// 1 つのビューが排他的に所有するライブ同期コア
pub struct ViewCore {
    channel: Channel<ViewContext>,
    ctx: ViewContext,
    failures: Rc<RefCell<Vec<HandlerFailure>>>,
}

impl ViewCore {
    /// チャンネルを開き、再接続時の再取得ハンドラを登録する
    ///
    /// # エラー
    /// - エンドポイント URL が不正
    /// - オプションが不正
    pub fn open(endpoint: &str, options: ChannelOptions) -> Result<Self, ViewError> {
        let endpoint = Endpoint::parse(endpoint)?;
        let mut channel = Channel::open(endpoint, options)?;

        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&failures);
        channel.set_error_sink(move |failure: &HandlerFailure| {
            sink.borrow_mut().push(failure.clone())
        });

        channel.on(EventKind::connected(), |ctx: &mut ViewContext, event: &Event| {
            if event.is_reconnect() {
                let ticket = ctx.state.begin_hydration(event.received_at_ms());
                tracing::info!(seq = ticket.seq, "reconnected; rehydration requested");
                ctx.pending_hydration = Some(ticket);
            }
            Ok(())
        })?;

        Ok(ViewCore {
            channel,
            ctx: ViewContext::default(),
            failures,
        })
    }

    /// スライスにポリシーを結び付け、`kind` のイベントをそのスライスへ統合する
    ///
    /// 複数の kind を同じスライス（同じポリシー）に結び付けてもよい。
    ///
    /// # エラー
    /// - kind が空
    /// - 既に別のポリシーで結び付けたスライス
    /// - クローズ済み
    pub fn register_feed(
        &mut self,
        kind: &str,
        slice: &str,
        policy: MergePolicy,
    ) -> Result<HandlerId, ViewError> {
        if self.channel.is_closed() {
            return Err(RouterError::Closed.into());
        }
        let kind = EventKind::new(kind)?;
        let slice = SliceId::from(slice);
        self.ctx.state.bind(slice.clone(), policy)?;

        let id = self.channel.on(kind, move |ctx: &mut ViewContext, event: &Event| {
            ctx.state
                .apply(&slice, event)
                .map(|_| ())
                .map_err(|e| HandlerError::rejected(e.to_string()))
        })?;
        Ok(id)
    }

    /// ホストの文字列・数値設定から [`register_feed`](Self::register_feed) する
    ///
    /// `capacity` は JS の number のまま受け取り、切り捨てずに検証する。
    ///
    /// # エラー
    /// - ポリシー名・キーパスが不正
    /// - 容量が NaN・小数・負・上限超過
    pub fn register_feed_from_host(
        &mut self,
        kind: &str,
        slice: &str,
        policy: &str,
        capacity: f64,
        key_path: Option<&str>,
    ) -> Result<HandlerId, ViewError> {
        let capacity = Capacity::from_f64(capacity).map_err(ReduceError::from)?;
        let policy = MergePolicy::from_parts(policy, capacity.get() as i64, key_path)?;
        self.register_feed(kind, slice, policy)
    }

    /// 副作用ハンドラ（通知・トースト等）を登録する。状態には触れない
    pub fn on<F>(&mut self, kind: &str, mut handler: F) -> Result<HandlerId, ViewError>
    where
        F: FnMut(&Event) -> Result<(), HandlerError> + 'static,
    {
        let kind = EventKind::new(kind)?;
        Ok(self.channel.on(kind, move |_: &mut ViewContext, event: &Event| handler(event))?)
    }

    /// 登録を解除する。見つからなければ何もしない
    pub fn off(&mut self, kind: &str, id: HandlerId) -> bool {
        match EventKind::new(kind) {
            Ok(kind) => self.channel.off(&kind, id),
            Err(_) => false,
        }
    }

    /// ビューのマウント: 初期取得のチケットを発行する
    pub fn mount(&mut self, now_ms: u64) -> HydrationTicket {
        let ticket = self.ctx.state.begin_hydration(now_ms);
        tracing::debug!(seq = ticket.seq, "view mounted");
        ticket
    }

    pub fn poll(&mut self, now_ms: u64) -> Vec<Command> {
        self.channel.poll(now_ms)
    }

    pub fn next_wakeup_ms(&self) -> Option<u64> {
        self.channel.next_wakeup_ms()
    }

    /// ソケットが開いた
    ///
    /// # 戻り値
    /// 再接続だった場合、ホストが開始すべき再取得のチケット
    pub fn transport_opened(
        &mut self,
        id: ConnectionId,
        identity: &str,
        now_ms: u64,
    ) -> Option<HydrationTicket> {
        self.channel.transport_opened(&mut self.ctx, id, identity, now_ms);
        self.ctx.pending_hydration.take()
    }

    pub fn transport_failed(
        &mut self,
        id: ConnectionId,
        now_ms: u64,
    ) -> Result<(), ConnectionError> {
        self.channel.transport_failed(id, now_ms)
    }

    pub fn transport_dropped(
        &mut self,
        id: ConnectionId,
        now_ms: u64,
    ) -> Result<(), ConnectionError> {
        self.channel.transport_dropped(id, now_ms)
    }

    /// トランスポートから受信したイベントを配信する
    ///
    /// # 戻り値
    /// 配信しなかった場合（クローズ後・古い接続・予約 kind）は `None`
    ///
    /// # エラー
    /// - kind が空
    /// - ペイロードが JSON として不正
    pub fn receive(
        &mut self,
        id: ConnectionId,
        kind: &str,
        payload_json: &str,
        now_ms: u64,
    ) -> Result<Option<DeliveryReport>, ViewError> {
        if self.channel.is_closed() {
            return Ok(None);
        }
        let kind = EventKind::new(kind)?;
        let payload: Value =
            serde_json::from_str(payload_json).map_err(EventError::InvalidPayload)?;
        Ok(self.channel.receive(&mut self.ctx, id, kind, payload, now_ms))
    }

    /// 取得結果をスライスへ取り込む
    ///
    /// クローズ後に完了した取得は状態を変えず `Superseded` として扱う。
    pub fn complete_hydration(
        &mut self,
        ticket: HydrationTicket,
        initial: &Value,
        now_ms: u64,
    ) -> Result<HydrationOutcome, ViewError> {
        if self.channel.is_closed() {
            tracing::debug!(seq = ticket.seq, "hydration finished after close; discarded");
            return Ok(HydrationOutcome::Superseded);
        }
        Ok(self.ctx.state.complete_hydration(ticket, initial, now_ms)?)
    }

    /// JSON 文字列の取得結果を取り込む
    pub fn complete_hydration_json(
        &mut self,
        ticket: HydrationTicket,
        initial_json: &str,
        now_ms: u64,
    ) -> Result<HydrationOutcome, ViewError> {
        let initial: Value = serde_json::from_str(initial_json).map_err(ViewError::HydrationJson)?;
        self.complete_hydration(ticket, &initial, now_ms)
    }

    /// 前回呼び出し以降に変化したスライス（描画通知用）
    pub fn take_changed(&mut self) -> Vec<SliceId> {
        if self.channel.is_closed() {
            return Vec::new();
        }
        self.ctx.state.take_changed()
    }

    /// 前回呼び出し以降のハンドラ失敗
    pub fn take_failures(&mut self) -> Vec<HandlerFailure> {
        std::mem::take(&mut *self.failures.borrow_mut())
    }

    /// スライスの現在値（JSON）
    pub fn snapshot(&self, slice: &str) -> Option<Value> {
        self.ctx.state.snapshot(&SliceId::from(slice)).map(SliceState::to_json)
    }

    /// 全スライス
    pub fn snapshot_all(&self) -> Value {
        self.ctx.state.to_json()
    }

    pub fn state(&self) -> &ReconciledState {
        self.ctx.state()
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.channel.close_handle()
    }

    /// アンマウント: チャンネルを閉じる（冪等）
    pub fn close(&mut self) -> Option<Command> {
        self.ctx.pending_hydration = None;
        self.channel.close()
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn status(&self) -> ChannelStatus {
        self.channel.status()
    }
}

/// JS の number で渡された ID（接続世代・ハンドラ ID）を検証する
///
/// # エラー
/// - NaN・無限大・小数・負、または安全な整数範囲（2^53 - 1）を超える
pub fn id_from_host(value: f64) -> Result<u64, ViewError> {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    if !value.is_finite()
        || !(0.0..=MAX_SAFE_INTEGER).contains(&value)
        || value as u64 as f64 != value
    {
        return Err(ViewError::InvalidId(value));
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesync_event::kinds;
    use serde_json::json;

    fn open() -> ViewCore {
        ViewCore::open("wss://ops.example.com/live", ChannelOptions::default()).unwrap()
    }

    fn connect(view: &mut ViewCore, now: u64) -> (ConnectionId, Option<HydrationTicket>) {
        let id = match view.poll(now).as_slice() {
            [Command::Connect { connection_id, .. }] => *connection_id,
            other => panic!("Connect を期待: {:?}", other),
        };
        (id, view.transport_opened(id, "sock", now))
    }

    #[test]
    fn test_register_feed_rejects_conflicting_policy() {
        let mut view = open();
        let prepend = MergePolicy::from_parts("prepend", 5, None).unwrap();
        view.register_feed("order-created", "orders", prepend.clone()).unwrap();
        view.register_feed("order-updated", "orders", prepend).unwrap();

        let replace = MergePolicy::from_parts("replace", 0, None).unwrap();
        let err = view.register_feed("order-deleted", "orders", replace).unwrap_err();
        assert!(matches!(err, ViewError::Reduce(_)));
    }

    #[test]
    fn test_side_effect_handler_sees_event() {
        let mut view = open();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let spy = Rc::clone(&seen);
        view.on("low-stock-alert", move |event| {
            spy.borrow_mut().push(event.payload().clone());
            Ok(())
        })
        .unwrap();

        let (id, _) = connect(&mut view, 0);
        view.receive(id, "low-stock-alert", r#"{"sku":"A-1"}"#, 1).unwrap();
        assert_eq!(*seen.borrow(), vec![json!({"sku": "A-1"})]);
    }

    #[test]
    fn test_invalid_payload_is_error() {
        let mut view = open();
        let (id, _) = connect(&mut view, 0);
        assert!(matches!(
            view.receive(id, "order-created", "{not json", 1),
            Err(ViewError::Event(EventError::InvalidPayload(_)))
        ));
    }

    #[test]
    fn test_first_connect_requests_no_hydration() {
        let mut view = open();
        let mount = view.mount(0);
        assert_eq!(mount.seq, 1);

        let (_, ticket) = connect(&mut view, 5);
        assert_eq!(ticket, None);
    }

    #[test]
    fn test_register_feed_from_host_rejects_bad_capacity() {
        let mut view = open();
        let kind = kinds::AGENT_ACTIVITY_NEW;

        for capacity in [-0.5, f64::NAN, 2.9, -1.0, 1e9] {
            let err = view
                .register_feed_from_host(kind, "activity", "prepend", capacity, None)
                .unwrap_err();
            assert!(
                matches!(err, ViewError::Reduce(ReduceError::Capacity(_))),
                "capacity {} は拒否されるべき: {:?}",
                capacity,
                err
            );
        }

        view.register_feed_from_host(kind, "activity", "prepend", 3.0, None).unwrap();
        let (id, _) = connect(&mut view, 0);
        for (i, item) in ["A", "B", "C", "D"].iter().enumerate() {
            let payload = json!(item).to_string();
            view.receive(id, kind, &payload, 1 + i as u64).unwrap();
        }
        assert_eq!(view.snapshot("activity"), Some(json!(["D", "C", "B"])));
    }

    #[test]
    fn test_id_from_host() {
        assert_eq!(id_from_host(7.0).unwrap(), 7);
        assert_eq!(id_from_host(0.0).unwrap(), 0);
        for bad in [-1.0, 1.5, f64::NAN, f64::INFINITY, 1e300] {
            assert!(matches!(id_from_host(bad), Err(ViewError::InvalidId(_))), "{}", bad);
        }
    }

    #[test]
    fn test_register_after_close_fails() {
        let mut view = open();
        assert!(view.close().is_some());
        assert_eq!(view.close(), None);
        assert!(matches!(
            view.register_feed("k", "s", MergePolicy::from_parts("replace", 0, None).unwrap()),
            Err(ViewError::Router(RouterError::Closed))
        ));
    }
}
