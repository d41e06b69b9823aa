//! Channel: 接続管理 + ルータ
//!
//! ビュー 1 つが排他的に所有する。ハンドラ登録はチャンネル単位で、
//! `close` すると接続もハンドラもまとめて破棄される。

use livesync_event::{Event, EventKind};
use livesync_router::{
    CloseHandle, DeliveryReport, HandlerError, HandlerFailure, HandlerId, Router, RouterError,
};
use serde_json::Value;

use crate::config::{ChannelOptions, Endpoint};
use crate::error::{ConfigError, ConnectionError};
use crate::manager::{ChannelStatus, Command, ConnectionId, ConnectionManager, ConnectionState};

/// ビューが所有するライブチャンネル
///
/// `C` はハンドラに渡すコンテキスト（ビューの統合状態）。
/// 配信は `&mut self` で行うため、同じチャンネルのイベントは常に 1 件ずつ
/// 到着順に処理される。
pub struct Channel<C> {
    manager: ConnectionManager,
    router: Router<C>,
}

impl<C> Channel<C> {
    /// チャンネルを開く
    ///
    /// 最初の `poll` が `Command::Connect` を返す。
    ///
    /// # エラー
    /// - オプションが不正（空の再接続スケジュール）
    pub fn open(endpoint: Endpoint, options: ChannelOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        tracing::debug!(
            endpoint = endpoint.as_str(),
            reconnect = options.reconnect,
            "opening channel"
        );
        Ok(Channel {
            manager: ConnectionManager::open(endpoint, options),
            router: Router::new(),
        })
    }

    /// ハンドラを登録する
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> Result<HandlerId, RouterError>
    where
        F: FnMut(&mut C, &Event) -> Result<(), HandlerError> + 'static,
    {
        self.router.on(kind, handler)
    }

    /// 登録を解除する。見つからなければ何もしない
    pub fn off(&mut self, kind: &EventKind, id: HandlerId) -> bool {
        self.router.off(kind, id)
    }

    /// ハンドラ失敗の報告先を設定する
    pub fn set_error_sink<F>(&mut self, sink: F)
    where
        F: FnMut(&HandlerFailure) + 'static,
    {
        self.router.set_error_sink(sink);
    }

    /// 配信中のハンドラからでもチャンネルを止められるフラグ
    pub fn close_handle(&self) -> CloseHandle {
        self.router.close_handle()
    }

    /// ホストが実行すべきコマンドを取り出す
    ///
    /// クローズフラグが外から立てられていれば、ここでクローズを完了させる。
    pub fn poll(&mut self, now_ms: u64) -> Vec<Command> {
        if self.router.is_closed() && !self.manager.is_closed() {
            return self.close().into_iter().collect();
        }
        self.manager.poll(now_ms)
    }

    /// 次に `poll` を呼ぶべき時刻
    pub fn next_wakeup_ms(&self) -> Option<u64> {
        self.manager.next_wakeup_ms()
    }

    /// ソケットが開いた。`__connected` を配信する
    ///
    /// # 戻り値
    /// `__connected` を配信した場合はその結果。古い世代やクローズ後なら `None`
    pub fn transport_opened(
        &mut self,
        ctx: &mut C,
        id: ConnectionId,
        identity: &str,
        now_ms: u64,
    ) -> Option<DeliveryReport> {
        if self.is_closed() {
            return None;
        }
        let event = self.manager.transport_opened(id, identity, now_ms)?;
        Some(self.router.deliver(ctx, &event))
    }

    /// 接続試行が失敗した
    pub fn transport_failed(
        &mut self,
        id: ConnectionId,
        now_ms: u64,
    ) -> Result<(), ConnectionError> {
        self.manager.transport_failed(id, now_ms)
    }

    /// 接続が切れた
    pub fn transport_dropped(
        &mut self,
        id: ConnectionId,
        now_ms: u64,
    ) -> Result<(), ConnectionError> {
        self.manager.transport_dropped(id, now_ms)
    }

    /// トランスポートからイベントを受信した
    ///
    /// 次の場合は配信せず `None` を返す：
    /// - クローズ済み（トランスポートのバッファに残っていたイベント）
    /// - 古い世代・未接続の接続から届いた
    /// - ライフサイクル kind（`__` 始まり）を名乗るリモートイベント
    pub fn receive(
        &mut self,
        ctx: &mut C,
        id: ConnectionId,
        kind: EventKind,
        payload: Value,
        now_ms: u64,
    ) -> Option<DeliveryReport> {
        if self.is_closed() {
            tracing::debug!(kind = %kind, "event after close dropped");
            return None;
        }
        if !self.manager.accepts_events_from(id) {
            tracing::debug!(kind = %kind, connection = %id, "event from stale connection dropped");
            return None;
        }
        if kind.is_lifecycle() {
            tracing::warn!(kind = %kind, "remote event uses reserved lifecycle kind; dropped");
            return None;
        }

        let event = Event::new(kind, payload, now_ms);
        Some(self.router.deliver(ctx, &event))
    }

    /// チャンネルを閉じる（冪等）
    ///
    /// すべてのハンドラを解除し、再接続タイマーを止める。
    ///
    /// # 戻り値
    /// 初回のみ、ホストが実行すべき `Command::Disconnect`（開いているソケットがある場合）
    pub fn close(&mut self) -> Option<Command> {
        self.router.close();
        self.manager.close()
    }

    pub fn is_closed(&self) -> bool {
        self.router.is_closed() || self.manager.is_closed()
    }

    pub fn state(&self) -> ConnectionState {
        if self.router.is_closed() {
            return ConnectionState::Closed;
        }
        self.manager.state()
    }

    pub fn status(&self) -> ChannelStatus {
        let mut status = self.manager.status();
        status.state = self.state();
        status
    }

    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.router.handler_count(kind)
    }
}
