//! 接続状態機械

use std::collections::VecDeque;
use std::fmt;

use livesync_event::Event;
use serde::Serialize;

use crate::config::{ChannelOptions, Credentials, Endpoint};
use crate::error::ConnectionError;

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// 終端状態。`close` でのみ到達する
    Closed,
}

/// 接続試行ごとの世代番号（1 始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        ConnectionId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// ホストが実行すべきトランスポート操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// 新しいソケットを開く
    Connect {
        connection_id: ConnectionId,
        endpoint: String,
        with_credentials: bool,
        /// 直前の成功以降の再試行回数（初回は 0）
        attempt: u32,
    },
    /// ソケットを閉じる
    Disconnect { connection_id: ConnectionId },
}

/// ホスト UI 向けの状態（「再接続中」表示に使う）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub state: ConnectionState,
    /// 一度接続に成功した後、接続が失われている
    pub reconnecting: bool,
    pub retry: u32,
    pub next_retry_at_ms: Option<u64>,
    pub identity: Option<String>,
    pub connection_id: Option<ConnectionId>,
}

/// チャンネルの接続管理（sans-IO）
///
/// 実際のソケット操作は [`Command`] としてホストに依頼し、
/// 結果を `transport_*` メソッドで受け取る。
#[derive(Debug)]
pub struct ConnectionManager {
    endpoint: Endpoint,
    options: ChannelOptions,
    state: ConnectionState,
    /// トランスポートが割り当てた接続識別子（接続中のみ）
    identity: Option<String>,
    /// 直前の成功以降にスケジュールした再試行回数
    retry: u32,
    /// 試行中または確立済みの接続世代
    current: Option<ConnectionId>,
    next_id: u64,
    /// 次の接続試行時刻（Disconnected のときのみ）
    next_attempt_at_ms: Option<u64>,
    ever_connected: bool,
    outbox: VecDeque<Command>,
}

impl ConnectionManager {
    /// 接続を開始する
    ///
    /// 状態は `Connecting` になり、最初の `poll` で `Command::Connect` を返す。
    pub fn open(endpoint: Endpoint, options: ChannelOptions) -> Self {
        let mut manager = ConnectionManager {
            endpoint,
            options,
            state: ConnectionState::Disconnected,
            identity: None,
            retry: 0,
            current: None,
            next_id: 1,
            next_attempt_at_ms: None,
            ever_connected: false,
            outbox: VecDeque::new(),
        };
        manager.start_attempt();
        manager
    }

    /// 送信待ちのコマンドを取り出す。再接続タイマーの期限が来ていれば接続を開始する
    ///
    /// # 引数
    /// - `now_ms`: 現在時刻（JS Date.now()）
    pub fn poll(&mut self, now_ms: u64) -> Vec<Command> {
        if self.state == ConnectionState::Disconnected {
            if let Some(at) = self.next_attempt_at_ms {
                if now_ms >= at {
                    self.start_attempt();
                }
            }
        }
        self.outbox.drain(..).collect()
    }

    /// 次に `poll` を呼ぶべき時刻
    pub fn next_wakeup_ms(&self) -> Option<u64> {
        match self.state {
            ConnectionState::Disconnected => self.next_attempt_at_ms,
            _ => None,
        }
    }

    /// ソケットが開いた
    ///
    /// # 戻り値
    /// 配信すべき `__connected` イベント。古い世代・想定外の状態なら `None`
    pub fn transport_opened(
        &mut self,
        id: ConnectionId,
        identity: &str,
        now_ms: u64,
    ) -> Option<Event> {
        if !self.is_current(id) || self.state != ConnectionState::Connecting {
            tracing::debug!(connection = %id, state = ?self.state, "stale open callback ignored");
            return None;
        }

        let reconnect = self.ever_connected;
        self.transition(ConnectionState::Connected);
        self.identity = Some(identity.to_owned());
        self.retry = 0;
        self.ever_connected = true;

        tracing::info!(connection = %id, identity, reconnect, "channel connected");
        Some(Event::connected(identity, id.raw(), reconnect, now_ms))
    }

    /// 接続試行が失敗した
    ///
    /// # エラー
    /// - `reconnect = false` で再試行を使い切った（[`ConnectionError::Unreachable`]）
    pub fn transport_failed(
        &mut self,
        id: ConnectionId,
        now_ms: u64,
    ) -> Result<(), ConnectionError> {
        if !self.is_current(id) || self.state != ConnectionState::Connecting {
            tracing::debug!(
                connection = %id,
                state = ?self.state,
                "stale failure callback ignored"
            );
            return Ok(());
        }
        tracing::warn!(connection = %id, retry = self.retry, "connection attempt failed");
        self.schedule_retry(now_ms)
    }

    /// 接続が切れた
    ///
    /// 接続前（`Connecting`）の切断は試行失敗として扱う。
    ///
    /// # エラー
    /// - `reconnect = false`（[`ConnectionError::Dropped`]）
    /// - 試行失敗として扱い、再試行を使い切った
    pub fn transport_dropped(
        &mut self,
        id: ConnectionId,
        now_ms: u64,
    ) -> Result<(), ConnectionError> {
        if !self.is_current(id) {
            tracing::debug!(connection = %id, "stale drop callback ignored");
            return Ok(());
        }

        match self.state {
            ConnectionState::Connecting => self.transport_failed(id, now_ms),
            ConnectionState::Connected => {
                tracing::warn!(connection = %id, "connection dropped");
                self.identity = None;
                if !self.options.reconnect {
                    self.current = None;
                    self.transition(ConnectionState::Disconnected);
                    return Err(ConnectionError::Dropped);
                }
                self.schedule_retry(now_ms)
            }
            ConnectionState::Disconnected | ConnectionState::Closed => Ok(()),
        }
    }

    /// 確立済みの現在の接続から来たコールバックか
    pub fn accepts_events_from(&self, id: ConnectionId) -> bool {
        self.state == ConnectionState::Connected && self.is_current(id)
    }

    /// クローズする（冪等）
    ///
    /// # 戻り値
    /// 初回のみ、開いている（開こうとしている）ソケットを閉じる `Command::Disconnect`
    pub fn close(&mut self) -> Option<Command> {
        if self.state == ConnectionState::Closed {
            return None;
        }

        self.transition(ConnectionState::Closed);
        self.next_attempt_at_ms = None;
        self.identity = None;
        self.outbox.clear();
        tracing::info!(endpoint = self.endpoint.as_str(), "channel closed");

        self.current
            .take()
            .map(|connection_id| Command::Disconnect { connection_id })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            state: self.state,
            reconnecting: self.ever_connected
                && matches!(
                    self.state,
                    ConnectionState::Disconnected | ConnectionState::Connecting
                ),
            retry: self.retry,
            next_retry_at_ms: self.next_wakeup_ms(),
            identity: self.identity.clone(),
            connection_id: self.current,
        }
    }

    // ===== Private メソッド =====

    fn is_current(&self, id: ConnectionId) -> bool {
        self.current == Some(id)
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "connection state changed");
            self.state = next;
        }
    }

    /// 新しい世代で接続を開始し、Connect コマンドを積む
    fn start_attempt(&mut self) {
        let connection_id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.current = Some(connection_id);
        self.next_attempt_at_ms = None;
        self.transition(ConnectionState::Connecting);

        self.outbox.push_back(Command::Connect {
            connection_id,
            endpoint: self.endpoint.as_str().to_owned(),
            with_credentials: self.options.credentials == Credentials::Include,
            attempt: self.retry,
        });
    }

    /// Disconnected に戻し、再試行を予約する
    fn schedule_retry(&mut self, now_ms: u64) -> Result<(), ConnectionError> {
        self.current = None;
        self.transition(ConnectionState::Disconnected);

        let schedule = &self.options.backoff_schedule_ms;
        if !self.options.reconnect && self.retry as usize >= schedule.len() {
            let attempts = self.retry.saturating_add(1);
            tracing::warn!(attempts, "retries exhausted; giving up");
            return Err(ConnectionError::Unreachable { attempts });
        }

        let delay = schedule.delay_for(self.retry);
        self.retry = self.retry.saturating_add(1);
        self.next_attempt_at_ms = Some(now_ms.saturating_add(delay));

        tracing::info!(retry = self.retry, delay_ms = delay, "reconnect scheduled");
        Ok(())
    }
}
