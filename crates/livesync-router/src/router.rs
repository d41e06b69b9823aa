//! Router 実装

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use livesync_event::{Event, EventKind};

use crate::error::{HandlerError, HandlerFailure, RouterError};

/// 登録ごとに払い出される識別子
///
/// クロージャ同士は比較できないため、`off` にはこの値を渡す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// ホスト（JS）から戻ってきた数値を HandlerId に戻す
    pub fn from_raw(raw: u64) -> Self {
        HandlerId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// チャンネルのクローズフラグ
///
/// クローン間で共有される。一度立てたら戻らない。
#[derive(Debug, Clone, Default)]
pub struct CloseHandle(Arc<AtomicBool>);

impl CloseHandle {
    pub fn close(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 1 件の配信結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// 呼び出したハンドラ数（失敗を含む）
    pub invoked: usize,
    /// 失敗したハンドラ数
    pub failed: usize,
}

type Handler<C> = Box<dyn FnMut(&mut C, &Event) -> Result<(), HandlerError>>;
type ErrorSink = Box<dyn FnMut(&HandlerFailure)>;

struct Registration<C> {
    id: HandlerId,
    handler: Handler<C>,
}

/// kind → ハンドラ列のレジストリ
///
/// `C` はハンドラに渡す可変コンテキスト（ビューの統合状態など）。
pub struct Router<C> {
    handlers: HashMap<EventKind, Vec<Registration<C>>>,
    next_id: u64,
    closed: CloseHandle,
    on_error: Option<ErrorSink>,
}

impl<C> Router<C> {
    pub fn new() -> Self {
        Router {
            handlers: HashMap::new(),
            next_id: 1,
            closed: CloseHandle::default(),
            on_error: None,
        }
    }

    /// ハンドラを登録する
    ///
    /// 同じ kind に複数登録した場合、配信は登録順。
    ///
    /// # エラー
    /// - クローズ済み
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> Result<HandlerId, RouterError>
    where
        F: FnMut(&mut C, &Event) -> Result<(), HandlerError> + 'static,
    {
        if self.is_closed() {
            return Err(RouterError::Closed);
        }

        let id = HandlerId(self.next_id);
        self.next_id += 1;

        tracing::debug!(kind = %kind, handler = %id, "handler registered");
        self.handlers.entry(kind).or_default().push(Registration {
            id,
            handler: Box::new(handler),
        });
        Ok(id)
    }

    /// 登録を解除する。見つからなければ何もしない
    ///
    /// # 戻り値
    /// 解除した場合は `true`
    pub fn off(&mut self, kind: &EventKind, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(kind) else {
            return false;
        };

        let before = list.len();
        list.retain(|reg| reg.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(kind);
        }
        if removed {
            tracing::debug!(kind = %kind, handler = %id, "handler removed");
        }
        removed
    }

    /// kind に登録されているハンドラ数
    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.handlers.get(kind).map_or(0, Vec::len)
    }

    /// ハンドラ失敗の報告先を設定する
    pub fn set_error_sink<F>(&mut self, sink: F)
    where
        F: FnMut(&HandlerFailure) + 'static,
    {
        self.on_error = Some(Box::new(sink));
    }

    /// 共有クローズフラグを返す
    ///
    /// 配信中のハンドラからでもこのハンドルでチャンネルを止められる。
    pub fn close_handle(&self) -> CloseHandle {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// クローズする: フラグを立て、すべての登録を解除する（冪等）
    pub fn close(&mut self) {
        self.closed.close();
        self.handlers.clear();
    }

    /// イベントを配信する
    ///
    /// 各ハンドラの直前にクローズフラグを確認し、立っていれば以降を呼ばない。
    /// ハンドラのエラー・panic は捕捉してエラーシンクへ報告し、次へ進む。
    pub fn deliver(&mut self, ctx: &mut C, event: &Event) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let Some(list) = self.handlers.get_mut(event.kind()) else {
            tracing::trace!(kind = %event.kind(), "no handlers for event");
            return report;
        };

        for reg in list.iter_mut() {
            if self.closed.is_closed() {
                tracing::debug!(kind = %event.kind(), "channel closed during delivery; stopping");
                break;
            }

            report.invoked += 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (reg.handler)(ctx, event)))
                .unwrap_or_else(|payload| {
                    Err(HandlerError::Panicked(panic_message(payload.as_ref())))
                });

            if let Err(error) = outcome {
                report.failed += 1;
                tracing::warn!(kind = %event.kind(), handler = %reg.id, %error, "handler failed");

                if let Some(sink) = self.on_error.as_mut() {
                    sink(&HandlerFailure {
                        kind: event.kind().clone(),
                        handler: reg.id,
                        error,
                    });
                }
            }
        }

        report
    }
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
