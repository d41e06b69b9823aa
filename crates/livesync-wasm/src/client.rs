//! LiveView wasm-bindgen エクスポート
//!
//! ダッシュボードのビュー 1 つにつき 1 インスタンス。ソケットとタイマーは
//! JS 側が持ち、結果をメソッド呼び出しで知らせる（sans-IO）。

use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use js_sys::{Array, Function, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};

use livesync_channel::{ChannelOptions, Command, ConnectionId};
use livesync_event::Event;
use livesync_reduce::{HydrationOutcome, HydrationTicket};
use livesync_router::{CloseHandle, HandlerError, HandlerId};

use crate::view::{id_from_host, ViewCore};

/// JS から登録されたコールバック
#[derive(Default)]
struct Hooks {
    /// 描画通知（変化したスライス名の配列を受け取る）
    listeners: RefCell<Vec<Function>>,
    /// `() => Promise<InitialState>`
    hydrator: RefCell<Option<Function>>,
    /// `(message, kind?) => void`
    on_error: RefCell<Option<Function>>,
}

/// ビュー 1 つ分のライブ同期
///
/// ## 内部アーキテクチャ
///
/// ```text
/// LiveView
///   ├── ViewCore   - Channel（接続管理 + Router）+ ReconciledState
///   ├── CloseHandle - 配信中のハンドラからでも立てられるクローズフラグ
///   └── Hooks      - 描画通知・再取得・エラー報告の JS コールバック
/// ```
///
/// ## 再入
///
/// JS ハンドラは配信中に同期的に呼ばれる。その中から `close()` は呼べるが
/// （`Command::Disconnect` は次の `poll` で返る）、それ以外のメソッドは
/// エラーになる。
#[wasm_bindgen]
pub struct LiveView {
    core: Rc<RefCell<ViewCore>>,
    close_handle: CloseHandle,
    hooks: Rc<Hooks>,
}

#[wasm_bindgen]
impl LiveView {
    /// チャンネルを開く
    ///
    /// # 引数
    /// - `endpoint`: イベントソースの URL（ws / wss / http / https）
    /// - `options_json`: `{"credentials":"omit","reconnect":true,"backoffScheduleMs":[...]}`。
    ///   省略時はすべて既定値
    ///
    /// # エラー
    /// - URL が不正
    /// - オプション JSON が不正
    ///
    /// # 例（TypeScript）
    /// ```typescript
    /// const view = new LiveView("wss://ops.example.com/live");
    /// const quiet = new LiveView(url, JSON.stringify({ reconnect: false }));
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(endpoint: &str, options_json: Option<String>) -> Result<LiveView, JsError> {
        let options = match options_json.as_deref() {
            Some(json) => ChannelOptions::from_json(json)
                .map_err(|e| JsError::new(&format!("Invalid channel options: {}", e)))?,
            None => ChannelOptions::default(),
        };
        let core = ViewCore::open(endpoint, options)
            .map_err(|e| JsError::new(&format!("Failed to open channel: {}", e)))?;
        let close_handle = core.close_handle();

        Ok(LiveView {
            core: Rc::new(RefCell::new(core)),
            close_handle,
            hooks: Rc::default(),
        })
    }

    /// `kind` のイベントを `slice` に統合するリデューサを登録する
    ///
    /// # 引数
    /// - `policy`: `"upsert"` / `"prepend"` / `"replace"`
    /// - `capacity`: フィードの最大件数（replace では無視）
    /// - `key_path`: upsert のキー（例: `"id"`, `"task.id"`）
    ///
    /// # 戻り値
    /// `off` に渡すハンドラ ID
    #[wasm_bindgen(js_name = "registerFeed")]
    pub fn register_feed(
        &self,
        kind: &str,
        slice: &str,
        policy: &str,
        capacity: f64,
        key_path: Option<String>,
    ) -> Result<f64, JsError> {
        let id = self
            .core_mut()?
            .register_feed_from_host(kind, slice, policy, capacity, key_path.as_deref())?;
        Ok(id.raw() as f64)
    }

    /// 副作用ハンドラを登録する。`handler(payload, kind)` の形で呼ばれる
    ///
    /// 例外を投げても他のハンドラへの配信は続く（`onError` に報告される）。
    pub fn on(&self, kind: &str, handler: Function) -> Result<f64, JsError> {
        let id = self.core_mut()?.on(kind, move |event: &Event| {
            let payload = js_sys::JSON::parse(&event.payload().to_string())
                .map_err(|e| HandlerError::rejected(js_error_message(&e)))?;
            handler
                .call2(&JsValue::NULL, &payload, &JsValue::from_str(event.kind().as_str()))
                .map(|_| ())
                .map_err(|e| HandlerError::rejected(js_error_message(&e)))
        })?;
        Ok(id.raw() as f64)
    }

    /// 登録を解除する。見つからなければ何もしない
    pub fn off(&self, kind: &str, id: f64) -> Result<bool, JsError> {
        let id = HandlerId::from_raw(id_from_host(id)?);
        Ok(self.core_mut()?.off(kind, id))
    }

    /// 描画通知を登録する。変化したスライス名の配列で呼ばれる
    pub fn subscribe(&self, listener: Function) {
        self.hooks.listeners.borrow_mut().push(listener);
    }

    /// ハンドラ失敗・再取得失敗の報告先。`(message, kind?)` で呼ばれる
    #[wasm_bindgen(js_name = "onError")]
    pub fn on_error(&self, callback: Function) {
        *self.hooks.on_error.borrow_mut() = Some(callback);
    }

    /// 初期取得関数 `() => Promise<InitialState>` を設定する
    ///
    /// InitialState はスライス名をキーとするオブジェクト。
    #[wasm_bindgen(js_name = "setHydrator")]
    pub fn set_hydrator(&self, fetch: Function) {
        *self.hooks.hydrator.borrow_mut() = Some(fetch);
    }

    /// ビューのマウント: 初期取得を開始する
    pub fn mount(&self, now_ms: f64) -> Result<(), JsError> {
        let ticket = self.core_mut()?.mount(now_ms as u64);
        self.spawn_hydration(ticket);
        Ok(())
    }

    /// 実行すべきトランスポート操作を取り出す
    ///
    /// # 戻り値
    /// `{type:"connect", connectionId, endpoint, withCredentials, attempt}` /
    /// `{type:"disconnect", connectionId}` の配列
    pub fn poll(&self, now_ms: f64) -> Result<Array, JsError> {
        let commands = self.core_mut()?.poll(now_ms as u64);
        commands_to_js(&commands)
    }

    /// 次に `poll` を呼ぶべき時刻（`Date.now()` 基準）。予定がなければ undefined
    #[wasm_bindgen(js_name = "nextWakeupMs")]
    pub fn next_wakeup_ms(&self) -> Result<Option<f64>, JsError> {
        Ok(self.core()?.next_wakeup_ms().map(|at| at as f64))
    }

    /// ソケットが開いた。再接続なら再取得を開始する
    #[wasm_bindgen(js_name = "transportOpened")]
    pub fn transport_opened(
        &self,
        connection_id: f64,
        identity: &str,
        now_ms: f64,
    ) -> Result<(), JsError> {
        let id = ConnectionId::new(id_from_host(connection_id)?);
        let ticket = self.core_mut()?.transport_opened(id, identity, now_ms as u64);
        if let Some(ticket) = ticket {
            self.spawn_hydration(ticket);
        }
        flush(&self.core, &self.hooks);
        Ok(())
    }

    /// 接続試行が失敗した
    ///
    /// # エラー
    /// - `reconnect: false` で再試行を使い切った
    #[wasm_bindgen(js_name = "transportFailed")]
    pub fn transport_failed(&self, connection_id: f64, now_ms: f64) -> Result<(), JsError> {
        let id = ConnectionId::new(id_from_host(connection_id)?);
        self.core_mut()?.transport_failed(id, now_ms as u64)?;
        Ok(())
    }

    /// 接続が切れた
    ///
    /// # エラー
    /// - `reconnect: false`
    #[wasm_bindgen(js_name = "transportDropped")]
    pub fn transport_dropped(&self, connection_id: f64, now_ms: f64) -> Result<(), JsError> {
        let id = ConnectionId::new(id_from_host(connection_id)?);
        self.core_mut()?.transport_dropped(id, now_ms as u64)?;
        Ok(())
    }

    /// 受信イベントを配信する
    ///
    /// # 戻り値
    /// 配信した場合は `true`（クローズ後・古い接続からのイベントは `false`）
    ///
    /// # エラー
    /// - kind が空、ペイロードが JSON として不正
    pub fn receive(
        &self,
        connection_id: f64,
        kind: &str,
        payload_json: &str,
        now_ms: f64,
    ) -> Result<bool, JsError> {
        let id = ConnectionId::new(id_from_host(connection_id)?);
        let report = self.core_mut()?.receive(id, kind, payload_json, now_ms as u64)?;
        flush(&self.core, &self.hooks);
        Ok(report.is_some())
    }

    /// スライスの現在値。未登録なら undefined
    pub fn snapshot(&self, slice: &str) -> Result<JsValue, JsError> {
        match self.core()?.snapshot(slice) {
            Some(value) => json_to_js(&value.to_string()),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// 全スライスをスライス名キーのオブジェクトで返す
    #[wasm_bindgen(js_name = "snapshotAll")]
    pub fn snapshot_all(&self) -> Result<JsValue, JsError> {
        let json = self.core()?.snapshot_all().to_string();
        json_to_js(&json)
    }

    /// 接続状態
    ///
    /// `{state, reconnecting, retry, nextRetryAtMs, identity, connectionId}`。
    /// 「再接続中」表示に使う。
    pub fn status(&self) -> Result<JsValue, JsError> {
        let json = serde_json::to_string(&self.core()?.status())?;
        json_to_js(&json)
    }

    /// ビューのアンマウント: チャンネルを閉じる（冪等）
    ///
    /// # 戻り値
    /// 初回のみ `{type:"disconnect", connectionId}`。以降と、配信中の
    /// ハンドラから呼んだ場合は null（後者の Disconnect は次の `poll` で返る）
    pub fn close(&self) -> Result<JsValue, JsError> {
        self.close_handle.close();
        self.hooks.listeners.borrow_mut().clear();
        *self.hooks.hydrator.borrow_mut() = None;

        let command = match self.core.try_borrow_mut() {
            Ok(mut core) => core.close(),
            Err(_) => {
                tracing::debug!("close requested during delivery; finishing on next poll");
                return Ok(JsValue::NULL);
            }
        };
        match command {
            Some(command) => json_to_js(&serde_json::to_string(&command)?),
            None => Ok(JsValue::NULL),
        }
    }
}

impl LiveView {
    fn core(&self) -> Result<std::cell::Ref<'_, ViewCore>, JsError> {
        self.core
            .try_borrow()
            .map_err(|_| JsError::new("LiveView is busy: re-entrant call from an event handler"))
    }

    fn core_mut(&self) -> Result<RefMut<'_, ViewCore>, JsError> {
        self.core
            .try_borrow_mut()
            .map_err(|_| JsError::new("LiveView is busy: re-entrant call from an event handler"))
    }

    /// 取得関数を独立したタスクとして実行し、完了したら結果を取り込む
    ///
    /// 配信経路上では待たない。
    fn spawn_hydration(&self, ticket: HydrationTicket) {
        let Some(fetch) = self.hooks.hydrator.borrow().clone() else {
            tracing::debug!(seq = ticket.seq, "no hydrator set; fetch skipped");
            return;
        };
        let core = Rc::clone(&self.core);
        let hooks = Rc::clone(&self.hooks);

        spawn_local(async move {
            let fetched = match fetch.call0(&JsValue::NULL) {
                Ok(promise) => JsFuture::from(Promise::resolve(&promise)).await,
                Err(e) => Err(e),
            };
            let json = match fetched {
                Ok(value) => js_sys::JSON::stringify(&value).ok().and_then(|s| s.as_string()),
                Err(e) => {
                    let message = js_error_message(&e);
                    tracing::warn!(seq = ticket.seq, error = %message, "hydration fetch failed");
                    report_error(&hooks, &format!("hydration fetch failed: {}", message), None);
                    return;
                }
            };
            let Some(json) = json else {
                report_error(&hooks, "hydration fetch resolved to a non-JSON value", None);
                return;
            };

            let outcome = match core.try_borrow_mut() {
                Ok(mut view) => view.complete_hydration_json(ticket, &json, now_ms()),
                Err(_) => {
                    tracing::warn!(seq = ticket.seq, "view busy; hydration result dropped");
                    return;
                }
            };
            match outcome {
                Ok(HydrationOutcome::Applied(slices)) => {
                    tracing::debug!(
                        seq = ticket.seq,
                        slices = slices.len(),
                        "hydration result applied"
                    );
                }
                Ok(HydrationOutcome::Superseded) => {}
                Err(e) => report_error(&hooks, &e.to_string(), None),
            }
            flush(&core, &hooks);
        });
    }
}

/// 変化したスライスを描画通知へ、ハンドラ失敗をエラー報告へ流す
///
/// ビューの借用を解いてから JS を呼ぶ。
fn flush(core: &RefCell<ViewCore>, hooks: &Hooks) {
    let (changed, failures) = match core.try_borrow_mut() {
        Ok(mut view) => (view.take_changed(), view.take_failures()),
        Err(_) => return,
    };

    for failure in &failures {
        report_error(hooks, &failure.error.to_string(), Some(failure.kind.as_str()));
    }

    if changed.is_empty() {
        return;
    }
    let names: Array = changed.iter().map(|s| JsValue::from_str(s.as_str())).collect();
    let listeners = hooks.listeners.borrow().clone();
    for listener in listeners {
        if let Err(e) = listener.call1(&JsValue::NULL, &names) {
            tracing::warn!(error = %js_error_message(&e), "render listener threw");
        }
    }
}

fn report_error(hooks: &Hooks, message: &str, kind: Option<&str>) {
    let Some(callback) = hooks.on_error.borrow().clone() else {
        return;
    };
    let kind = kind.map_or(JsValue::UNDEFINED, JsValue::from_str);
    if let Err(e) = callback.call2(&JsValue::NULL, &JsValue::from_str(message), &kind) {
        tracing::warn!(error = %js_error_message(&e), "error callback threw");
    }
}

fn commands_to_js(commands: &[Command]) -> Result<Array, JsError> {
    let out = Array::new();
    for command in commands {
        out.push(&json_to_js(&serde_json::to_string(command)?)?);
    }
    Ok(out)
}

fn json_to_js(json: &str) -> Result<JsValue, JsError> {
    js_sys::JSON::parse(json).map_err(|e| {
        JsError::new(&format!("JSON conversion failed: {}", js_error_message(&e)))
    })
}

fn js_error_message(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{:?}", value)
}

fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}
