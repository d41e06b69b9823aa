//! # livesync-wasm
//!
//! wasm-bindgen エクスポート：運用ダッシュボード（ブラウザ）から呼び出す公開 API。
//!
//! ## 使用方法（TypeScript）
//!
//! ```typescript
//! import { LiveView, initPanicHook, initLogging } from '../livesync-wasm-pkg/livesync_wasm';
//!
//! initPanicHook();
//! initLogging("info");
//!
//! // ビューのマウント時に作成し、アンマウント時に close() する
//! const view = new LiveView("wss://ops.example.com/live");
//! view.registerFeed("orchestration-task-update", "tasks", "upsert", 50, "id");
//! view.registerFeed("agent-activity-new", "activity", "prepend", 100);
//! view.registerFeed("funding-total-update", "funding", "replace", 0);
//! view.on("low-stock-alert", (payload) => toast(payload.sku));
//! view.subscribe((slices) => render(view.snapshotAll()));
//! view.setHydrator(() => fetch("/api/dashboard").then((r) => r.json()));
//! view.mount(Date.now());
//!
//! // トランスポート操作（poll が返すコマンドを実行する）
//! for (const cmd of view.poll(Date.now())) {
//!     if (cmd.type === "connect") {
//!         const ws = new WebSocket(cmd.endpoint);
//!         ws.onopen = () => view.transportOpened(cmd.connectionId, ws.url, Date.now());
//!         ws.onmessage = (m) => {
//!             const { kind, payload } = JSON.parse(m.data);
//!             view.receive(cmd.connectionId, kind, JSON.stringify(payload), Date.now());
//!         };
//!         ws.onclose = () => view.transportDropped(cmd.connectionId, Date.now());
//!     }
//! }
//!
//! // 再接続タイマー
//! const at = view.nextWakeupMs();
//! if (at !== undefined) setTimeout(() => view.poll(Date.now()), at - Date.now());
//! ```

use wasm_bindgen::prelude::*;

pub mod client;
pub mod error;
pub mod logging;
pub mod view;

pub use client::LiveView;
pub use error::ViewError;
pub use view::{ViewContext, ViewCore};

/// パニック時にブラウザコンソールにスタックトレースを出力する
///
/// 開発時に必ず呼び出すこと。本番ビルドでは feature flag で無効化可能。
#[wasm_bindgen(js_name = "initPanicHook")]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// tracing のログをコンソールに出力する
///
/// # 引数
/// - `level`: `"trace"` / `"debug"` / `"info"` / `"warn"` / `"error"`。省略時は `"info"`
///
/// # 戻り値
/// 今回設定した場合は `true`（2 回目以降は `false`）
///
/// # エラー
/// - レベル名が不正
#[wasm_bindgen(js_name = "initLogging")]
pub fn init_logging(level: Option<String>) -> Result<bool, JsError> {
    let level = logging::parse_level(level.as_deref())
        .ok_or_else(|| JsError::new(&format!("Unknown log level: {:?}", level)))?;
    Ok(logging::install(level))
}
