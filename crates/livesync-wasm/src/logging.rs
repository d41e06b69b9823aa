//! tracing → ブラウザ / Node.js コンソール
//!
//! fmt サブスクライバの出力先を `console.*` に差し替える。1 イベント = 1 行で、
//! レベルに応じて `console.error` / `warn` / `info` / `debug` を使い分ける。

use std::io;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// 1 イベント分の出力をためて、drop 時にコンソールへ書き出す
pub struct ConsoleWriter {
    level: Level,
    buf: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.buf);
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let line = wasm_bindgen::JsValue::from_str(line);
        match self.level {
            Level::ERROR => web_sys::console::error_1(&line),
            Level::WARN => web_sys::console::warn_1(&line),
            Level::INFO => web_sys::console::info_1(&line),
            _ => web_sys::console::debug_1(&line),
        }
    }
}

/// [`ConsoleWriter`] を払い出す `MakeWriter`
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeConsoleWriter;

impl<'a> MakeWriter<'a> for MakeConsoleWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            level: Level::INFO,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            level: *meta.level(),
            buf: Vec::new(),
        }
    }
}

/// レベル名を解釈する（大文字小文字は区別しない）。省略時は `info`
pub fn parse_level(level: Option<&str>) -> Option<Level> {
    level.unwrap_or("info").parse().ok()
}

/// グローバルサブスクライバを設定する
///
/// 2 回目以降の呼び出しは何もしない。
///
/// # 戻り値
/// 今回設定した場合は `true`
pub fn install(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_writer(MakeConsoleWriter)
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .with_target(true)
        .try_init()
        .is_ok()
}
