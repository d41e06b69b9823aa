//! チャンネル設定
//!
//! ホストは camelCase の JSON でオプションを渡す。省略したフィールドは既定値：
//!
//! ```json
//! {
//!   "credentials": "include",
//!   "reconnect": true,
//!   "backoffScheduleMs": [1000, 2000, 5000, 10000]
//! }
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::{DEFAULT_BACKOFF_SCHEDULE_MS, ENDPOINT_ENV};

/// イベントソースのアドレス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(Url);

impl Endpoint {
    /// URL を検証して生成する
    ///
    /// # エラー
    /// - URL として不正
    /// - スキームが ws / wss / http / https 以外
    pub fn parse(endpoint: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            source,
        })?;

        match url.scheme() {
            "ws" | "wss" | "http" | "https" => Ok(Endpoint(url)),
            other => Err(ConfigError::UnsupportedScheme(other.to_owned())),
        }
    }

    /// 環境変数 [`ENDPOINT_ENV`] から読む（ネイティブホスト用）
    pub fn from_env() -> Result<Self, ConfigError> {
        let value =
            std::env::var(ENDPOINT_ENV).map_err(|_| ConfigError::MissingEndpoint(ENDPOINT_ENV))?;
        Endpoint::parse(&value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// クロスオリジン接続に資格情報を付けるか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credentials {
    #[default]
    Include,
    Omit,
}

/// 再接続の待ち時間列（ミリ秒）
///
/// n 回目の再試行は `delays[n]` を使い、列を超えたら最後の値を使い続ける。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackoffSchedule(Vec<u64>);

impl BackoffSchedule {
    /// # エラー
    /// - 空の列
    pub fn new(delays: Vec<u64>) -> Result<Self, ConfigError> {
        if delays.is_empty() {
            return Err(ConfigError::EmptyBackoffSchedule);
        }
        Ok(BackoffSchedule(delays))
    }

    /// `retry` 回目（0 始まり）の待ち時間
    pub fn delay_for(&self, retry: u32) -> u64 {
        let index = (retry as usize).min(self.0.len().saturating_sub(1));
        self.0.get(index).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        BackoffSchedule(DEFAULT_BACKOFF_SCHEDULE_MS.to_vec())
    }
}

/// `open` に渡すオプション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ChannelOptions {
    pub credentials: Credentials,
    /// 切断後に自動で再接続するか
    pub reconnect: bool,
    pub backoff_schedule_ms: BackoffSchedule,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions {
            credentials: Credentials::default(),
            reconnect: true,
            backoff_schedule_ms: BackoffSchedule::default(),
        }
    }
}

impl ChannelOptions {
    /// JSON 文字列から読み込んで検証する
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: ChannelOptions = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// # エラー
    /// - 再接続スケジュールが空（`[]` を直接デシリアライズした場合）
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_schedule_ms.is_empty() {
            return Err(ConfigError::EmptyBackoffSchedule);
        }
        Ok(())
    }
}
