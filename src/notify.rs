//! 通知：向固定的 Telegram 会话发送文本消息
//!
//! 只报告成功 / 失败，不在内部重试。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::NotifyError;

/// 通知投递
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Telegram Bot API 通知
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            token: token.into(),
            chat_id,
        }
    }

    /// 替换 API 地址（自建代理或测试）
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let req = SendMessageRequest {
            chat_id: self.chat_id,
            text,
        };
        let resp = self.client.post(self.endpoint()).json(&req).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(ApiResponse { description, .. }) => {
                let description = description.unwrap_or(body);
                tracing::warn!(status = status.as_u16(), "发送 Telegram 消息通知失败: {}", description);
                Err(NotifyError::Api {
                    status: status.as_u16(),
                    description,
                })
            }
            None => {
                tracing::warn!(status = status.as_u16(), "发送 Telegram 消息通知失败: {}", body);
                Err(NotifyError::Api {
                    status: status.as_u16(),
                    description: body,
                })
            }
        }
    }
}
