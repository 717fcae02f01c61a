//! Telegram Bot API channel

use super::MessagingChannel;
use crate::config::DeliveryConfig;
use crate::error::{Error, Result, SendError};
use crate::types::{ChatId, DeliveryMethod, MediaAsset};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Wait used when a 429 response carries no `retry_after`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Sends messages through the Telegram Bot API
///
/// Each call is a single HTTP request; retries are the dispatcher's job.
#[derive(Clone)]
pub struct TelegramChannel {
    http_client: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // endpoint embeds the bot token
        f.debug_struct("TelegramChannel").finish_non_exhaustive()
    }
}

impl TelegramChannel {
    /// Create a channel for the given bot token
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(bot_token: &str, config: &DeliveryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.send_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!(
                "{}/bot{}",
                config.telegram_api_url.trim_end_matches('/'),
                bot_token
            ),
        })
    }

    async fn call(
        &self,
        api_method: &str,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<(), SendError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        let parsed: Option<ApiResponse> = serde_json::from_slice(&body).ok();

        if status.is_success() && parsed.as_ref().is_none_or(|r| r.ok) {
            tracing::debug!(api_method, "bot api call succeeded");
            return Ok(());
        }

        let description = parsed
            .as_ref()
            .and_then(|r| r.description.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status.as_u16() == 429 {
            let retry_after = parsed
                .and_then(|r| r.parameters)
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(SendError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(SendError::Transient(format!("{api_method}: {description}")));
        }
        Err(SendError::Rejected(format!("{api_method}: {description}")))
    }
}

#[async_trait]
impl MessagingChannel for TelegramChannel {
    async fn send_media(
        &self,
        chat: &ChatId,
        asset: &MediaAsset,
        method: DeliveryMethod,
        caption: Option<&str>,
    ) -> std::result::Result<(), SendError> {
        let (api_method, field) = match method {
            DeliveryMethod::Photo => ("sendPhoto", "photo"),
            DeliveryMethod::Video => ("sendVideo", "video"),
            DeliveryMethod::Document => ("sendDocument", "document"),
        };

        let data = tokio::fs::read(asset.local_path()).await?;
        let part = Part::bytes(data).file_name(asset.file_name());
        let mut form = Form::new()
            .text("chat_id", chat.to_string())
            .part(field, part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        if method == DeliveryMethod::Video {
            form = form.text("supports_streaming", "true");
        }

        let request = self
            .http_client
            .post(format!("{}/{api_method}", self.endpoint))
            .multipart(form);
        self.call(api_method, request).await
    }

    async fn send_text(&self, chat: &ChatId, text: &str) -> std::result::Result<(), SendError> {
        let request = self
            .http_client
            .post(format!("{}/sendMessage", self.endpoint))
            .json(&serde_json::json!({ "chat_id": chat.0, "text": text }));
        self.call("sendMessage", request).await
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> TelegramChannel {
        let config = DeliveryConfig {
            telegram_api_url: server.uri(),
            ..Default::default()
        };
        TelegramChannel::new("123:abc", &config).unwrap()
    }

    fn asset(dir: &std::path::Path, kind: MediaKind) -> MediaAsset {
        let mut file = tempfile::Builder::new()
            .suffix(".jpg")
            .tempfile_in(dir)
            .unwrap();
        file.write_all(b"jpegdata").unwrap();
        MediaAsset::new(kind, file.into_temp_path(), 8, "p1".into())
    }

    #[tokio::test]
    async fn photo_upload_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .and(body_string_contains("name=\"photo\""))
            .and(body_string_contains("nice comment"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        channel_for(&server)
            .send_media(
                &ChatId(42),
                &asset(dir.path(), MediaKind::Image),
                DeliveryMethod::Photo,
                Some("nice comment"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendVideo"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 7",
                "parameters": {"retry_after": 7}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = channel_for(&server)
            .send_media(
                &ChatId(42),
                &asset(dir.path(), MediaKind::Video),
                DeliveryMethod::Video,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SendError::RateLimited {
                retry_after: Duration::from_secs(7)
            }
        );
    }

    #[tokio::test]
    async fn bad_request_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: file is too big"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = channel_for(&server)
            .send_media(
                &ChatId(42),
                &asset(dir.path(), MediaKind::Image),
                DeliveryMethod::Document,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SendError::Rejected(ref reason) if reason.contains("file is too big")
        ));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = channel_for(&server)
            .send_text(&ChatId(42), "No posts found.")
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Transient(_)));
    }

    #[tokio::test]
    async fn connection_errors_do_not_expose_token() {
        let config = DeliveryConfig {
            // nothing listens on port 1
            telegram_api_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let channel = TelegramChannel::new("123456:SECRET-TOKEN", &config).unwrap();

        let err = channel.send_text(&ChatId(42), "hello").await.unwrap_err();
        assert!(matches!(err, SendError::Transient(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"), "leaked: {err}");

        let dir = tempfile::tempdir().unwrap();
        let err = channel
            .send_media(
                &ChatId(42),
                &asset(dir.path(), MediaKind::Image),
                DeliveryMethod::Photo,
                None,
            )
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("SECRET-TOKEN"), "leaked: {err}");
    }

    #[test]
    fn debug_output_hides_token() {
        let channel = TelegramChannel::new("123:secret", &DeliveryConfig::default()).unwrap();
        assert!(!format!("{channel:?}").contains("secret"));
    }
}
