//! HTTP access to external moderation ("banphrase") APIs.
//!
//! The banphrase engine only sees the [`ModerationApi`] trait, which lets the
//! tests swap in canned verdicts and failures without a network. The default
//! implementation talks to pajbot-compatible endpoints over reqwest:
//!
//! ```text
//! POST {base_url}/api/v1/banphrases/test
//! { "message": "..." }
//! => { "banned": true, "banphrase_data": { "phrase": "..." } }
//! ```

use std::time::Duration;
use async_trait::async_trait;
use reqwest;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BanphraseData {
    #[serde(default)]
    pub phrase: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModerationVerdict {
    pub banned: bool,
    #[serde(default)]
    pub banphrase_data: Option<BanphraseData>,
}

impl ModerationVerdict {
    pub fn phrase(&self) -> Option<&str> {
        self.banphrase_data.as_ref().and_then(|d| d.phrase.as_deref())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModerationError {
    #[error("moderation API timed out")]
    Timeout,
    #[error("moderation API returned status {0}")]
    Status(u16),
    #[error("moderation API request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for ModerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ModerationError::Timeout
        } else if let Some(status) = e.status() {
            ModerationError::Status(status.as_u16())
        } else {
            ModerationError::Other(e.to_string())
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationApi: Send + Sync {
    async fn test_message(&self, base_url: &str, message: &str) -> Result<ModerationVerdict, ModerationError>;
}

#[derive(Clone)]
pub struct PajbotModerationClient {
    client: reqwest::Client,
    timeout: Duration,
    retries: u32,
}

impl PajbotModerationClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            retries: 1,
        }
    }

    async fn attempt(&self, url: &str, message: &str) -> Result<ModerationVerdict, ModerationError> {
        let response = self.client
            .post(url)
            .json(&json!({ "message": message }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModerationError::Status(status.as_u16()));
        }

        let verdict = response.json::<ModerationVerdict>().await?;
        Ok(verdict)
    }
}

#[async_trait]
impl ModerationApi for PajbotModerationClient {
    async fn test_message(&self, base_url: &str, message: &str) -> Result<ModerationVerdict, ModerationError> {
        let url = format!("{}/api/v1/banphrases/test", base_url.trim_end_matches('/'));

        let mut last_error = ModerationError::Other("no attempt made".to_string());
        for attempt in 0..=self.retries {
            match self.attempt(&url, message).await {
                Ok(verdict) => {
                    debug!("Moderation API {} => banned={}", url, verdict.banned);
                    return Ok(verdict);
                }
                Err(e) => {
                    warn!("Moderation API {} attempt {} failed: {}", url, attempt + 1, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_banned_verdict_is_parsed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/banphrases/test")
                .json_body(json!({ "message": "bad words" }));
            then.status(200)
                .json_body(json!({ "banned": true, "banphrase_data": { "phrase": "bad" } }));
        });

        let client = PajbotModerationClient::new(Duration::from_secs(2));
        let verdict = client.test_message(&server.base_url(), "bad words").await.unwrap();
        mock.assert();
        assert!(verdict.banned);
        assert_eq!(verdict.phrase(), Some("bad"));
    }

    #[tokio::test]
    async fn test_clean_verdict_without_data() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/banphrases/test");
            then.status(200).json_body(json!({ "banned": false, "banphrase_data": {} }));
        });

        let client = PajbotModerationClient::new(Duration::from_secs(2));
        let url = format!("{}/", server.base_url());
        let verdict = client.test_message(&url, "hello").await.unwrap();
        assert!(!verdict.banned);
        assert_eq!(verdict.phrase(), None);
    }

    #[tokio::test]
    async fn test_status_error_is_retried_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/v1/banphrases/test");
            then.status(503);
        });

        let client = PajbotModerationClient::new(Duration::from_secs(2));
        let err = client.test_message(&server.base_url(), "hello").await.unwrap_err();
        assert_eq!(err, ModerationError::Status(503));
        mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_slow_api_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/banphrases/test");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!({ "banned": false }));
        });

        let client = PajbotModerationClient::new(Duration::from_millis(50));
        let err = client.test_message(&server.base_url(), "hello").await.unwrap_err();
        assert_eq!(err, ModerationError::Timeout);
    }
}
