//! Token stage: trade a long-lived refresh token for short-lived upload credentials.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use genjobs_core::Settings;

use crate::error::{Stage, UploadError};
use crate::media::MediaKind;
use crate::session::UploadCredentials;
use crate::signer::Credentials;

/// Supplies credentials for one upload. Called once per upload; never cached.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self, kind: MediaKind) -> Result<UploadCredentials, UploadError>;
}

/// Token source backed by the provider's upload-token endpoint.
///
/// Every request carries its own timeout, whatever the injected client's
/// configuration.
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    http: reqwest::Client,
    endpoint: Url,
    refresh_token: String,
    timeout: Duration,
}

impl HttpTokenSource {
    pub fn new(http: reqwest::Client, endpoint: Url, refresh_token: impl Into<String>) -> Self {
        Self {
            http,
            endpoint,
            refresh_token: refresh_token.into(),
            timeout: Settings::default().http_timeout,
        }
    }

    /// Per-request timeout. Zero is ignored.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ret: Value,
    #[serde(default)]
    errmsg: String,
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    /// Image service id
    service_id: Option<String>,
    /// Video space name
    space_name: Option<String>,
    upload_domain: String,
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self, kind: MediaKind) -> Result<UploadCredentials, UploadError> {
        debug!(stage = %Stage::Token, kind = %kind, "requesting upload token");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .header(reqwest::header::COOKIE, format!("sessionid={}", self.refresh_token))
            .json(&json!({ "scene": kind.token_scene() }))
            .send()
            .await
            .map_err(|source| UploadError::Transport {
                stage: Stage::Token,
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| UploadError::Transport {
            stage: Stage::Token,
            source,
        })?;
        if !status.is_success() {
            return Err(UploadError::Http {
                stage: Stage::Token,
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(kind, &body)
    }
}

/// Decode the token envelope. `ret` may arrive as a string or a number.
///
/// Images upload into `service_id`, video and audio into `space_name`; the
/// other field is used when the preferred one is absent.
pub fn parse_token_response(kind: MediaKind, body: &str) -> Result<UploadCredentials, UploadError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| UploadError::malformed(Stage::Token, e.to_string()))?;

    let ret = match &envelope.ret {
        Value::Null => "0".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if ret != "0" {
        return Err(UploadError::Token {
            ret,
            message: envelope.errmsg,
        });
    }

    let data = envelope
        .data
        .ok_or_else(|| UploadError::malformed(Stage::Token, "missing data"))?;
    let service_id = data.service_id.filter(|id| !id.is_empty());
    let space_name = data.space_name.filter(|id| !id.is_empty());
    let service_id = match kind {
        MediaKind::Image => service_id.or(space_name),
        MediaKind::Video | MediaKind::Audio => space_name.or(service_id),
    }
    .ok_or_else(|| UploadError::malformed(Stage::Token, "missing service_id/space_name"))?;

    Ok(UploadCredentials {
        credentials: Credentials {
            access_key_id: data.access_key_id,
            secret_access_key: data.secret_access_key,
            session_token: data.session_token,
        },
        service_id,
        upload_domain: data.upload_domain,
    })
}
