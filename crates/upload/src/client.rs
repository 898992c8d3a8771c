//! Upload Protocol client: token, apply, transfer, commit.
//!
//! Stages run strictly in order and never retry. A failed upload is retried
//! by calling [`UploadClient::upload`] again, which fetches new credentials.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use genjobs_core::Settings;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::{Stage, UploadError};
use crate::media::{MediaKind, UploadedAsset};
use crate::session::{Applied, Credentialed, Transferred, UploadSession};
use crate::signer::{
    self, AMZ_DATE_HEADER, CONTENT_SHA256_HEADER, SECURITY_TOKEN_HEADER, SignableRequest,
    SigningScope,
};
use crate::token::TokenSource;
use crate::wire;

const CONTENT_CRC32_HEADER: &str = "Content-CRC32";
const OCTET_STREAM: &str = "application/octet-stream";

/// Lowercase, zero-padded CRC-32 of a payload.
pub fn content_crc32(bytes: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(bytes))
}

#[derive(Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    region: String,
    scheme: String,
    /// Applied to every apply, transfer and commit request
    timeout: Duration,
}

impl std::fmt::Debug for UploadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadClient")
            .field("region", &self.region)
            .field("scheme", &self.scheme)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl UploadClient {
    /// Build a client whose transport timeout comes from `settings`.
    pub fn new(tokens: Arc<dyn TokenSource>, settings: &Settings) -> Result<Self, UploadError> {
        settings.validate()?;
        let http = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(UploadError::Client)?;
        Ok(Self::with_http_client(http, tokens, settings.upload_region.clone())
            .with_timeout(settings.http_timeout))
    }

    /// Use a preconfigured `reqwest` client.
    ///
    /// Requests still time out after the default `http_timeout` unless
    /// [`with_timeout`](Self::with_timeout) says otherwise.
    pub fn with_http_client(
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            region: region.into(),
            scheme: "https".to_string(),
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

    /// URL scheme for provider hosts (`https` unless overridden).
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Run the whole sequence for one payload.
    pub async fn upload(&self, kind: MediaKind, bytes: &[u8]) -> Result<UploadedAsset, UploadError> {
        let session = self.begin(kind).await?;
        let session = self.apply(session, bytes.len() as u64).await?;
        let session = self.transfer(session, bytes).await?;
        let asset = self.commit(session).await?;

        info!(
            kind = %kind,
            content_id = %asset.content_id,
            size = bytes.len(),
            "upload committed"
        );
        Ok(asset)
    }

    /// Token stage.
    pub async fn begin(&self, kind: MediaKind) -> Result<UploadSession<Credentialed>, UploadError> {
        let credentials = self.tokens.fetch(kind).await?;
        debug!(stage = %Stage::Token, kind = %kind, upload_domain = %credentials.upload_domain, "credentials acquired");
        Ok(UploadSession::new(kind, credentials))
    }

    /// Apply stage: reserve an upload node for `size` bytes.
    pub async fn apply(
        &self,
        session: UploadSession<Credentialed>,
        size: u64,
    ) -> Result<UploadSession<Applied>, UploadError> {
        let route = session.kind().route();
        let mut url = self.api_url(&session, route.apply_action)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in route.apply_extra {
                query.append_pair(key, value);
            }
            query.append_pair("FileSize", &size.to_string());
        }

        let headers = self.signed_headers(&session, "GET", &url, None)?;
        let resp = self.http.get(url).timeout(self.timeout).headers(headers).send().await;
        let body = read_success(Stage::Apply, resp).await?;

        let node = wire::parse_apply(session.kind(), &body)?;
        debug!(stage = %Stage::Apply, upload_host = %node.upload_host, store_uri = %node.store_uri, "upload node assigned");
        Ok(session.applied(node))
    }

    /// Transfer stage: POST the raw bytes with their checksum.
    pub async fn transfer(
        &self,
        session: UploadSession<Applied>,
        bytes: &[u8],
    ) -> Result<UploadSession<Transferred>, UploadError> {
        let node = session.node();
        let url = Url::parse(&format!(
            "{}://{}/upload/v1/{}",
            self.scheme, node.upload_host, node.store_uri
        ))?;
        let crc32 = content_crc32(bytes);

        let resp = self
            .http
            .post(url)
            .timeout(self.timeout)
            .header(AUTHORIZATION, node.auth.as_str())
            .header(CONTENT_CRC32_HEADER, crc32.as_str())
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(bytes.to_vec())
            .send()
            .await;
        let body = read_success(Stage::Transfer, resp).await?;

        if let Some(echoed) = wire::parse_transfer(&body)? {
            if !echoed.eq_ignore_ascii_case(&crc32) {
                return Err(UploadError::ChecksumMismatch {
                    expected: crc32,
                    actual: echoed,
                });
            }
        }

        debug!(stage = %Stage::Transfer, crc32 = %crc32, size = bytes.len(), "payload transferred");
        Ok(session.transferred(crc32))
    }

    /// Commit stage: finalize the upload and read back asset metadata.
    pub async fn commit(&self, session: UploadSession<Transferred>) -> Result<UploadedAsset, UploadError> {
        let kind = session.kind();
        let route = kind.route();
        let url = self.api_url(&session, route.commit_action)?;

        let session_key = session.node().session_key.as_str();
        let payload = match kind {
            MediaKind::Image => json!({ "SessionKey": session_key, "SuccessActionStatus": "200" }),
            MediaKind::Video | MediaKind::Audio => json!({ "SessionKey": session_key, "Functions": [] }),
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| UploadError::malformed(Stage::Commit, e.to_string()))?;

        let headers = self.signed_headers(&session, "POST", &url, Some(&body))?;
        let resp = self
            .http
            .post(url)
            .timeout(self.timeout)
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        let text = read_success(Stage::Commit, resp).await?;

        let committed = wire::parse_commit(kind, session.node(), &text)?;
        debug!(stage = %Stage::Commit, content_id = %committed.content_id, "upload committed by provider");

        Ok(UploadedAsset {
            content_id: committed.content_id,
            store_uri: committed.store_uri,
            kind,
            metadata: committed.metadata,
        })
    }

    fn api_url<S>(&self, session: &UploadSession<S>, action: &str) -> Result<Url, UploadError> {
        let route = session.kind().route();
        let mut url = Url::parse(&format!(
            "{}://{}/",
            self.scheme,
            session.credentials().upload_domain
        ))?;
        url.query_pairs_mut()
            .append_pair("Action", action)
            .append_pair("Version", route.version)
            .append_pair(route.id_param, &session.credentials().service_id);
        Ok(url)
    }

    /// `x-amz-*` headers plus `Authorization` for an apply or commit call.
    fn signed_headers<S>(
        &self,
        session: &UploadSession<S>,
        method: &str,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<HeaderMap, UploadError> {
        let credentials = &session.credentials().credentials;
        let amz_date = signer::amz_date(Utc::now());
        let content_sha256 = body.map(|b| signer::payload_hash(Some(b)));

        let mut to_sign: Vec<(&str, &str)> = vec![
            (AMZ_DATE_HEADER, amz_date.as_str()),
            (SECURITY_TOKEN_HEADER, credentials.session_token.as_str()),
        ];
        if let Some(hash) = content_sha256.as_deref() {
            to_sign.push((CONTENT_SHA256_HEADER, hash));
        }

        let request = SignableRequest {
            method,
            url,
            headers: &to_sign,
            body,
        };
        let scope = SigningScope {
            region: &self.region,
            service: session.kind().route().signing_service,
        };
        let authorization = signer::sign(&request, credentials, &scope)?;

        let mut headers = HeaderMap::new();
        let pairs = to_sign
            .iter()
            .copied()
            .chain([("authorization", authorization.as_str())]);
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| not_header_safe(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| not_header_safe(e.to_string()))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

fn not_header_safe(message: String) -> UploadError {
    UploadError::malformed(Stage::Token, format!("credentials are not header-safe: {message}"))
}

/// Read the body of a 2xx response; everything else is a stage failure.
async fn read_success(
    stage: Stage,
    resp: Result<reqwest::Response, reqwest::Error>,
) -> Result<String, UploadError> {
    let resp = resp.map_err(|source| UploadError::Transport { stage, source })?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|source| UploadError::Transport { stage, source })?;

    if !status.is_success() {
        return Err(UploadError::Http {
            stage,
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
