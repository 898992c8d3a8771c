//! Canonical-request signer (`AWS4-HMAC-SHA256`).
//!
//! Pure: the timestamp comes from the caller's `x-amz-date` header, so the
//! same input always yields the same `Authorization` value.

use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const AMZ_DATE_HEADER: &str = "x-amz-date";
pub const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// RFC 3986 unreserved characters stay literal; everything else is encoded.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Short-lived credential triple.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .finish()
    }
}

/// Region and service the signature is scoped to.
#[derive(Debug, Clone, Copy)]
pub struct SigningScope<'a> {
    pub region: &'a str,
    pub service: &'a str,
}

/// The parts of an outbound request that go into the signature.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    /// Header subset to sign; must include `x-amz-date`.
    pub headers: &'a [(&'a str, &'a str)],
    pub body: Option<&'a [u8]>,
}

/// Malformed signer input. Never transient.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("missing required header `{0}`")]
    MissingHeader(&'static str),
    #[error("malformed x-amz-date `{0}` (expected YYYYMMDDTHHMMSSZ)")]
    MalformedDate(String),
    #[error("empty credential field `{0}`")]
    EmptyCredential(&'static str),
    #[error("invalid HMAC key")]
    InvalidKey,
}

/// Format a timestamp the way `x-amz-date` expects (whole seconds, no separators).
pub fn amz_date(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Lowercase hex SHA-256 of a payload (empty payload when `None`).
pub fn payload_hash(body: Option<&[u8]>) -> String {
    hex::encode(Sha256::digest(body.unwrap_or_default()))
}

/// Compute the full `Authorization` header value for one request.
pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &Credentials,
    scope: &SigningScope<'_>,
) -> Result<String, SigningError> {
    if credentials.access_key_id.is_empty() {
        return Err(SigningError::EmptyCredential("access_key_id"));
    }
    if credentials.secret_access_key.is_empty() {
        return Err(SigningError::EmptyCredential("secret_access_key"));
    }

    let headers = canonical_headers(request.headers);
    let amz_date = headers
        .iter()
        .find(|(name, _)| name == AMZ_DATE_HEADER)
        .map(|(_, value)| value.as_str())
        .ok_or(SigningError::MissingHeader(AMZ_DATE_HEADER))?;
    let date = short_date(amz_date)?;

    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_request = canonical_request(request, &headers, &signed_headers);

    let credential_scope = format!("{date}/{}/{}/aws4_request", scope.region, scope.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(&credentials.secret_access_key, date, scope)?;
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key_id
    ))
}

/// Day, region, service, request: four HMAC rounds.
fn signing_key(secret: &str, date: &str, scope: &SigningScope<'_>) -> Result<Vec<u8>, SigningError> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, scope.region.as_bytes())?;
    let k_service = hmac(&k_region, scope.service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SigningError::InvalidKey)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn short_date(amz_date: &str) -> Result<&str, SigningError> {
    let bytes = amz_date.as_bytes();
    let well_formed = bytes.len() == 16
        && bytes[8] == b'T'
        && bytes[15] == b'Z'
        && bytes[..8].iter().chain(&bytes[9..15]).all(u8::is_ascii_digit);
    if !well_formed {
        return Err(SigningError::MalformedDate(amz_date.to_string()));
    }
    Ok(&amz_date[..8])
}

/// Lowercased, trimmed, sorted by name. Inner whitespace runs collapse to one space.
fn canonical_headers(headers: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| {
            let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
            (name.trim().to_ascii_lowercase(), value)
        })
        .collect();
    out.sort();
    out
}

fn canonical_request(
    request: &SignableRequest<'_>,
    headers: &[(String, String)],
    signed_headers: &str,
) -> String {
    let path = match request.url.path() {
        "" => "/",
        p => p,
    };

    let mut query: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (encode(&k), encode(&v)))
        .collect();
    query.sort();
    let query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let header_block: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    format!(
        "{}\n{path}\n{query}\n{header_block}\n{signed_headers}\n{}",
        request.method.to_ascii_uppercase(),
        payload_hash(request.body)
    )
}

fn encode(raw: &str) -> String {
    utf8_percent_encode(raw, RFC3986).to_string()
}
