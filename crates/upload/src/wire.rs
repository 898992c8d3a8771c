//! Provider response shapes for the apply, transfer and commit calls.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Stage, UploadError};
use crate::media::{AssetMetadata, MediaKind, validate_audio_duration};
use crate::session::UploadNode;

const TRANSFER_SUCCESS_CODE: i64 = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderResponse<T> {
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResponseMetadata {
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoreInfo {
    store_uri: String,
    auth: String,
}

// Image apply: `Result.UploadAddress`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageApplyResult {
    upload_address: ImageUploadAddress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageUploadAddress {
    #[serde(default)]
    store_infos: Vec<StoreInfo>,
    #[serde(default)]
    upload_hosts: Vec<String>,
    session_key: String,
}

// Video apply: `Result.InnerUploadAddress.UploadNodes[]`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VideoApplyResult {
    inner_upload_address: InnerUploadAddress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InnerUploadAddress {
    #[serde(default)]
    upload_nodes: Vec<VideoUploadNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VideoUploadNode {
    vid: Option<String>,
    #[serde(default)]
    store_infos: Vec<StoreInfo>,
    upload_host: String,
    session_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageCommitResult {
    #[serde(default)]
    results: Vec<ImageCommitEntry>,
    #[serde(default)]
    plugin_result: Vec<ImagePluginResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageCommitEntry {
    uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImagePluginResult {
    #[serde(default)]
    image_width: u32,
    #[serde(default)]
    image_height: u32,
    #[serde(default)]
    image_format: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VideoCommitResult {
    #[serde(default)]
    results: Vec<VideoCommitEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VideoCommitEntry {
    vid: Option<String>,
    video_meta: Option<VideoMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VideoMeta {
    uri: Option<String>,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    duration: f64,
    #[serde(default)]
    format: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    md5: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    code: Value,
    #[serde(default)]
    message: String,
    data: Option<TransferData>,
}

#[derive(Debug, Deserialize)]
struct TransferData {
    crc32: Option<String>,
}

/// Committed asset fields pulled from the commit response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Committed {
    pub content_id: String,
    pub store_uri: String,
    pub metadata: AssetMetadata,
}

fn decode<T: for<'de> Deserialize<'de>>(stage: Stage, body: &str) -> Result<T, UploadError> {
    let resp: ProviderResponse<T> =
        serde_json::from_str(body).map_err(|e| UploadError::malformed(stage, e.to_string()))?;

    if let Some(err) = resp.response_metadata.and_then(|m| m.error) {
        return Err(UploadError::Provider {
            stage,
            code: err.code,
            message: err.message,
        });
    }
    resp.result
        .ok_or_else(|| UploadError::malformed(stage, format!("missing Result in {body}")))
}

/// First upload node of an apply response.
pub(crate) fn parse_apply(kind: MediaKind, body: &str) -> Result<UploadNode, UploadError> {
    let stage = Stage::Apply;
    match kind {
        MediaKind::Image => {
            let result: ImageApplyResult = decode(stage, body)?;
            let address = result.upload_address;
            let store = address
                .store_infos
                .into_iter()
                .next()
                .ok_or_else(|| UploadError::malformed(stage, "no StoreInfos"))?;
            let upload_host = address
                .upload_hosts
                .into_iter()
                .next()
                .ok_or_else(|| UploadError::malformed(stage, "no UploadHosts"))?;
            Ok(UploadNode {
                upload_host,
                store_uri: store.store_uri,
                auth: store.auth,
                session_key: address.session_key,
                content_id: None,
            })
        }
        MediaKind::Video | MediaKind::Audio => {
            let result: VideoApplyResult = decode(stage, body)?;
            let node = result
                .inner_upload_address
                .upload_nodes
                .into_iter()
                .next()
                .ok_or_else(|| UploadError::malformed(stage, "no UploadNodes"))?;
            let store = node
                .store_infos
                .into_iter()
                .next()
                .ok_or_else(|| UploadError::malformed(stage, "no StoreInfos"))?;
            Ok(UploadNode {
                upload_host: node.upload_host,
                store_uri: store.store_uri,
                auth: store.auth,
                session_key: node.session_key,
                content_id: node.vid.filter(|v| !v.is_empty()),
            })
        }
    }
}

/// Check the body-level status and return the checksum the provider echoed.
pub(crate) fn parse_transfer(body: &str) -> Result<Option<String>, UploadError> {
    let stage = Stage::Transfer;
    let resp: TransferResponse =
        serde_json::from_str(body).map_err(|e| UploadError::malformed(stage, e.to_string()))?;

    let code = match &resp.code {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if code != Some(TRANSFER_SUCCESS_CODE) {
        return Err(UploadError::Provider {
            stage,
            code: resp.code.to_string(),
            message: resp.message,
        });
    }
    Ok(resp.data.and_then(|d| d.crc32))
}

pub(crate) fn parse_commit(
    kind: MediaKind,
    node: &UploadNode,
    body: &str,
) -> Result<Committed, UploadError> {
    let stage = Stage::Commit;
    match kind {
        MediaKind::Image => {
            let result: ImageCommitResult = decode(stage, body)?;
            let content_id = result
                .results
                .into_iter()
                .next()
                .and_then(|entry| entry.uri)
                .filter(|uri| !uri.is_empty())
                .ok_or_else(|| UploadError::malformed(stage, "no image Uri in Results"))?;
            let plugin = result.plugin_result.into_iter().next().unwrap_or_default();
            Ok(Committed {
                store_uri: content_id.clone(),
                content_id,
                metadata: AssetMetadata::Image {
                    width: plugin.image_width,
                    height: plugin.image_height,
                    format: plugin.image_format,
                },
            })
        }
        MediaKind::Video | MediaKind::Audio => {
            let result: VideoCommitResult = decode(stage, body)?;
            let entry = result
                .results
                .into_iter()
                .next()
                .ok_or_else(|| UploadError::malformed(stage, "empty Results"))?;
            let content_id = entry
                .vid
                .filter(|v| !v.is_empty())
                .or_else(|| node.content_id.clone())
                .ok_or_else(|| UploadError::malformed(stage, "no Vid in Results"))?;
            let meta = entry
                .video_meta
                .ok_or_else(|| UploadError::malformed(stage, "no VideoMeta in Results"))?;
            let store_uri = meta.uri.clone().unwrap_or_else(|| node.store_uri.clone());

            let metadata = if kind == MediaKind::Audio {
                validate_audio_duration(meta.duration)?;
                AssetMetadata::Audio {
                    duration: meta.duration,
                    duration_ms: (meta.duration * 1000.0).round() as u64,
                    format: meta.format,
                    size: meta.size,
                    md5: meta.md5,
                }
            } else {
                AssetMetadata::Video {
                    duration: meta.duration,
                    width: meta.width,
                    height: meta.height,
                    format: meta.format,
                    size: meta.size,
                    md5: meta.md5,
                }
            };

            Ok(Committed {
                content_id,
                store_uri,
                metadata,
            })
        }
    }
}
