use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use genjobs_upload::{
    AssetMetadata, HttpTokenSource, MediaKind, Stage, UploadClient, UploadError, content_crc32,
};
use serde_json::{Value, json};
use url::Url;

/// Knobs for the stub provider.
#[derive(Debug, Clone)]
struct Behaviour {
    token_ret: &'static str,
    apply_status: StatusCode,
    /// Overrides the checksum echoed by the transfer node
    echoed_crc32: Option<&'static str>,
    audio_duration: f64,
    empty_commit: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            token_ret: "0",
            apply_status: StatusCode::OK,
            echoed_crc32: None,
            audio_duration: 6.5,
            empty_commit: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Seen {
    action: String,
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Bytes,
}

struct Provider {
    addr: SocketAddr,
    behaviour: Behaviour,
    seen: Mutex<Vec<Seen>>,
}

impl Provider {
    fn record(&self, action: &str, headers: &HeaderMap, query: &HashMap<String, String>, body: &Bytes) {
        self.seen.lock().unwrap().push(Seen {
            action: action.to_string(),
            headers: headers.clone(),
            query: query.clone(),
            body: body.clone(),
        });
    }

    fn seen(&self, action: &str) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.action == action)
            .cloned()
            .collect()
    }
}

struct TestServer {
    provider: Arc<Provider>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(behaviour: Behaviour) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let provider = Arc::new(Provider {
            addr,
            behaviour,
            seen: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/token", post(token))
            .route("/", get(api).post(api))
            .route("/upload/v1/*store_uri", post(transfer))
            .with_state(provider.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { provider, handle }
    }

    fn client(&self) -> UploadClient {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let endpoint = Url::parse(&format!("http://{}/token", self.provider.addr)).unwrap();
        let tokens = HttpTokenSource::new(http.clone(), endpoint, "refresh-abc");
        UploadClient::with_http_client(http, Arc::new(tokens), "cn-north-1").with_scheme("http")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn token(State(p): State<Arc<Provider>>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    p.record("token", &headers, &HashMap::new(), &body);
    if p.behaviour.token_ret != "0" {
        return Json(json!({ "ret": p.behaviour.token_ret, "errmsg": "refresh token expired" }));
    }
    let scene = serde_json::from_slice::<Value>(&body).unwrap()["scene"].as_i64().unwrap();
    let id_field = if scene == 2 { "service_id" } else { "space_name" };
    Json(json!({
        "ret": "0",
        "errmsg": "success",
        "data": {
            "access_key_id": "AKTEST",
            "secret_access_key": "SKTEST",
            "session_token": "STTEST",
            id_field: "svc-1",
            "upload_domain": p.addr.to_string(),
        }
    }))
}

async fn api(
    State(p): State<Arc<Provider>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let action = query.get("Action").cloned().unwrap_or_default();
    p.record(&action, &headers, &query, &body);
    let host = p.addr.to_string();

    match action.as_str() {
        "ApplyImageUpload" => {
            if p.behaviour.apply_status != StatusCode::OK {
                return (p.behaviour.apply_status, "apply throttled").into_response();
            }
            Json(json!({"Result": {"UploadAddress": {
                "StoreInfos": [{"StoreUri": "tos-cn-i/img1", "Auth": "node-auth-img"}],
                "UploadHosts": [host],
                "SessionKey": "sess-img",
            }}}))
            .into_response()
        }
        "ApplyUploadInner" => Json(json!({"Result": {"InnerUploadAddress": {"UploadNodes": [{
            "Vid": "v0vid1",
            "StoreInfos": [{"StoreUri": "tos-cn-v/vid1", "Auth": "node-auth-vid"}],
            "UploadHost": host,
            "SessionKey": "sess-vid",
        }]}}}))
        .into_response(),
        "CommitImageUpload" => {
            if p.behaviour.empty_commit {
                return Json(json!({"Result": {"Results": []}})).into_response();
            }
            Json(json!({"Result": {
                "Results": [{"Uri": "tos-cn-i/img1", "UriStatus": 2000}],
                "PluginResult": [{"ImageWidth": 640, "ImageHeight": 480, "ImageFormat": "png"}],
            }}))
            .into_response()
        }
        "CommitUploadInner" => Json(json!({"Result": {"Results": [{
            "Vid": "v0vid1",
            "VideoMeta": {
                "Uri": "tos-cn-v/vid1",
                "Width": 1280,
                "Height": 720,
                "Duration": p.behaviour.audio_duration,
                "Format": "mp4",
                "Size": 4,
                "Md5": "md5hash",
            },
        }]}}))
        .into_response(),
        other => (StatusCode::BAD_REQUEST, format!("unknown action {other}")).into_response(),
    }
}

async fn transfer(
    State(p): State<Arc<Provider>>,
    Path(store_uri): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let query = HashMap::from([("store_uri".to_string(), store_uri)]);
    p.record("transfer", &headers, &query, &body);
    let crc = p
        .behaviour
        .echoed_crc32
        .map(str::to_string)
        .unwrap_or_else(|| content_crc32(&body));
    Json(json!({"code": 2000, "message": "Success", "data": {"crc32": crc}}))
}

fn header<'a>(seen: &'a Seen, name: &str) -> Option<&'a str> {
    seen.headers.get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn image_upload_runs_all_four_stages() {
    let server = TestServer::spawn(Behaviour::default()).await;
    let payload = b"\x89PNG fake image bytes";

    let asset = server.client().upload(MediaKind::Image, payload).await.unwrap();

    assert_eq!(asset.content_id, "tos-cn-i/img1");
    assert_eq!(asset.kind, MediaKind::Image);
    assert_eq!(
        asset.metadata,
        AssetMetadata::Image {
            width: 640,
            height: 480,
            format: "png".into()
        }
    );

    let token = &server.provider.seen("token")[0];
    assert_eq!(header(token, "cookie"), Some("sessionid=refresh-abc"));
    assert_eq!(serde_json::from_slice::<Value>(&token.body).unwrap(), json!({"scene": 2}));

    let apply = &server.provider.seen("ApplyImageUpload")[0];
    assert_eq!(apply.query.get("ServiceId").map(String::as_str), Some("svc-1"));
    assert_eq!(apply.query.get("Version").map(String::as_str), Some("2018-08-01"));
    assert_eq!(apply.query.get("FileSize"), Some(&payload.len().to_string()));
    assert_eq!(header(apply, "x-amz-security-token"), Some("STTEST"));
    let date = header(apply, "x-amz-date").unwrap();
    assert_eq!(date.len(), 16);
    assert!(date.ends_with('Z'));
    assert!(header(apply, "x-amz-content-sha256").is_none());
    let auth = header(apply, "authorization").unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKTEST/"));
    assert!(auth.contains("/cn-north-1/imagex/aws4_request"));
    assert!(auth.contains("SignedHeaders=x-amz-date;x-amz-security-token,"));

    let transfer = &server.provider.seen("transfer")[0];
    assert_eq!(transfer.query["store_uri"], "tos-cn-i/img1");
    assert_eq!(header(transfer, "authorization"), Some("node-auth-img"));
    assert_eq!(header(transfer, "content-crc32"), Some(content_crc32(payload).as_str()));
    assert_eq!(header(transfer, "content-type"), Some("application/octet-stream"));
    assert_eq!(&transfer.body[..], payload);

    let commit = &server.provider.seen("CommitImageUpload")[0];
    assert_eq!(
        serde_json::from_slice::<Value>(&commit.body).unwrap(),
        json!({"SessionKey": "sess-img", "SuccessActionStatus": "200"})
    );
    assert_eq!(header(commit, "x-amz-content-sha256").map(str::len), Some(64));
    assert!(header(commit, "authorization").unwrap().contains(
        "SignedHeaders=x-amz-content-sha256;x-amz-date;x-amz-security-token,"
    ));
}

#[tokio::test]
async fn video_upload_uses_the_video_service() {
    let server = TestServer::spawn(Behaviour::default()).await;

    let asset = server.client().upload(MediaKind::Video, b"mp4!").await.unwrap();

    assert_eq!(asset.content_id, "v0vid1");
    assert_eq!(asset.store_uri, "tos-cn-v/vid1");
    assert!(matches!(asset.metadata, AssetMetadata::Video { width: 1280, height: 720, .. }));

    let apply = &server.provider.seen("ApplyUploadInner")[0];
    assert_eq!(apply.query.get("SpaceName").map(String::as_str), Some("svc-1"));
    assert_eq!(apply.query.get("FileType").map(String::as_str), Some("video"));
    assert_eq!(apply.query.get("IsInner").map(String::as_str), Some("1"));
    assert!(header(apply, "authorization").unwrap().contains("/vod/aws4_request"));

    let commit = &server.provider.seen("CommitUploadInner")[0];
    assert_eq!(
        serde_json::from_slice::<Value>(&commit.body).unwrap(),
        json!({"SessionKey": "sess-vid", "Functions": []})
    );
}

#[tokio::test]
async fn audio_is_declared_as_video_and_duration_is_checked() {
    let server = TestServer::spawn(Behaviour::default()).await;

    let asset = server.client().upload(MediaKind::Audio, b"mp3!").await.unwrap();
    assert_eq!(
        asset.metadata,
        AssetMetadata::Audio {
            duration: 6.5,
            duration_ms: 6500,
            format: "mp4".into(),
            size: 4,
            md5: "md5hash".into(),
        }
    );

    let token = &server.provider.seen("token")[0];
    assert_eq!(serde_json::from_slice::<Value>(&token.body).unwrap(), json!({"scene": 1}));
    let apply = &server.provider.seen("ApplyUploadInner")[0];
    assert_eq!(apply.query.get("FileType").map(String::as_str), Some("video"));
}

#[tokio::test]
async fn too_short_audio_is_rejected() {
    let server = TestServer::spawn(Behaviour {
        audio_duration: 1.5,
        ..Behaviour::default()
    })
    .await;

    let err = server.client().upload(MediaKind::Audio, b"mp3!").await.unwrap_err();
    match err {
        UploadError::AudioDuration { seconds, min, max } => {
            assert_eq!(seconds, 1.5);
            assert_eq!((min, max), (2.0, 15.0));
        }
        other => panic!("expected duration error, got {other}"),
    }
}

#[tokio::test]
async fn checksum_mismatch_fails_the_transfer_stage() {
    let server = TestServer::spawn(Behaviour {
        echoed_crc32: Some("deadbeef"),
        ..Behaviour::default()
    })
    .await;

    let err = server.client().upload(MediaKind::Image, b"payload").await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Transfer));
    assert!(matches!(err, UploadError::ChecksumMismatch { ref actual, .. } if actual == "deadbeef"));
    assert!(server.provider.seen("CommitImageUpload").is_empty());
}

#[tokio::test]
async fn token_rejection_surfaces_provider_text() {
    let server = TestServer::spawn(Behaviour {
        token_ret: "1014",
        ..Behaviour::default()
    })
    .await;

    let err = server.client().upload(MediaKind::Image, b"x").await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Token));
    assert!(err.to_string().contains("refresh token expired"), "{err}");
    assert!(server.provider.seen("ApplyImageUpload").is_empty());
}

#[tokio::test]
async fn non_success_apply_names_the_stage() {
    let server = TestServer::spawn(Behaviour {
        apply_status: StatusCode::TOO_MANY_REQUESTS,
        ..Behaviour::default()
    })
    .await;

    let err = server.client().upload(MediaKind::Image, b"x").await.unwrap_err();
    assert!(matches!(err, UploadError::Http { stage: Stage::Apply, status: 429, .. }));
    assert!(err.to_string().starts_with("apply stage"), "{err}");
    assert!(err.to_string().contains("apply throttled"));
}

#[tokio::test]
async fn missing_commit_result_is_a_failure() {
    let server = TestServer::spawn(Behaviour {
        empty_commit: true,
        ..Behaviour::default()
    })
    .await;

    let err = server.client().upload(MediaKind::Image, b"x").await.unwrap_err();
    assert!(matches!(err, UploadError::Malformed { stage: Stage::Commit, .. }), "{err}");
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let endpoint = Url::parse(&format!("http://{addr}/token")).unwrap();
    let client = UploadClient::with_http_client(
        http.clone(),
        Arc::new(HttpTokenSource::new(http, endpoint, "r")),
        "cn-north-1",
    );

    let err = client.upload(MediaKind::Video, b"x").await.unwrap_err();
    assert!(matches!(err, UploadError::Transport { stage: Stage::Token, .. }), "{err}");
}

#[tokio::test]
async fn silent_provider_times_out_even_with_a_default_client() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accept = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let http = reqwest::Client::new();
    let endpoint = Url::parse(&format!("http://{addr}/token")).unwrap();
    let tokens = HttpTokenSource::new(http.clone(), endpoint, "r").with_timeout(Duration::from_millis(200));
    let client = UploadClient::with_http_client(http, Arc::new(tokens), "cn-north-1")
        .with_timeout(Duration::from_millis(200));

    let err = tokio::time::timeout(Duration::from_secs(5), client.upload(MediaKind::Image, b"x"))
        .await
        .expect("upload should give up on its own")
        .unwrap_err();
    match err {
        UploadError::Transport { stage, source } => {
            assert_eq!(stage, Stage::Token);
            assert!(source.is_timeout(), "{source}");
        }
        other => panic!("expected transport timeout, got {other}"),
    }
    accept.abort();
}
