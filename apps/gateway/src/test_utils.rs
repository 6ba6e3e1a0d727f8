#![cfg(test)]

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::app::create_app;
use crate::config::Config;

pub const STUB_TOKEN: &str = "T1";

const SEGMENT_LEN: usize = 512;
const SEGMENT_BYTES: [u8; SEGMENT_LEN] = segment_bytes();

/// Body of every `/media/seg-*.ts` object served by the stub.
pub const STUB_SEGMENT: &[u8] = &SEGMENT_BYTES;

const fn segment_bytes() -> [u8; SEGMENT_LEN] {
    let mut bytes = [0u8; SEGMENT_LEN];
    let mut i = 0;
    while i < SEGMENT_LEN {
        bytes[i] = (i % 251) as u8;
        i += 1;
    }
    bytes
}

pub const STUB_PLAYLIST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\n/media/seg-0.ts\n#EXTINF:10.0,\n/media/seg-1.ts?sign=a%2Bb\n#EXTINF:3.5,\n/media/seg-2.ts\n#EXT-X-ENDLIST\n";

/// Behaviour of the stub storage service.
#[derive(Debug, Clone)]
pub struct StubShare {
    pub page_html: String,
    /// When set, the page only carries a token for requests with this Cookie.
    pub required_cookie: Option<String>,
    pub stream_body: String,
    pub page_delay: Option<Duration>,
}

impl Default for StubShare {
    fn default() -> Self {
        Self {
            page_html: format!(
                r#"<html><script>var jsToken="{}"; var api="/share/list?dp-logid=424242";</script></html>"#,
                STUB_TOKEN
            ),
            required_cookie: None,
            stream_body: STUB_PLAYLIST.to_string(),
            page_delay: None,
        }
    }
}

pub struct StubUpstream {
    pub base_url: String,
    calls: Arc<AtomicUsize>,
}

impl StubUpstream {
    /// Requests the stub has received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn count_calls(State(calls): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

/// Serves `router` on an ephemeral localhost port.
pub async fn spawn_stub(router: Router) -> StubUpstream {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = router.layer(middleware::from_fn_with_state(calls.clone(), count_calls));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub upstream");
    let addr = listener.local_addr().expect("Stub upstream has no address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    StubUpstream {
        base_url: format!("http://{}", addr),
        calls,
    }
}

/// Gateway config pointed at a stub upstream.
pub fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.upstream.base_url = base_url.to_string();
    config.upstream.allowed_hosts = vec!["127.0.0.1".to_string()];
    config.upstream.timeout_seconds = 1;
    config.upstream.connect_timeout_seconds = 1;
    config
}

pub fn create_test_app(config: Config) -> Router {
    create_app(Arc::new(config)).expect("Failed to create test app")
}

fn has_token(query: &HashMap<String, String>) -> bool {
    query.get("jsToken").map(String::as_str) == Some(STUB_TOKEN)
}

async fn share_page(State(share): State<Arc<StubShare>>, headers: HeaderMap) -> Response {
    if let Some(delay) = share.page_delay {
        tokio::time::sleep(delay).await;
    }

    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    match &share.required_cookie {
        Some(required) if cookie != Some(required.as_str()) => {
            "<html><body>Please log in</body></html>".into_response()
        }
        _ => share.page_html.clone().into_response(),
    }
}

async fn share_list(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    if !has_token(&query) {
        return Json(json!({"errno": 4000020, "errmsg": "need verify jsToken"}));
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("127.0.0.1");

    Json(json!({
        "errno": 0,
        "jsToken": STUB_TOKEN,
        "uk": 4400,
        "share_id": 5500,
        "title": "video.mp4",
        "list": [{
            "fs_id": "778899",
            "server_filename": "video.mp4",
            "size": 168800237u64,
            "isdir": "0",
            "category": "1",
            "path": "/video.mp4",
            "dlink": format!("http://{}/dl/video.mp4", host),
            "thumbs": {
                "url3": "https://data.terabox.app/thumbnail/778899?size=c850_u580"
            }
        }]
    }))
}

async fn streaming(
    State(share): State<Arc<StubShare>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_token(&query) {
        return Json(json!({"errno": -6})).into_response();
    }
    share.stream_body.clone().into_response()
}

async fn download() -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, "https://d.terabox.app/file/video.mp4?sign=ok")],
    )
        .into_response()
}

fn parse_range(headers: &HeaderMap, len: usize) -> Option<(usize, usize)> {
    let spec = headers.get(header::RANGE)?.to_str().ok()?.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = end.parse::<usize>().unwrap_or(len - 1).min(len - 1);
    (start <= end).then_some((start, end))
}

async fn media(Path(name): Path<String>, headers: HeaderMap) -> Response {
    if !name.starts_with("seg-") {
        return (StatusCode::NOT_FOUND, "no such object").into_response();
    }

    let common = [
        (header::CONTENT_TYPE, "video/mp2t".to_string()),
        (header::ACCEPT_RANGES, "bytes".to_string()),
        (header::SET_COOKIE, "edge=1; Path=/".to_string()),
        (header::SERVER, "stub".to_string()),
    ];

    match parse_range(&headers, STUB_SEGMENT.len()) {
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            common,
            [(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, end, STUB_SEGMENT.len()),
            )],
            STUB_SEGMENT[start..=end].to_vec(),
        )
            .into_response(),
        None => (StatusCode::OK, common, STUB_SEGMENT.to_vec()).into_response(),
    }
}

/// Stub of the storage service endpoints the gateway talks to.
pub fn stub_router(share: StubShare) -> Router {
    Router::new()
        .route("/sharing/link", get(share_page))
        .route("/share/list", get(share_list))
        .route("/share/streaming", get(streaming))
        .route("/dl/:name", get(download))
        .route("/media/:name", get(media))
        .with_state(Arc::new(share))
}
