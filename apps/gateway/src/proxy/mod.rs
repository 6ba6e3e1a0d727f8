//! Segment proxy: streams a media object from an allowed upstream host.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::Response,
};
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::time::Duration;
use url::Url;

use crate::error::{AppResult, GatewayError, UpstreamDiagnostics};
use crate::upstream::{RequestContext, UpstreamClient};

static FORWARDED_REQUEST_HEADERS: [HeaderName; 5] = [
    header::RANGE,
    header::IF_RANGE,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
    header::ACCEPT,
];

static RETURNED_RESPONSE_HEADERS: [HeaderName; 8] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CACHE_CONTROL,
    header::EXPIRES,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentOptions {
    /// Answer upstream 4xx/5xx with the JSON error envelope instead of
    /// passing the status and body through.
    pub json_errors: bool,
}

fn copy_headers(from: &HeaderMap, names: &[HeaderName], to: &mut HeaderMap) {
    for name in names {
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

pub fn forwarded_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    copy_headers(inbound, &FORWARDED_REQUEST_HEADERS, &mut forwarded);
    forwarded
}

/// Ends the body with an error once the upstream sends nothing for `idle`.
fn idle_bounded<S>(body: S, idle: Duration) -> impl Stream<Item = Result<Bytes, io::Error>> + Send
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    stream::unfold(Some(Box::pin(body)), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(io::Error::new(io::ErrorKind::Other, e.without_url())), None)),
            Ok(None) => None,
            Err(_) => {
                tracing::warn!("Upstream segment body stalled for {:?}", idle);
                Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "upstream body stalled")),
                    None,
                ))
            }
        }
    })
}

/// Opens `url` upstream and returns a response whose body is pulled from the
/// upstream as the client reads it. Dropping the response (client gone)
/// drops the upstream body stream with it.
pub async fn proxy_segment(
    client: &UpstreamClient,
    url: &Url,
    inbound: &HeaderMap,
    options: SegmentOptions,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let upstream = client
        .open_stream(url, forwarded_request_headers(inbound), ctx)
        .await?;

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    if options.json_errors && (status.is_client_error() || status.is_server_error()) {
        let body = upstream.text().await.unwrap_or_default();
        return Err(GatewayError::UpstreamRejected(UpstreamDiagnostics::new(
            status.as_u16(),
            &body,
        )));
    }

    tracing::debug!("Proxying {} from {} ({})", url.path(), url.host_str().unwrap_or("-"), status);

    let mut headers = HeaderMap::new();
    copy_headers(upstream.headers(), &RETURNED_RESPONSE_HEADERS, &mut headers);
    if ctx.caller_cookies {
        copy_headers(upstream.headers(), &[header::SET_COOKIE], &mut headers);
    }

    let body = idle_bounded(upstream.bytes_stream(), client.config().timeout());
    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
