use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;

use crate::app::AppState;
use crate::constants::HTML_CONTENT_TYPE;
use crate::error::{AppResult, GatewayError};
use crate::models::{JsToken, Quality, ResolvedShare, ShareReference, StreamParameters};
use crate::playlist::RewrittenPlaylist;
use crate::proxy::{proxy_segment, SegmentOptions};
use crate::resolver::ResolveOptions;
use crate::upstream::{RequestContext, ShareApiQuery};

use super::mode::{ModeRequest, Params, StreamSource};

/// Caller cookies win over the gateway's configured ones.
fn request_context(state: &AppState, headers: &HeaderMap) -> RequestContext {
    let inbound = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());

    match inbound {
        Some(cookies) => RequestContext {
            cookies: Some(cookies.to_string()),
            caller_cookies: true,
        },
        None => RequestContext {
            cookies: state.config.default_cookie_header(),
            caller_cookies: false,
        },
    }
}

pub async fn dispatch(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let params = Params(&query);
    let debug = params.flag("raw");

    let request = match ModeRequest::parse(&params) {
        Ok(request) => request,
        Err(e) => return e.render(debug),
    };
    let mode = request.mode();
    let ctx = request_context(&state, &headers);

    let mut response = match handle(&state, request, &headers, debug, &ctx).await {
        Ok(response) => response,
        Err(e) => e.render(debug),
    };
    response.extensions_mut().insert(mode);
    response
}

async fn handle(
    state: &AppState,
    request: ModeRequest,
    headers: &HeaderMap,
    debug: bool,
    ctx: &RequestContext,
) -> AppResult<Response> {
    match request {
        ModeRequest::Resolve {
            reference,
            refresh,
            direct,
            password,
        } => resolve(state, &reference, refresh, direct, password, debug, ctx).await,
        ModeRequest::Page { reference } => {
            let html = state.resolver.fetch_page(&reference, ctx).await?;
            Ok(([(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], html).into_response())
        }
        ModeRequest::Api {
            reference,
            js_token,
            root,
            dplogid,
            dir,
            password,
        } => {
            let query = ShareApiQuery {
                js_token,
                short_url: reference.short_url_id.clone(),
                root,
                dplogid,
                dir,
                password,
            };
            let share = state.resolver.call_api(&reference, &query, ctx).await?;

            let mut body = json!({ "data": share.data() });
            if debug {
                body["upstream"] = share.upstream.clone();
            }
            if root {
                state.cache.put(share).await;
            }
            Ok(Json(body).into_response())
        }
        ModeRequest::Stream { source, quality } => {
            let playlist = stream(state, source, quality, ctx).await?;
            Ok(([(header::CONTENT_TYPE, playlist.content_type)], playlist.body).into_response())
        }
        ModeRequest::Segment { url, json_errors } => {
            let url = state.client.checked_url("url", &url)?;
            proxy_segment(&state.client, &url, headers, SegmentOptions { json_errors }, ctx).await
        }
    }
}

async fn resolve(
    state: &AppState,
    reference: &ShareReference,
    refresh: bool,
    direct: bool,
    password: Option<String>,
    debug: bool,
    ctx: &RequestContext,
) -> AppResult<Response> {
    let cached = if refresh {
        None
    } else {
        state.cache.get(&reference.short_url_id).await
    };

    let (mut share, source) = match cached {
        Some(share) => {
            tracing::debug!("Serving share {} from cache", reference.short_url_id);
            (share, "cache")
        }
        None => {
            let options = ResolveOptions { password };
            let share = state.resolver.resolve(reference, None, &options, ctx).await?;
            state.cache.put(share.clone()).await;
            (share, "live")
        }
    };

    if debug {
        return Ok(Json(json!({ "source": source, "upstream": share.upstream })).into_response());
    }

    // Direct links expire quickly, so they are probed per request and never cached.
    if direct {
        state.resolver.attach_direct_links(&mut share, ctx).await;
    }

    Ok(Json(json!({ "data": share.data() })).into_response())
}

async fn stream(
    state: &AppState,
    source: StreamSource,
    quality: Quality,
    ctx: &RequestContext,
) -> AppResult<RewrittenPlaylist> {
    let params = match source {
        StreamSource::Variant { url } => {
            let url = state.client.checked_url("url", &url)?;
            return state.playlists.fetch_variant(&url, ctx).await;
        }
        StreamSource::Identifiers {
            user_key,
            share_id,
            file_id,
            js_token,
        } => StreamParameters {
            user_key,
            share_id,
            file_id,
            js_token: JsToken::new(js_token),
            quality,
        },
        StreamSource::Share { reference, file_id } => {
            let share = state
                .cache
                .get(&reference.short_url_id)
                .await
                .ok_or_else(|| GatewayError::NotResolved(reference.short_url_id.clone()))?;
            let file_id = pick_file(&share, file_id.as_deref())?;
            let tokens = state.resolver.obtain_tokens(&reference, ctx).await?;

            StreamParameters {
                user_key: share.user_key.clone(),
                share_id: share.share_id.clone(),
                file_id,
                js_token: tokens.js_token,
                quality,
            }
        }
    };

    state.playlists.fetch_stream(&params, ctx).await
}

fn pick_file(share: &ResolvedShare, file_id: Option<&str>) -> AppResult<String> {
    let file = match file_id {
        Some(id) => share.find_file(id).ok_or_else(|| GatewayError::InvalidParameter {
            name: "fid",
            reason: format!("share has no file {}", id),
        })?,
        None => share.first_file().ok_or_else(|| GatewayError::InvalidParameter {
            name: "surl",
            reason: "share contains no playable file".to_string(),
        })?,
    };
    Ok(file.file_id.clone())
}
