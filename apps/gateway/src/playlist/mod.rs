//! HLS playlist fetch and rewrite.

mod rewrite;

pub use rewrite::{rewrite_playlist, GatewayUrls, PlaylistError, Target};

use url::Url;

use crate::constants::HLS_CONTENT_TYPE;
use crate::error::{AppResult, GatewayError};
use crate::models::StreamParameters;
use crate::upstream::{RequestContext, TextReply, UpstreamClient};

#[derive(Debug, Clone)]
pub struct RewrittenPlaylist {
    pub content_type: String,
    pub body: String,
}

#[derive(Clone)]
pub struct PlaylistService {
    client: UpstreamClient,
    urls: GatewayUrls,
}

impl PlaylistService {
    pub fn new(client: UpstreamClient, public_base_url: &str) -> Self {
        Self {
            client,
            urls: GatewayUrls::new(public_base_url),
        }
    }

    /// Playlist of a shared file, from the streaming endpoint.
    pub async fn fetch_stream(
        &self,
        params: &StreamParameters,
        ctx: &RequestContext,
    ) -> AppResult<RewrittenPlaylist> {
        let reply = self.client.fetch_stream_playlist(params, ctx).await?;
        self.rewrite_reply(reply)
    }

    /// Variant or rendition playlist referenced by an earlier rewrite.
    pub async fn fetch_variant(&self, url: &Url, ctx: &RequestContext) -> AppResult<RewrittenPlaylist> {
        let reply = self.client.fetch_url_text(url, ctx).await?;
        self.rewrite_reply(reply)
    }

    fn rewrite_reply(&self, reply: TextReply) -> AppResult<RewrittenPlaylist> {
        if !reply.is_success() {
            return Err(GatewayError::UpstreamRejected(reply.diagnostics()));
        }

        match rewrite_playlist(&reply.body, &reply.url, &self.urls) {
            Ok(body) => {
                tracing::debug!(
                    "Rewrote playlist from {} ({} bytes)",
                    reply.url.path(),
                    body.len()
                );
                Ok(RewrittenPlaylist {
                    content_type: playlist_content_type(reply.content_type.as_deref()),
                    body,
                })
            }
            Err(PlaylistError::Gateway(e)) => Err(e),
            Err(PlaylistError::BadUri(uri)) => {
                tracing::warn!("Playlist references unparseable URI {:?}", uri);
                Err(GatewayError::MalformedPlaylist(reply.diagnostics()))
            }
            Err(PlaylistError::MissingHeader) => Err(non_playlist_reply(&reply)),
        }
    }
}

/// The streaming endpoint answers with a JSON error object when it refuses.
fn non_playlist_reply(reply: &TextReply) -> GatewayError {
    let errno = serde_json::from_str::<serde_json::Value>(&reply.body)
        .ok()
        .and_then(|v| v.get("errno").and_then(|e| e.as_i64()));

    match errno {
        Some(code) => GatewayError::UpstreamRejected(reply.diagnostics().with_errno(Some(code))),
        None => GatewayError::MalformedPlaylist(reply.diagnostics()),
    }
}

fn playlist_content_type(upstream: Option<&str>) -> String {
    match upstream {
        Some(ct) if ct.to_ascii_lowercase().contains("mpegurl") => ct.to_string(),
        _ => HLS_CONTENT_TYPE.to_string(),
    }
}
