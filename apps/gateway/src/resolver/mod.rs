//! Share resolution: share page → jsToken → share API → normalised entries.

mod normalize;

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::constants::{DIRECT_LINK_CONCURRENCY, ERRNO_VERIFICATION_REQUIRED};
use crate::error::{AppResult, GatewayError, UpstreamDiagnostics};
use crate::extractor::TokenExtractor;
use crate::models::{PageTokens, ResolvedShare, ShareReference};
use crate::upstream::{RequestContext, ShareApiQuery, TextReply, UpstreamClient};

pub use normalize::sanitize_upstream;

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct ShareResolver {
    client: UpstreamClient,
    extractor: Arc<TokenExtractor>,
}

impl ShareResolver {
    pub fn new(client: UpstreamClient, extractor: Arc<TokenExtractor>) -> Self {
        Self { client, extractor }
    }

    /// Raw share-page HTML.
    pub async fn fetch_page(&self, reference: &ShareReference, ctx: &RequestContext) -> AppResult<String> {
        let reply = self
            .client
            .fetch_share_page(&reference.short_url_id, ctx)
            .await?;

        if !reply.is_success() {
            return Err(GatewayError::UpstreamRejected(reply.diagnostics()));
        }

        Ok(reply.body)
    }

    /// Fetches the share page and pulls a fresh jsToken out of it.
    pub async fn obtain_tokens(
        &self,
        reference: &ShareReference,
        ctx: &RequestContext,
    ) -> AppResult<PageTokens> {
        let html = self.fetch_page(reference, ctx).await?;

        self.extractor.extract(&html).map_err(|e| match e {
            GatewayError::TokenNotFound => {
                tracing::warn!(
                    "No jsToken in share page for {} (cookies sent: {})",
                    reference.short_url_id,
                    ctx.cookies.is_some()
                );
                GatewayError::TokenExtractionFailed
            }
            other => other,
        })
    }

    /// Full resolution. Extracts a token first unless one is supplied, and
    /// expands a share whose root is a single folder into its contents.
    pub async fn resolve(
        &self,
        reference: &ShareReference,
        tokens: Option<PageTokens>,
        options: &ResolveOptions,
        ctx: &RequestContext,
    ) -> AppResult<ResolvedShare> {
        let tokens = match tokens {
            Some(tokens) => tokens,
            None => self.obtain_tokens(reference, ctx).await?,
        };

        let query = ShareApiQuery {
            js_token: tokens.js_token.value.clone(),
            short_url: reference.short_url_id.clone(),
            root: true,
            dplogid: tokens.dplogid.clone(),
            dir: None,
            password: options.password.clone(),
        };
        let root = self.call_api(reference, &query, ctx).await?;

        let folder = match root.entries.as_slice() {
            [only] if only.is_directory => only.path.clone(),
            _ => return Ok(root),
        };

        let listing_query = ShareApiQuery {
            root: false,
            dir: Some(folder.clone()),
            ..query
        };

        match self
            .call_api_with_fallback(reference, &listing_query, Some((root.user_key.as_str(), root.share_id.as_str())), ctx)
            .await
        {
            Ok(listing) => {
                tracing::info!("Expanded folder {} into {} entries", folder, listing.entries.len());
                Ok(listing)
            }
            Err(e) => {
                tracing::warn!("Failed to list folder {}, returning folder entry: {}", folder, e);
                Ok(root)
            }
        }
    }

    /// One share-API call, normalised.
    pub async fn call_api(
        &self,
        reference: &ShareReference,
        query: &ShareApiQuery,
        ctx: &RequestContext,
    ) -> AppResult<ResolvedShare> {
        self.call_api_with_fallback(reference, query, None, ctx).await
    }

    async fn call_api_with_fallback(
        &self,
        reference: &ShareReference,
        query: &ShareApiQuery,
        ids_fallback: Option<(&str, &str)>,
        ctx: &RequestContext,
    ) -> AppResult<ResolvedShare> {
        let reply = self.client.call_share_api(query, ctx).await?;

        if !reply.is_success() {
            return Err(GatewayError::UpstreamRejected(api_diagnostics(&reply, None)));
        }

        let value: serde_json::Value = serde_json::from_str(&reply.body)
            .map_err(|_| GatewayError::UpstreamRejected(reply.diagnostics()))?;
        let value = sanitize_upstream(value);

        let errno = value.get("errno").and_then(normalize::value_i64);
        match errno {
            Some(ERRNO_VERIFICATION_REQUIRED) => return Err(GatewayError::VerificationRequired),
            Some(code) if code != 0 => {
                return Err(GatewayError::UpstreamRejected(
                    api_diagnostics(&reply, Some(code)),
                ))
            }
            _ => {}
        }

        let list = value
            .get("list")
            .and_then(|l| l.as_array())
            .ok_or_else(|| GatewayError::UpstreamRejected(api_diagnostics(&reply, errno)))?;

        let (user_key, share_id) = normalize::share_ids(&value)
            .or_else(|| ids_fallback.map(|(uk, sid)| (uk.to_string(), sid.to_string())))
            .ok_or_else(|| GatewayError::IncompleteMetadata("share has no uk/share_id".to_string()))?;

        let entries = list
            .iter()
            .map(|item| normalize::entry(item, &user_key, &share_id))
            .collect::<AppResult<Vec<_>>>()?;

        tracing::info!("Share {} lists {} entries", reference.short_url_id, entries.len());

        Ok(ResolvedShare {
            reference: reference.clone(),
            user_key,
            share_id,
            entries,
            upstream: value,
        })
    }

    /// Fills `direct_link` for regular files by reading the redirect target of
    /// their download link. Probe failures leave the field empty.
    pub async fn attach_direct_links(&self, share: &mut ResolvedShare, ctx: &RequestContext) {
        let probes: Vec<(usize, String)> = share
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_directory)
            .filter_map(|(i, e)| e.download_link.clone().map(|link| (i, link)))
            .collect();

        let results: Vec<(usize, Option<String>)> = stream::iter(probes)
            .map(|(i, link)| async move {
                match self.client.probe_redirect(&link, ctx).await {
                    Ok(location) => (i, location),
                    Err(e) => {
                        tracing::warn!("Direct link probe failed: {}", e);
                        (i, None)
                    }
                }
            })
            .buffer_unordered(DIRECT_LINK_CONCURRENCY)
            .collect()
            .await;

        for (i, location) in results {
            share.entries[i].direct_link = location;
        }
    }
}

/// Diagnostics of a share-API reply, with credentials removed when the body
/// is JSON.
fn api_diagnostics(reply: &TextReply, errno: Option<i64>) -> UpstreamDiagnostics {
    let body = match serde_json::from_str::<serde_json::Value>(&reply.body) {
        Ok(value) => sanitize_upstream(value).to_string(),
        Err(_) => reply.body.clone(),
    };
    UpstreamDiagnostics::new(reply.status, &body).with_errno(errno)
}
