//! HTTP client for the storage service.
//!
//! Every call is independent: cookies come from the per-request
//! [`RequestContext`], no cookie jar is kept between requests, and each call
//! is bounded by the configured timeout.

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client, RequestBuilder, Response};
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{AppResult, GatewayError, UpstreamDiagnostics};

/// Per-request values threaded into every upstream call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// `Cookie` header forwarded upstream.
    pub cookies: Option<String>,
    /// True when `cookies` came from the caller rather than gateway config.
    pub caller_cookies: bool,
}

/// Query of one share-API call.
#[derive(Debug, Clone)]
pub struct ShareApiQuery {
    pub js_token: String,
    pub short_url: String,
    pub root: bool,
    pub dplogid: Option<String>,
    pub dir: Option<String>,
    pub password: Option<String>,
}

/// Text reply of an upstream call, with the URL it was finally served from.
#[derive(Debug, Clone)]
pub struct TextReply {
    pub status: u16,
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

impl TextReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn diagnostics(&self) -> UpstreamDiagnostics {
        UpstreamDiagnostics::new(self.status, &self.body)
    }
}

/// Redirect refused because its target host is not allowed.
#[derive(Debug)]
pub struct ForbiddenRedirect(pub String);

impl fmt::Display for ForbiddenRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "redirect to non-allowed host {}", self.0)
    }
}

impl std::error::Error for ForbiddenRedirect {}

const MAX_REDIRECTS: usize = 10;

/// Follows redirects only while every hop stays on an allowed host.
fn allowed_hosts_policy(config: Arc<UpstreamConfig>) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match attempt.url().host_str() {
            Some(host) if config.is_allowed_host(host) => attempt.follow(),
            host => {
                let host = host.unwrap_or("-").to_string();
                tracing::warn!("Refusing redirect to non-allowed host {}", host);
                attempt.error(ForbiddenRedirect(host))
            }
        }
    })
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    no_redirect: Client,
    config: Arc<UpstreamConfig>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> AppResult<Self> {
        let config = Arc::new(config.clone());
        let build = |policy: redirect::Policy| {
            let mut builder = Client::builder()
                .user_agent(&config.user_agent)
                .connect_timeout(config.connect_timeout())
                .redirect(policy);
            if !config.use_system_proxy {
                builder = builder.no_proxy();
            }
            builder
                .build()
                .map_err(|e| GatewayError::Internal(format!("Failed to build HTTP client: {}", e)))
        };

        Ok(Self {
            http: build(allowed_hosts_policy(Arc::clone(&config)))?,
            no_redirect: build(redirect::Policy::none())?,
            config,
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Parses a caller-supplied upstream URL and checks it against the
    /// allowed host set, so the gateway cannot be used as an open relay.
    pub fn checked_url(&self, name: &'static str, raw: &str) -> AppResult<Url> {
        let invalid = |reason: &str| GatewayError::InvalidParameter {
            name,
            reason: reason.to_string(),
        };

        let url = Url::parse(raw.trim()).map_err(|_| invalid("not an absolute URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("only http(s) URLs can be proxied"));
        }

        let host = url.host_str().ok_or_else(|| invalid("URL has no host"))?;
        if !self.config.is_allowed_host(host) {
            tracing::warn!("Refusing to proxy non-allowed host {}", host);
            return Err(GatewayError::ForbiddenUpstreamHost(host.to_string()));
        }

        Ok(url)
    }

    fn decorate(&self, builder: RequestBuilder, ctx: &RequestContext) -> RequestBuilder {
        let mut builder = builder
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::REFERER, format!("{}/", self.config.base_url.trim_end_matches('/')));
        if let Some(cookies) = &ctx.cookies {
            builder = builder.header(header::COOKIE, cookies);
        }
        builder
    }

    fn common_params(&self) -> [(&'static str, &str); 4] {
        [
            ("app_id", self.config.app_id.as_str()),
            ("web", "1"),
            ("channel", self.config.channel.as_str()),
            ("clienttype", self.config.client_type.as_str()),
        ]
    }

    async fn send_text(&self, builder: RequestBuilder) -> AppResult<TextReply> {
        let response = builder.timeout(self.config.timeout()).send().await?;
        read_text(response).await
    }

    pub async fn fetch_share_page(&self, short_url: &str, ctx: &RequestContext) -> AppResult<TextReply> {
        let url = self.config.endpoint(&self.config.share_page_path);
        tracing::debug!("Fetching share page for {}", short_url);

        let builder = self.http.get(url).query(&[("surl", short_url)]);
        self.send_text(self.decorate(builder, ctx)).await
    }

    pub async fn call_share_api(&self, query: &ShareApiQuery, ctx: &RequestContext) -> AppResult<TextReply> {
        let url = self.config.endpoint(&self.config.share_api_path);
        tracing::debug!(
            "Calling share API for {} (root={}, dir={:?})",
            query.short_url,
            query.root,
            query.dir
        );

        let mut params: Vec<(&str, &str)> = self.common_params().to_vec();
        params.push(("jsToken", query.js_token.as_str()));
        params.push(("shorturl", query.short_url.as_str()));
        params.push(("root", if query.root { "1" } else { "0" }));
        if let Some(dplogid) = &query.dplogid {
            params.push(("dplogid", dplogid.as_str()));
        }
        if let Some(dir) = &query.dir {
            params.extend([("dir", dir.as_str()), ("order", "asc"), ("by", "name")]);
        }
        if let Some(pwd) = &query.password {
            params.push(("pwd", pwd.as_str()));
        }

        let builder = self.http.get(url).query(&params);
        self.send_text(self.decorate(builder, ctx)).await
    }

    pub async fn fetch_stream_playlist(
        &self,
        params: &crate::models::StreamParameters,
        ctx: &RequestContext,
    ) -> AppResult<TextReply> {
        let url = self.config.endpoint(&self.config.streaming_path);
        tracing::debug!(
            "Fetching {} playlist for fid {}",
            params.quality,
            params.file_id
        );

        let mut query: Vec<(&str, &str)> = self.common_params().to_vec();
        query.extend([
            ("uk", params.user_key.as_str()),
            ("shareid", params.share_id.as_str()),
            ("fid", params.file_id.as_str()),
            ("type", params.quality.as_upstream()),
            ("jsToken", params.js_token.value.as_str()),
            ("esl", "1"),
            ("isplayer", "1"),
            ("ehps", "1"),
        ]);

        let builder = self.http.get(url).query(&query);
        self.send_text(self.decorate(builder, ctx)).await
    }

    pub async fn fetch_url_text(&self, url: &Url, ctx: &RequestContext) -> AppResult<TextReply> {
        tracing::debug!("Fetching {}", url.path());
        let builder = self.http.get(url.clone());
        self.send_text(self.decorate(builder, ctx)).await
    }

    /// Starts a streaming GET. The timeout bounds the wait for response
    /// headers; the body is pulled as the caller consumes it.
    pub async fn open_stream(
        &self,
        url: &Url,
        forwarded: HeaderMap,
        ctx: &RequestContext,
    ) -> AppResult<Response> {
        let builder = self.decorate(self.http.get(url.clone()), ctx).headers(forwarded);

        match tokio::time::timeout(self.config.timeout(), builder.send()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GatewayError::UpstreamTimeout),
        }
    }

    /// HEAD without following redirects; returns the `Location` target.
    pub async fn probe_redirect(&self, url: &str, ctx: &RequestContext) -> AppResult<Option<String>> {
        let builder = self.decorate(self.no_redirect.head(url), ctx);
        let response = builder.timeout(self.config.timeout()).send().await?;

        Ok(response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }
}

async fn read_text(response: Response) -> AppResult<TextReply> {
    let status = response.status().as_u16();
    let url = response.url().clone();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await?;

    Ok(TextReply {
        status,
        url,
        content_type,
        body,
    })
}
