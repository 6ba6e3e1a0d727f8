use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::error::{AppResult, GatewayError};

static URI_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"URI="([^"]*)""#).unwrap());

/// Which gateway mode a rewritten reference is sent back through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Segment,
    Stream,
}

impl Target {
    pub fn mode(&self) -> &'static str {
        match self {
            Target::Segment => "segment",
            Target::Stream => "stream",
        }
    }

    fn for_tag(tag: &str) -> Self {
        const PLAYLIST_TAGS: [&str; 3] = [
            "#EXT-X-MEDIA:",
            "#EXT-X-I-FRAME-STREAM-INF:",
            "#EXT-X-RENDITION-REPORT:",
        ];

        if PLAYLIST_TAGS.iter().any(|t| tag.starts_with(t)) {
            Target::Stream
        } else {
            Target::Segment
        }
    }
}

/// Builds gateway URLs of the form `<base>?mode=<mode>&url=<encoded>`.
#[derive(Debug, Clone)]
pub struct GatewayUrls {
    base: String,
}

impl GatewayUrls {
    pub fn new(public_base_url: &str) -> Self {
        let base = if public_base_url.is_empty() {
            "/".to_string()
        } else {
            public_base_url.to_string()
        };
        Self { base }
    }

    pub fn link(&self, target: Target, absolute: &Url) -> AppResult<String> {
        let query = serde_urlencoded::to_string([("mode", target.mode()), ("url", absolute.as_str())])
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        let separator = if self.base.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", self.base, separator, query))
    }
}

#[derive(Debug)]
pub enum PlaylistError {
    MissingHeader,
    BadUri(String),
    Gateway(GatewayError),
}

impl From<GatewayError> for PlaylistError {
    fn from(e: GatewayError) -> Self {
        PlaylistError::Gateway(e)
    }
}

fn split_line_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

fn resolve(base: &Url, reference: &str) -> Result<Url, PlaylistError> {
    base.join(reference)
        .map_err(|_| PlaylistError::BadUri(reference.to_string()))
}

fn rewrite_directive(line: &str, base: &Url, urls: &GatewayUrls) -> Result<String, PlaylistError> {
    if !line.trim_start().starts_with("#EXT") || !line.contains("URI=\"") {
        return Ok(line.to_string());
    }

    let target = Target::for_tag(line.trim_start());
    let mut out = String::with_capacity(line.len() * 2);
    let mut last = 0;

    for caps in URI_ATTRIBUTE.captures_iter(line) {
        let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if value.as_str().is_empty() {
            continue;
        }

        let absolute = resolve(base, value.as_str())?;
        out.push_str(&line[last..whole.start()]);
        out.push_str("URI=\"");
        out.push_str(&urls.link(target, &absolute)?);
        out.push('"');
        last = whole.end();
    }

    out.push_str(&line[last..]);
    Ok(out)
}

/// Rewrites every URI of an HLS playlist to point back through the gateway.
///
/// Directive lines are kept verbatim except for their `URI="..."`
/// attributes; line order and line endings are preserved. The URI line that
/// follows `#EXT-X-STREAM-INF` is a variant playlist and becomes a
/// `mode=stream` link, every other URI line a `mode=segment` link.
pub fn rewrite_playlist(text: &str, base: &Url, urls: &GatewayUrls) -> Result<String, PlaylistError> {
    let has_header = text
        .trim_start_matches('\u{feff}')
        .trim_start()
        .starts_with("#EXTM3U");
    if !has_header {
        return Err(PlaylistError::MissingHeader);
    }

    let mut out = String::with_capacity(text.len() * 2);
    let mut expect_variant = false;

    for raw in text.split_inclusive('\n') {
        let (line, ending) = split_line_ending(raw);
        let trimmed = line.trim().trim_start_matches('\u{feff}');

        if trimmed.is_empty() {
            out.push_str(raw);
            continue;
        }

        if trimmed.starts_with('#') {
            if trimmed.starts_with("#EXT-X-STREAM-INF") {
                expect_variant = true;
            }
            out.push_str(&rewrite_directive(line, base, urls)?);
            out.push_str(ending);
            continue;
        }

        let target = if expect_variant {
            Target::Stream
        } else {
            Target::Segment
        };
        expect_variant = false;

        let absolute = resolve(base, trimmed)?;
        out.push_str(&urls.link(target, &absolute)?);
        out.push_str(ending);
    }

    Ok(out)
}
