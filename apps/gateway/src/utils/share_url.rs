use url::Url;

use crate::constants::SHARE_LINK_HOSTS;
use crate::error::GatewayError;

/// Turns a `surl` parameter into a bare short-url id.
///
/// Accepts a bare id, `https://<share host>/s/1<id>` (the leading `1` of the
/// short code is dropped) or `https://<share host>/...?surl=<id>`.
pub fn normalize_short_url(name: &'static str, raw: &str) -> Result<String, GatewayError> {
    let raw = raw.trim();
    let invalid = |reason: &str| GatewayError::InvalidParameter {
        name,
        reason: reason.to_string(),
    };

    if !raw.contains("://") {
        if raw.is_empty() || raw.contains(['/', '?', '&', ' ']) {
            return Err(invalid("not a valid share id"));
        }
        return Ok(raw.to_string());
    }

    let url = Url::parse(raw).map_err(|_| invalid("not a valid share link"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("share link must be http(s)"));
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !SHARE_LINK_HOSTS.contains(&host.as_str()) {
        return Err(invalid("unsupported share host"));
    }

    if let Some((_, surl)) = url.query_pairs().find(|(k, _)| k == "surl") {
        if !surl.is_empty() {
            return Ok(surl.into_owned());
        }
    }

    let code = url
        .path()
        .split_once("/s/")
        .map(|(_, rest)| rest.split('/').next().unwrap_or_default())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| invalid("share link has no short code"))?;

    let id = code.strip_prefix('1').unwrap_or(code);
    if id.is_empty() {
        return Err(invalid("share link has no short code"));
    }

    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_id_is_kept() {
        assert_eq!(normalize_short_url("surl", "abc123").unwrap(), "abc123");
        assert_eq!(normalize_short_url("surl", " 1abc ").unwrap(), "1abc");
    }

    #[test]
    fn test_share_links() {
        assert_eq!(
            normalize_short_url("surl", "https://www.terabox.app/s/1AbCdEf").unwrap(),
            "AbCdEf"
        );
        assert_eq!(
            normalize_short_url("surl", "https://teraboxshare.com/sharing/link?surl=XyZ").unwrap(),
            "XyZ"
        );
    }

    #[test]
    fn test_rejected_links() {
        for raw in [
            "",
            "a/b",
            "ftp://terabox.app/s/1abc",
            "https://evil.com/s/1abc",
            "https://terabox.app/folder",
            "https://terabox.app/s/1",
        ] {
            assert!(
                matches!(
                    normalize_short_url("surl", raw),
                    Err(GatewayError::InvalidParameter { name: "surl", .. })
                ),
                "{raw}"
            );
        }
    }
}
