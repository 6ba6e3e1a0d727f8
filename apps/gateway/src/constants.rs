use once_cell::sync::Lazy;
use std::path::PathBuf;

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("GATEWAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"))
});

pub const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Upstream error code for shares that need a password or captcha.
pub const ERRNO_VERIFICATION_REQUIRED: i64 = 400141;

/// Upstream bodies kept for diagnostics are cut to this many characters.
pub const DIAGNOSTIC_BODY_LIMIT: usize = 512;

pub const DIRECT_LINK_CONCURRENCY: usize = 4;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0";

pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "terabox.app",
    "terabox.com",
    "teraboxshare.com",
    "1024terabox.com",
    "1024tera.com",
    "teraboxcdn.com",
    "terabox.fun",
    "freeterabox.com",
];

/// Hosts a caller may paste a full share link from.
pub const SHARE_LINK_HOSTS: &[&str] = &[
    "terabox.app",
    "www.terabox.app",
    "teraboxshare.com",
    "www.teraboxshare.com",
    "terabox.com",
    "www.terabox.com",
    "1024terabox.com",
    "www.1024terabox.com",
];
