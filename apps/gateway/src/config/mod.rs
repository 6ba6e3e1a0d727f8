mod cookies;

pub use cookies::{cookie_header, load_cookie_overrides};

use crate::constants::{DEFAULT_ALLOWED_HOSTS, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prefix of the gateway URLs written into rewritten playlists.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_base_url() -> String {
    "/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: default_public_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_share_page_path")]
    pub share_page_path: String,
    #[serde(default = "default_share_api_path")]
    pub share_api_path: String,
    #[serde(default = "default_streaming_path")]
    pub streaming_path: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_client_type")]
    pub client_type: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    #[serde(default)]
    pub use_system_proxy: bool,
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
}

fn default_base_url() -> String {
    "https://www.terabox.app".to_string()
}

fn default_share_page_path() -> String {
    "/sharing/link".to_string()
}

fn default_share_api_path() -> String {
    "/share/list".to_string()
}

fn default_streaming_path() -> String {
    "/share/streaming".to_string()
}

fn default_app_id() -> String {
    "250528".to_string()
}

fn default_channel() -> String {
    "dubox".to_string()
}

fn default_client_type() -> String {
    "0".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_seconds() -> u64 {
    20
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_allowed_hosts() -> Vec<String> {
    DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            share_page_path: default_share_page_path(),
            share_api_path: default_share_api_path(),
            streaming_path: default_streaming_path(),
            app_id: default_app_id(),
            channel: default_channel(),
            client_type: default_client_type(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout_seconds(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            use_system_proxy: false,
            allowed_hosts: default_allowed_hosts(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// A host is allowed when it equals an entry or is a subdomain of one.
    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.allowed_hosts.iter().any(|allowed| {
            let allowed = allowed.to_ascii_lowercase();
            host == allowed || host.ends_with(&format!(".{}", allowed))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_cache_max_entries() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_seconds: default_cache_ttl_seconds(),
            max_entries: default_cache_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Cookie header sent upstream when the caller brings none of its own.
    pub fn default_cookie_header(&self) -> Option<String> {
        cookie_header(&self.cookies)
    }
}

pub fn load_config(config_path: &Path) -> Config {
    let mut config = read_config_file(config_path);

    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
        config.server.port = port;
    }

    if let Some(cookies) = load_cookie_overrides() {
        config.cookies = cookies;
    }

    if config.cookies.is_empty() {
        tracing::warn!("No upstream cookies configured; private shares will fail to resolve");
    }

    config
}

fn read_config_file(config_path: &Path) -> Config {
    if !config_path.exists() {
        return Config::default();
    }

    match fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Invalid config file {:?}, using defaults: {}", config_path, e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

pub fn save_default_config(config_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).map_err(|e| std::io::Error::other(e.to_string()))?;
    fs::write(config_path, yaml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = read_config_file(Path::new("/nonexistent/gateway.yaml"));
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.upstream.base_url, "https://www.terabox.app");
        assert_eq!(config.cache.ttl_seconds, 86400);
        assert!(config.cookies.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "upstream:\n  base_url: http://127.0.0.1:9000/\n  timeout_seconds: 3\ncookies:\n  ndus: abc"
        )
        .unwrap();

        let config = read_config_file(file.path());
        assert_eq!(config.upstream.timeout_seconds, 3);
        assert_eq!(config.upstream.share_api_path, "/share/list");
        assert_eq!(config.upstream.endpoint("/share/list"), "http://127.0.0.1:9000/share/list");
        assert_eq!(config.default_cookie_header().as_deref(), Some("ndus=abc"));
        assert_eq!(config.server.public_base_url, "/");
    }

    #[test]
    fn test_invalid_yaml_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [not, a, map").unwrap();

        let config = read_config_file(file.path());
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_save_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        save_default_config(&path).unwrap();

        let config = read_config_file(&path);
        assert_eq!(config.upstream.app_id, "250528");
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_allowed_host_matching() {
        let upstream = UpstreamConfig::default();
        assert!(upstream.is_allowed_host("terabox.app"));
        assert!(upstream.is_allowed_host("d8.freeterabox.com"));
        assert!(upstream.is_allowed_host("DATA.1024TERA.COM"));
        assert!(!upstream.is_allowed_host("evil.com"));
        assert!(!upstream.is_allowed_host("notterabox.app"));
        assert!(!upstream.is_allowed_host("terabox.app.evil.com"));
    }
}
