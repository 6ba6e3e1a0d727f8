use std::collections::BTreeMap;
use std::fs;

/// Reads cookie overrides from the environment.
///
/// `COOKIE_JSON` wins, then `TERABOX_COOKIES_JSON`, then the JSON file named by
/// `TERABOX_COOKIES_FILE`. A `COOKIE_JSON` value that is not JSON is taken as
/// the bare `ndus` cookie.
pub fn load_cookie_overrides() -> Option<BTreeMap<String, String>> {
    let cookie_json = std::env::var("COOKIE_JSON").ok();
    let cookies_json = std::env::var("TERABOX_COOKIES_JSON").ok();
    let cookies_file = std::env::var("TERABOX_COOKIES_FILE").ok();

    resolve_cookie_sources(
        cookie_json.as_deref(),
        cookies_json.as_deref(),
        cookies_file.as_deref(),
    )
}

fn resolve_cookie_sources(
    cookie_json: Option<&str>,
    cookies_json: Option<&str>,
    cookies_file: Option<&str>,
) -> Option<BTreeMap<String, String>> {
    if let Some(raw) = cookie_json.map(str::trim).filter(|s| !s.is_empty()) {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => {
                if let Some(map) = json_to_cookie_map(&value) {
                    tracing::info!("Loaded cookies from COOKIE_JSON");
                    return Some(map);
                }
            }
            Err(_) => {
                let mut map = BTreeMap::new();
                map.insert("ndus".to_string(), raw.to_string());
                return Some(map);
            }
        }
    }

    if let Some(raw) = cookies_json {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => {
                if let Some(map) = json_to_cookie_map(&value) {
                    tracing::info!("Loaded cookies from TERABOX_COOKIES_JSON");
                    return Some(map);
                }
            }
            Err(e) => tracing::warn!("Failed to parse TERABOX_COOKIES_JSON: {}", e),
        }
    }

    if let Some(path) = cookies_file {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(value) => {
                    if let Some(map) = json_to_cookie_map(&value) {
                        tracing::info!("Loaded cookies from '{}'", path);
                        return Some(map);
                    }
                }
                Err(e) => tracing::warn!("Failed to parse '{}': {}", path, e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to read '{}': {}", path, e),
        }
    }

    None
}

fn json_to_cookie_map(value: &serde_json::Value) -> Option<BTreeMap<String, String>> {
    let object = value.as_object()?;
    let map = object
        .iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect();
    Some(map)
}

/// Renders cookies as a `Cookie` header value, `None` when there are none.
pub fn cookie_header(cookies: &BTreeMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }

    Some(
        cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cookie_json_object() {
        let map = resolve_cookie_sources(Some(r#"{"ndus":"tok","lang":"en"}"#), None, None).unwrap();
        assert_eq!(map.get("ndus").map(String::as_str), Some("tok"));
        assert_eq!(cookie_header(&map).as_deref(), Some("lang=en; ndus=tok"));
    }

    #[test]
    fn test_bare_cookie_json_is_ndus() {
        let map = resolve_cookie_sources(Some("  Yabc123  "), None, None).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["ndus"], "Yabc123");
    }

    #[test]
    fn test_priority_and_file_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ndus":"from-file","count":3}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let map = resolve_cookie_sources(None, Some("not json"), Some(&path)).unwrap();
        assert_eq!(map["ndus"], "from-file");
        assert_eq!(map["count"], "3");

        let map = resolve_cookie_sources(None, Some(r#"{"ndus":"env"}"#), Some(&path)).unwrap();
        assert_eq!(map["ndus"], "env");
    }

    #[test]
    fn test_no_sources() {
        assert!(resolve_cookie_sources(None, None, Some("/nonexistent/cookies.json")).is_none());
        assert!(cookie_header(&BTreeMap::new()).is_none());
    }
}
