use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AppResult, GatewayError};
use crate::models::ShareMetadata;
use crate::utils::{format_size, thumbnail_dimensions};

const THUMBNAIL_PREFERENCE: [&str; 4] = ["url3", "url2", "url1", "icon"];

/// Upstream fields come back as strings or numbers depending on endpoint.
pub(crate) fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub(crate) fn share_ids(reply: &Value) -> Option<(String, String)> {
    let user_key = reply.get("uk").and_then(value_string)?;
    let share_id = reply
        .get("share_id")
        .or_else(|| reply.get("shareid"))
        .and_then(value_string)?;
    Some((user_key, share_id))
}

pub(crate) fn entry(item: &Value, user_key: &str, share_id: &str) -> AppResult<ShareMetadata> {
    let file_id = item
        .get("fs_id")
        .and_then(value_string)
        .ok_or_else(|| GatewayError::IncompleteMetadata("entry has no fs_id".to_string()))?;

    let size_bytes = item.get("size").and_then(value_u64).unwrap_or(0);
    let thumbs = item.get("thumbs").and_then(|t| t.as_object());

    let thumbnails: BTreeMap<String, String> = thumbs
        .map(|t| {
            t.values()
                .filter_map(|v| v.as_str().filter(|s| !s.is_empty()))
                .map(|url| (thumbnail_dimensions(url), url.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let thumbnail_url = thumbs.and_then(|t| {
        THUMBNAIL_PREFERENCE
            .iter()
            .find_map(|key| t.get(*key).and_then(value_string))
    });

    Ok(ShareMetadata {
        name: item
            .get("server_filename")
            .and_then(value_string)
            .unwrap_or_else(|| "Unknown".to_string()),
        size_bytes,
        size_formatted: format_size(size_bytes),
        path: item.get("path").and_then(value_string).unwrap_or_default(),
        is_directory: item.get("isdir").map(value_flag).unwrap_or(false),
        category: item.get("category").and_then(value_string),
        thumbnail_url,
        thumbnails,
        download_link: item.get("dlink").and_then(value_string),
        direct_link: None,
        file_id,
        user_key: user_key.to_string(),
        share_id: share_id.to_string(),
        stored_at: Utc::now(),
    })
}

/// Removes credentials from an upstream reply before it is echoed or cached.
pub fn sanitize_upstream(mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.remove("jsToken");
        object.remove("bdstoken");
    }
    value
}
