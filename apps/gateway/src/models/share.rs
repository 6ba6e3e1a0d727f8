use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One shared item or folder on the storage service, by short-url id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareReference {
    pub short_url_id: String,
}

impl ShareReference {
    pub fn new(short_url_id: impl Into<String>) -> Self {
        Self {
            short_url_id: short_url_id.into(),
        }
    }
}

/// Short-lived credential scraped from a share page. Never cached, never
/// serialized into responses.
#[derive(Clone, PartialEq, Eq)]
pub struct JsToken {
    pub value: String,
    pub extracted_at: DateTime<Utc>,
}

impl JsToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            extracted_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for JsToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsToken")
            .field("value", &"<redacted>")
            .field("extracted_at", &self.extracted_at)
            .finish()
    }
}

/// Everything the token extractor recovers from one share page.
#[derive(Debug, Clone)]
pub struct PageTokens {
    pub js_token: JsToken,
    pub dplogid: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareMetadata {
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    pub size_formatted: String,
    pub path: String,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "thumbnail", skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub thumbnails: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_link: Option<String>,
    pub file_id: String,
    pub user_key: String,
    pub share_id: String,
    pub stored_at: DateTime<Utc>,
}

/// Normalised result of one share resolution.
#[derive(Debug, Clone)]
pub struct ResolvedShare {
    pub reference: ShareReference,
    pub user_key: String,
    pub share_id: String,
    pub entries: Vec<ShareMetadata>,
    /// Upstream API reply with credentials stripped, for `raw=1` callers.
    pub upstream: serde_json::Value,
}

impl ResolvedShare {
    /// A lone regular file is returned bare, anything else as a listing.
    pub fn data(&self) -> ShareData<'_> {
        match self.entries.as_slice() {
            [single] if !single.is_directory => ShareData::File(single),
            entries => ShareData::Listing(ShareListing {
                user_key: &self.user_key,
                share_id: &self.share_id,
                total: entries.len(),
                entries,
            }),
        }
    }

    pub fn first_file(&self) -> Option<&ShareMetadata> {
        self.entries.iter().find(|e| !e.is_directory)
    }

    pub fn find_file(&self, file_id: &str) -> Option<&ShareMetadata> {
        self.entries
            .iter()
            .find(|e| !e.is_directory && e.file_id == file_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ShareData<'a> {
    File(&'a ShareMetadata),
    Listing(ShareListing<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareListing<'a> {
    pub user_key: &'a str,
    pub share_id: &'a str,
    pub total: usize,
    pub entries: &'a [ShareMetadata],
}
