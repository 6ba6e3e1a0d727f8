use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AppResult, GatewayError};
use crate::models::{Quality, ShareReference};
use crate::utils::normalize_short_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Resolve,
    Page,
    Api,
    Stream,
    Segment,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Resolve, Mode::Page, Mode::Api, Mode::Stream, Mode::Segment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Resolve => "resolve",
            Mode::Page => "page",
            Mode::Api => "api",
            Mode::Stream => "stream",
            Mode::Segment => "segment",
        }
    }

    pub fn allowed() -> Vec<&'static str> {
        Self::ALL.iter().map(Mode::as_str).collect()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(GatewayError::InvalidMode)
    }
}

/// Where a `stream` request gets its playlist from.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSource {
    /// Explicit upstream identifiers and token.
    Identifiers {
        user_key: String,
        share_id: String,
        file_id: String,
        js_token: String,
    },
    /// A share resolved earlier; a fresh token is extracted per request.
    Share {
        reference: ShareReference,
        file_id: Option<String>,
    },
    /// A variant or rendition playlist emitted by an earlier rewrite.
    Variant { url: String },
}

/// A validated dispatcher request. Building one never touches the network.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeRequest {
    Resolve {
        reference: ShareReference,
        refresh: bool,
        direct: bool,
        password: Option<String>,
    },
    Page {
        reference: ShareReference,
    },
    Api {
        reference: ShareReference,
        js_token: String,
        root: bool,
        dplogid: Option<String>,
        dir: Option<String>,
        password: Option<String>,
    },
    Stream {
        source: StreamSource,
        quality: Quality,
    },
    Segment {
        url: String,
        json_errors: bool,
    },
}

/// Query parameters of one dispatcher request.
pub struct Params<'a>(pub &'a HashMap<String, String>);

impl<'a> Params<'a> {
    /// Non-blank value of `name`.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }

    fn owned(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }

    /// Values of every name in `names`, or `MissingParameter` listing the
    /// absent ones.
    fn require<const N: usize>(&self, names: [&'static str; N]) -> AppResult<[String; N]> {
        let missing: Vec<&'static str> = names
            .iter()
            .copied()
            .filter(|name| self.get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(GatewayError::MissingParameter { required: missing });
        }
        Ok(names.map(|name| self.get(name).unwrap_or_default().trim().to_string()))
    }

    fn reference(&self, name: &'static str) -> AppResult<ShareReference> {
        let [raw] = self.require([name])?;
        normalize_short_url(name, &raw).map(ShareReference::new)
    }

    pub fn mode(&self) -> AppResult<Mode> {
        self.get("mode").ok_or(GatewayError::InvalidMode)?.parse()
    }
}

impl ModeRequest {
    pub fn parse(params: &Params<'_>) -> AppResult<Self> {
        let request = match params.mode()? {
            Mode::Resolve => ModeRequest::Resolve {
                reference: params.reference("surl")?,
                refresh: params.flag("refresh"),
                direct: params.flag("direct"),
                password: params.owned("pwd"),
            },
            Mode::Page => ModeRequest::Page {
                reference: params.reference("surl")?,
            },
            Mode::Api => {
                let [js_token, _] = params.require(["jsToken", "shorturl"])?;
                ModeRequest::Api {
                    reference: params.reference("shorturl")?,
                    js_token,
                    root: params.get("root").map_or(true, |_| params.flag("root")),
                    dplogid: params.owned("dplogid"),
                    dir: params.owned("dir"),
                    password: params.owned("pwd"),
                }
            }
            Mode::Stream => ModeRequest::Stream {
                source: Self::stream_source(params)?,
                quality: params.get("type").map(str::parse::<Quality>).transpose()?.unwrap_or_default(),
            },
            Mode::Segment => {
                let [url] = params.require(["url"])?;
                ModeRequest::Segment {
                    url,
                    json_errors: params.get("errors") == Some("json"),
                }
            }
        };

        Ok(request)
    }

    fn stream_source(params: &Params<'_>) -> AppResult<StreamSource> {
        if let Some(url) = params.get("url") {
            return Ok(StreamSource::Variant {
                url: url.trim().to_string(),
            });
        }

        if params.get("surl").is_some() {
            return Ok(StreamSource::Share {
                reference: params.reference("surl")?,
                file_id: params.owned("fid"),
            });
        }

        let [user_key, share_id, file_id, js_token] =
            params.require(["uk", "shareid", "fid", "jsToken"])?;
        Ok(StreamSource::Identifiers {
            user_key,
            share_id,
            file_id,
            js_token,
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            ModeRequest::Resolve { .. } => Mode::Resolve,
            ModeRequest::Page { .. } => Mode::Page,
            ModeRequest::Api { .. } => Mode::Api,
            ModeRequest::Stream { .. } => Mode::Stream,
            ModeRequest::Segment { .. } => Mode::Segment,
        }
    }
}
