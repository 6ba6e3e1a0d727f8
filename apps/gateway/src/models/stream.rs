use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;
use crate::models::JsToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Auto360,
    Auto480,
    #[default]
    Auto720,
    Auto1080,
}

impl Quality {
    pub fn as_upstream(&self) -> &'static str {
        match self {
            Quality::Auto360 => "M3U8_AUTO_360",
            Quality::Auto480 => "M3U8_AUTO_480",
            Quality::Auto720 => "M3U8_AUTO_720",
            Quality::Auto1080 => "M3U8_AUTO_1080",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_upstream())
    }
}

impl FromStr for Quality {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let height = normalized
            .strip_prefix("M3U8_AUTO_")
            .unwrap_or(&normalized)
            .trim_end_matches('P');

        match height {
            "360" => Ok(Quality::Auto360),
            "480" => Ok(Quality::Auto480),
            "720" => Ok(Quality::Auto720),
            "1080" => Ok(Quality::Auto1080),
            _ => Err(GatewayError::InvalidParameter {
                name: "type",
                reason: format!("unsupported quality '{}'", s),
            }),
        }
    }
}

/// Inputs of one upstream streaming-playlist request.
#[derive(Debug, Clone)]
pub struct StreamParameters {
    pub user_key: String,
    pub share_id: String,
    pub file_id: String,
    pub js_token: JsToken,
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_parsing() {
        assert_eq!("M3U8_AUTO_360".parse::<Quality>().unwrap(), Quality::Auto360);
        assert_eq!("m3u8_auto_1080".parse::<Quality>().unwrap(), Quality::Auto1080);
        assert_eq!("480".parse::<Quality>().unwrap(), Quality::Auto480);
        assert_eq!("720p".parse::<Quality>().unwrap(), Quality::Auto720);
        assert!("M3U8_AUTO_4K".parse::<Quality>().is_err());
        assert_eq!(Quality::default().to_string(), "M3U8_AUTO_720");
    }
}
