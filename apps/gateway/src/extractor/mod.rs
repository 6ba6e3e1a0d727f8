//! jsToken extraction from share-page HTML.
//!
//! The share page inlines the token as a JavaScript literal. The exact
//! markup is not under our control, so every recognised embedding lives in
//! [`patterns`] and callers only see [`TokenExtractor::extract`].

mod patterns;

pub use patterns::{RegexTokenPattern, TokenMatch, TokenPattern};

use crate::error::GatewayError;
use crate::models::{JsToken, PageTokens};

pub struct TokenExtractor {
    patterns: Vec<Box<dyn TokenPattern>>,
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self::with_patterns(patterns::default_patterns())
    }
}

impl TokenExtractor {
    pub fn with_patterns(patterns: Vec<Box<dyn TokenPattern>>) -> Self {
        Self { patterns }
    }

    /// Earliest match across all patterns wins.
    pub fn extract(&self, html: &str) -> Result<PageTokens, GatewayError> {
        let (pattern, found) = self
            .patterns
            .iter()
            .filter_map(|p| p.find(html).map(|m| (p.name(), m)))
            .min_by_key(|(_, m)| m.offset)
            .ok_or(GatewayError::TokenNotFound)?;

        tracing::debug!("jsToken found via '{}' pattern at offset {}", pattern, found.offset);

        Ok(PageTokens {
            js_token: JsToken::new(found.value),
            dplogid: patterns::find_dplogid(html),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(html: &str) -> Result<String, GatewayError> {
        TokenExtractor::default()
            .extract(html)
            .map(|t| t.js_token.value)
    }

    #[test]
    fn test_quoting_and_whitespace_variants() {
        let variants = [
            r#"<script>var jsToken="T1";</script>"#,
            r#"<script>var jsToken = 'T1';</script>"#,
            "<script>\n  window.jsToken\t=\n  \"T1\"\n</script>",
            r#"<script>var data = {"jsToken": "T1", "other": 1};</script>"#,
            r#"<script>var data = {'jsToken' :'T1'};</script>"#,
        ];

        for html in variants {
            assert_eq!(token(html).unwrap(), "T1", "{html}");
        }
    }

    #[test]
    fn test_first_valid_occurrence_wins() {
        let html = r#"<script>jsToken = ""; jsToken = "FIRST"; jsToken = "SECOND";</script>"#;
        assert_eq!(token(html).unwrap(), "FIRST");
    }

    #[test]
    fn test_longer_identifiers_are_ignored() {
        let html = r#"<script>var notjsToken = "X"; var $jsToken = "Y"; var jsToken = "T1";</script>"#;
        assert_eq!(token(html).unwrap(), "T1");

        assert!(matches!(token(r#"var my_jsToken = "X";"#), Err(GatewayError::TokenNotFound)));
        assert_eq!(token(r#"jsToken="START""#).unwrap(), "START");
    }

    #[test]
    fn test_encoded_template_token() {
        let html = r#"<script>var templateData = decodeURIComponent(`%7B%22jsToken%22%3Afn%28%22AB12cd34%22%29%7D`);</script>"#;
        assert_eq!(token(html).unwrap(), "AB12cd34");
    }

    #[test]
    fn test_earliest_pattern_match_is_taken() {
        let html = r#"fn%28%22ENCODED%22%29 ... jsToken = "LITERAL""#;
        assert_eq!(token(html).unwrap(), "ENCODED");
    }

    #[test]
    fn test_missing_token() {
        for html in ["", "<html><body>Please log in</body></html>", "jsToken = unquoted;"] {
            assert!(matches!(token(html), Err(GatewayError::TokenNotFound)), "{html}");
        }
    }

    #[test]
    fn test_dplogid_companion() {
        let html = r#"<script>jsToken="T1"; var u = "/api?dp-logid=9988776655&x=1";</script>"#;
        let tokens = TokenExtractor::default().extract(html).unwrap();
        assert_eq!(tokens.dplogid.as_deref(), Some("9988776655"));
    }

    struct FixedPattern;

    impl TokenPattern for FixedPattern {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn find(&self, html: &str) -> Option<TokenMatch> {
            html.find("TOKEN:").map(|offset| TokenMatch {
                offset,
                value: html[offset + 6..].trim().to_string(),
            })
        }
    }

    #[test]
    fn test_custom_pattern() {
        let extractor = TokenExtractor::with_patterns(vec![Box::new(FixedPattern)]);
        let tokens = extractor.extract("header TOKEN: xyz").unwrap();
        assert_eq!(tokens.js_token.value, "xyz");
    }
}
