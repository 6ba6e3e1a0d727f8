use once_cell::sync::Lazy;
use regex::Regex;

/// A token found in a page, with its byte offset for earliest-match ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch {
    pub offset: usize,
    pub value: String,
}

/// One way the share page may embed the jsToken.
pub trait TokenPattern: Send + Sync {
    fn name(&self) -> &'static str;

    /// First syntactically valid occurrence in `html`, if any.
    fn find(&self, html: &str) -> Option<TokenMatch>;
}

/// Regex pattern whose first non-empty capture group is the token.
pub struct RegexTokenPattern {
    name: &'static str,
    regex: &'static Regex,
}

impl RegexTokenPattern {
    pub fn new(name: &'static str, regex: &'static Regex) -> Self {
        Self { name, regex }
    }
}

impl TokenPattern for RegexTokenPattern {
    fn name(&self) -> &'static str {
        self.name
    }

    fn find(&self, html: &str) -> Option<TokenMatch> {
        self.regex.captures_iter(html).find_map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .find(|m| !m.as_str().trim().is_empty())
                .map(|m| TokenMatch {
                    offset: caps.get(0).map(|whole| whole.start()).unwrap_or(m.start()),
                    value: m.as_str().trim().to_string(),
                })
        })
    }
}

// `jsToken = "..."`, `window.jsToken='...'`, `"jsToken": "..."`.
// The name must not be the tail of a longer identifier.
static JS_TOKEN_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^\w$])["']?jsToken["']?\s*[:=]\s*(?:"([^"\r\n]*)"|'([^'\r\n]*)')"#).unwrap()
});

// Percent-encoded template data: `fn%28%22<token>%22%29`
static JS_TOKEN_ENCODED_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"fn%28%22([0-9A-Za-z_\-]+)%22%29"#).unwrap());

static DP_LOGID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"dp-logid=([0-9A-Za-z_\-]+)"#).unwrap());

pub fn default_patterns() -> Vec<Box<dyn TokenPattern>> {
    vec![
        Box::new(RegexTokenPattern::new("literal", &JS_TOKEN_LITERAL)),
        Box::new(RegexTokenPattern::new("encoded-call", &JS_TOKEN_ENCODED_CALL)),
    ]
}

pub fn find_dplogid(html: &str) -> Option<String> {
    DP_LOGID
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
