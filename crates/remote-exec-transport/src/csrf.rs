//! Forgery-protection token.

use std::{fmt, sync::OnceLock};

use regex_lite::Regex;

use crate::ConstructionError;

/// Header the token is sent in unless configured otherwise.
pub const DEFAULT_TOKEN_HEADER: &str = "X-CSRFToken";

/// Environment variable consulted by [`CsrfToken::from_env`].
pub const TOKEN_ENV: &str = "REMOTE_EXEC_CSRF_TOKEN";

/// Anti-CSRF credential attached to every request.
///
/// Never empty. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Wrap a raw token.
    ///
    /// # Errors
    /// Returns `MissingToken` if the value is blank.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConstructionError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConstructionError::MissingToken);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Read the token from `REMOTE_EXEC_CSRF_TOKEN`.
    ///
    /// # Errors
    /// Returns `MissingToken` if the variable is unset or blank.
    pub fn from_env() -> Result<Self, ConstructionError> {
        std::env::var(TOKEN_ENV)
            .map_err(|_| ConstructionError::MissingToken)
            .and_then(Self::new)
    }

    /// Extract the token from a page's `<meta name="csrf-token">` tag.
    ///
    /// # Errors
    /// Returns `MissingToken` if the page carries no usable tag.
    pub fn from_meta(html: &str) -> Result<Self, ConstructionError> {
        csrf_token_from_meta(html)
            .ok_or(ConstructionError::MissingToken)
            .and_then(Self::new)
    }

    /// Raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(<redacted>)")
    }
}

/// Find the `content` of the first `<meta name="csrf-token">` tag.
#[must_use]
pub fn csrf_token_from_meta(html: &str) -> Option<String> {
    meta_tag_regex()
        .find_iter(html)
        .find(|tag| name_attr_regex().is_match(tag.as_str()))
        .and_then(|tag| content_attr_regex().captures(tag.as_str()))
        .and_then(|caps| caps.get(1))
        .map(|content| content.as_str().to_string())
}

#[allow(clippy::unwrap_used)]
fn meta_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<meta\b[^>]*>").unwrap())
}

#[allow(clippy::unwrap_used)]
fn name_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bname\s*=\s*["']csrf-token["']"#).unwrap())
}

#[allow(clippy::unwrap_used)]
fn content_attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\bcontent\s*=\s*["']([^"']*)["']"#).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_is_rejected() {
        assert!(matches!(
            CsrfToken::new("   "),
            Err(ConstructionError::MissingToken)
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = CsrfToken::new("secret-value").unwrap();
        assert!(!format!("{token:?}").contains("secret-value"));
        assert_eq!(token.expose(), "secret-value");
    }

    #[test]
    fn meta_tag_in_either_attribute_order() {
        let html = r#"<head>
            <meta charset="utf-8">
            <meta content="abc123" name="csrf-token">
        </head>"#;
        assert_eq!(csrf_token_from_meta(html).as_deref(), Some("abc123"));

        let html = r#"<META NAME='csrf-token' CONTENT='xyz'>"#;
        assert_eq!(csrf_token_from_meta(html).as_deref(), Some("xyz"));
    }

    #[test]
    fn page_without_meta_tag_has_no_token() {
        let html = r#"<meta name="viewport" content="width=device-width">"#;
        assert!(csrf_token_from_meta(html).is_none());
        assert!(CsrfToken::from_meta(html).is_err());
    }

    #[test]
    fn empty_meta_content_is_missing() {
        let html = r#"<meta name="csrf-token" content="">"#;
        assert!(matches!(
            CsrfToken::from_meta(html),
            Err(ConstructionError::MissingToken)
        ));
    }
}
