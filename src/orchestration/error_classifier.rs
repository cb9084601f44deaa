//! # Adapter Error Classification
//!
//! Maps adapter failures onto the fixed `ErrorKind` taxonomy.
//!
//! ## Overview
//!
//! Adapters report failures as a tagged `AdapterError` instead of raising
//! exceptions. Classification is a pure function over that union: keyword
//! matching on the lowercased message first, then the HTTP status, then
//! `unknown`. Every input classifies to exactly one kind.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ AdapterError    │────▶│ ErrorClassifier │────▶│ ErrorKind       │
//! │ (msg + status)  │     │ keyword rules   │     │ + match source  │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use mediacrawl_core::orchestration::error_classifier::{classify, AdapterError, ErrorClassifier, KeywordErrorClassifier};
//! use mediacrawl_core::models::ErrorKind;
//!
//! assert_eq!(classify("HTTP 429 Too Many Requests", None), ErrorKind::RateLimited);
//!
//! let classifier = KeywordErrorClassifier::new();
//! let error = AdapterError::Http { status: 403, message: "nope".into() };
//! assert_eq!(classifier.classify_error(&error).kind, ErrorKind::PermissionDenied);
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::models::ErrorKind;

/// Failure reported by a platform adapter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// The adapter already knows which kind of failure this is
    #[error("{kind}: {message}")]
    Declared { kind: ErrorKind, message: String },

    /// HTTP-like response with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection-level failure before any response
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl AdapterError {
    pub fn declared(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Declared {
            kind,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Declared { message, .. } | Self::Http { message, .. } => message,
            Self::Transport(message) | Self::Other(message) => message,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// What decided the classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "detail")]
pub enum MatchSource {
    Declared,
    Keyword(&'static str),
    HttpStatus(u16),
    Transport,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub source: MatchSource,
}

/// Keyword group for one error kind
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub kind: ErrorKind,
    pub keywords: &'static [&'static str],
}

/// Checked in order; the first matching group wins
pub const DEFAULT_RULES: [KeywordRule; 6] = [
    KeywordRule {
        kind: ErrorKind::PermissionDenied,
        keywords: &["permission", "unauthorized", "forbidden", "403"],
    },
    KeywordRule {
        kind: ErrorKind::CaptchaRequired,
        keywords: &["captcha", "verify", "验证码", "471", "461"],
    },
    KeywordRule {
        kind: ErrorKind::RateLimited,
        keywords: &["rate limit", "too many requests", "429"],
    },
    KeywordRule {
        kind: ErrorKind::LoginRequired,
        keywords: &["login required", "not logged in", "未登录"],
    },
    KeywordRule {
        kind: ErrorKind::AccountBlocked,
        keywords: &["blocked", "banned", "account suspended"],
    },
    KeywordRule {
        kind: ErrorKind::NetworkError,
        keywords: &["timeout", "connection", "network"],
    },
];

fn match_keywords(rules: &[KeywordRule], message: &str) -> Option<(ErrorKind, &'static str)> {
    let lowered = message.to_lowercase();
    rules.iter().find_map(|rule| {
        rule.keywords
            .iter()
            .find(|keyword| lowered.contains(*keyword))
            .map(|keyword| (rule.kind, *keyword))
    })
}

fn match_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 | 403 => Some(ErrorKind::PermissionDenied),
        429 => Some(ErrorKind::RateLimited),
        461 | 471 => Some(ErrorKind::CaptchaRequired),
        500..=599 => Some(ErrorKind::NetworkError),
        _ => None,
    }
}

/// Classify a raw error message and optional HTTP status. Total: unmatched
/// input is `Unknown`.
pub fn classify(raw_error: &str, http_status: Option<u16>) -> ErrorKind {
    classify_with_rules(&DEFAULT_RULES, raw_error, http_status).kind
}

fn classify_with_rules(
    rules: &[KeywordRule],
    raw_error: &str,
    http_status: Option<u16>,
) -> ErrorClassification {
    if let Some((kind, keyword)) = match_keywords(rules, raw_error) {
        return ErrorClassification {
            kind,
            source: MatchSource::Keyword(keyword),
        };
    }

    if let Some(status) = http_status {
        if let Some(kind) = match_status(status) {
            return ErrorClassification {
                kind,
                source: MatchSource::HttpStatus(status),
            };
        }
    }

    ErrorClassification {
        kind: ErrorKind::Unknown,
        source: MatchSource::Fallback,
    }
}

/// Classification strategy used by the retry orchestrator
pub trait ErrorClassifier: Send + Sync {
    fn classify_error(&self, error: &AdapterError) -> ErrorClassification;

    fn classifier_name(&self) -> &'static str;

    /// Whether this classifier produces something better than `Unknown`
    fn can_classify(&self, error: &AdapterError) -> bool {
        self.classify_error(error).kind != ErrorKind::Unknown
    }
}

/// Keyword and status-code classifier
#[derive(Debug, Clone)]
pub struct KeywordErrorClassifier {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordErrorClassifier {
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.to_vec(),
        }
    }

    /// Platform-specific rules checked before the defaults
    pub fn with_rules(extra: Vec<KeywordRule>) -> Self {
        let mut rules = extra;
        rules.extend(DEFAULT_RULES);
        Self { rules }
    }
}

impl ErrorClassifier for KeywordErrorClassifier {
    fn classify_error(&self, error: &AdapterError) -> ErrorClassification {
        match error {
            AdapterError::Declared { kind, .. } => ErrorClassification {
                kind: *kind,
                source: MatchSource::Declared,
            },
            AdapterError::Transport(_) => ErrorClassification {
                kind: ErrorKind::NetworkError,
                source: MatchSource::Transport,
            },
            AdapterError::Http { status, message } => {
                classify_with_rules(&self.rules, message, Some(*status))
            }
            AdapterError::Other(message) => classify_with_rules(&self.rules, message, None),
        }
    }

    fn classifier_name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keyword_groups() {
        assert_eq!(classify("Permission denied for resource", None), ErrorKind::PermissionDenied);
        assert_eq!(classify("请输入验证码", None), ErrorKind::CaptchaRequired);
        assert_eq!(classify("Please VERIFY you are human", None), ErrorKind::CaptchaRequired);
        assert_eq!(classify("rate limit exceeded", None), ErrorKind::RateLimited);
        assert_eq!(classify("user not logged in", None), ErrorKind::LoginRequired);
        assert_eq!(classify("当前未登录", None), ErrorKind::LoginRequired);
        assert_eq!(classify("account suspended", None), ErrorKind::AccountBlocked);
        assert_eq!(classify("read timeout", None), ErrorKind::NetworkError);
        assert_eq!(classify("something odd", None), ErrorKind::Unknown);
    }

    #[test]
    fn test_keyword_order_wins_over_later_groups() {
        // "forbidden" (permission) is checked before "blocked"
        assert_eq!(classify("forbidden: ip blocked", None), ErrorKind::PermissionDenied);
        // "captcha" is checked before "timeout"
        assert_eq!(classify("captcha timeout", None), ErrorKind::CaptchaRequired);
    }

    #[test]
    fn test_status_fallback_after_keywords() {
        assert_eq!(classify("", Some(403)), ErrorKind::PermissionDenied);
        assert_eq!(classify("", Some(429)), ErrorKind::RateLimited);
        assert_eq!(classify("", Some(471)), ErrorKind::CaptchaRequired);
        assert_eq!(classify("", Some(461)), ErrorKind::CaptchaRequired);
        assert_eq!(classify("", Some(502)), ErrorKind::NetworkError);
        assert_eq!(classify("", Some(404)), ErrorKind::Unknown);
        // Message keywords take precedence over the status code
        assert_eq!(classify("account banned", Some(429)), ErrorKind::AccountBlocked);
    }

    #[test]
    fn test_adapter_error_variants() {
        let classifier = KeywordErrorClassifier::new();

        let declared = AdapterError::declared(ErrorKind::LoginRequired, "cookie expired");
        let result = classifier.classify_error(&declared);
        assert_eq!(result.kind, ErrorKind::LoginRequired);
        assert_eq!(result.source, MatchSource::Declared);

        let transport = AdapterError::Transport("reset by peer".into());
        assert_eq!(classifier.classify_error(&transport).kind, ErrorKind::NetworkError);

        let http = AdapterError::http(429, "slow down");
        let result = classifier.classify_error(&http);
        assert_eq!(result.kind, ErrorKind::RateLimited);
        assert_eq!(result.source, MatchSource::HttpStatus(429));

        let other = AdapterError::other("parse failure");
        assert!(!classifier.can_classify(&other));
    }

    #[test]
    fn test_custom_rules_checked_first() {
        let classifier = KeywordErrorClassifier::with_rules(vec![KeywordRule {
            kind: ErrorKind::AccountBlocked,
            keywords: &["风控"],
        }]);
        let error = AdapterError::other("触发风控 connection closed");
        assert_eq!(classifier.classify_error(&error).kind, ErrorKind::AccountBlocked);
        assert_eq!(classifier.classifier_name(), "keyword");
    }

    proptest! {
        #[test]
        fn classify_is_total(message in ".*", status in proptest::option::of(0u16..1000)) {
            let kind = classify(&message, status);
            prop_assert!(ErrorKind::ALL.contains(&kind));
        }

        #[test]
        fn classify_is_case_insensitive(message in "[a-zA-Z ]{0,40}") {
            prop_assert_eq!(
                classify(&message.to_uppercase(), None),
                classify(&message.to_lowercase(), None)
            );
        }
    }
}
