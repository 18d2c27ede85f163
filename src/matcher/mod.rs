//! Header key patterns and header classification.
//!
//! A pattern body is one of:
//!
//! - `name` - exact key
//! - `prefix*` - keys starting with `prefix`
//! - `*suffix` - keys ending with `suffix`
//! - `*part*` - keys containing `part`
//! - `*` - every key
//!
//! Matching is case-sensitive. Negation (`!`) is a classification concept and
//! lives in [`HeaderClassifier`].

mod header;

pub use header::{Classification, ClassifiedHeaders, HeaderClassifier, PatternToken};

use std::fmt;

/// Wildcard character in pattern bodies.
pub const WILDCARD: char = '*';

/// Prefix marking a negated classification token.
pub const NEGATION_PREFIX: char = '!';

/// Compiled header key pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    /// Exact key match
    Exact(String),
    /// Key starts with the given prefix
    Prefix(String),
    /// Key ends with the given suffix
    Suffix(String),
    /// Key contains the given substring
    Contains(String),
    /// Any key
    Any,
}

impl KeyPattern {
    /// Compile a pattern body.
    pub fn compile(body: &str) -> Result<Self, MatcherError> {
        if body.is_empty() {
            return Err(MatcherError::invalid(body, "pattern is empty"));
        }
        if body == "*" {
            return Ok(Self::Any);
        }

        let leading = body.starts_with(WILDCARD);
        let trailing = body.ends_with(WILDCARD);
        let start = usize::from(leading);
        let end = body.len() - usize::from(trailing);
        let literal = body.get(start..end).unwrap_or_default();

        if literal.is_empty() {
            return Err(MatcherError::invalid(body, "pattern has no literal part"));
        }
        if literal.contains(WILDCARD) {
            return Err(MatcherError::invalid(
                body,
                "wildcard is only allowed at the start or end",
            ));
        }

        let literal = literal.to_string();
        Ok(match (leading, trailing) {
            (false, false) => Self::Exact(literal),
            (false, true) => Self::Prefix(literal),
            (true, false) => Self::Suffix(literal),
            (true, true) => Self::Contains(literal),
        })
    }

    /// Check if a header key matches this pattern.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Exact(literal) => key == literal,
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => key.ends_with(suffix.as_str()),
            Self::Contains(part) => key.contains(part.as_str()),
            Self::Any => true,
        }
    }

    /// Check if some key could match both patterns.
    pub fn overlaps(&self, other: &KeyPattern) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Exact(literal), pattern) | (pattern, Self::Exact(literal)) => {
                pattern.matches(literal)
            }
            (Self::Prefix(a), Self::Prefix(b)) => {
                a.starts_with(b.as_str()) || b.starts_with(a.as_str())
            }
            (Self::Suffix(a), Self::Suffix(b)) => a.ends_with(b.as_str()) || b.ends_with(a.as_str()),
            // prefix+suffix, prefix+part, part+suffix and part+part are all
            // satisfied by concatenating the two literals
            _ => true,
        }
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(literal) => f.write_str(literal),
            Self::Prefix(prefix) => write!(f, "{}*", prefix),
            Self::Suffix(suffix) => write!(f, "*{}", suffix),
            Self::Contains(part) => write!(f, "*{}*", part),
            Self::Any => f.write_str("*"),
        }
    }
}

/// Errors that can occur during pattern compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatcherError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },
}

impl MatcherError {
    fn invalid(pattern: &str, reason: &'static str) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(body: &str) -> KeyPattern {
        KeyPattern::compile(body).unwrap()
    }

    #[test]
    fn test_compile_forms() {
        assert_eq!(pattern("trace-id"), KeyPattern::Exact("trace-id".to_string()));
        assert_eq!(pattern("test_i*"), KeyPattern::Prefix("test_i".to_string()));
        assert_eq!(pattern("*-id"), KeyPattern::Suffix("-id".to_string()));
        assert_eq!(pattern("*span*"), KeyPattern::Contains("span".to_string()));
        assert_eq!(pattern("*"), KeyPattern::Any);
    }

    #[test]
    fn test_compile_rejects_invalid() {
        assert!(KeyPattern::compile("").is_err());
        assert!(KeyPattern::compile("**").is_err());
        assert!(KeyPattern::compile("a*b").is_err());
        assert!(KeyPattern::compile("*a*b*").is_err());

        let err = KeyPattern::compile("a*b").unwrap_err();
        assert!(err.to_string().contains("'a*b'"));
    }

    #[test]
    fn test_exact_match() {
        let p = pattern("custom-header");
        assert!(p.matches("custom-header"));
        assert!(!p.matches("custom-header-2"));
        assert!(!p.matches("Custom-Header"));
    }

    #[test]
    fn test_wildcard_matches() {
        assert!(pattern("test_i*").matches("test_id"));
        assert!(pattern("test_i*").matches("test_i"));
        assert!(!pattern("test_i*").matches("xtest_id"));

        assert!(pattern("*-id").matches("trace-id"));
        assert!(!pattern("*-id").matches("trace-idx"));

        assert!(pattern("*span*").matches("x-span-id"));
        assert!(pattern("*span*").matches("span"));
        assert!(!pattern("*span*").matches("spa"));

        assert!(pattern("*").matches(""));
        assert!(pattern("*").matches("anything"));
    }

    #[test]
    fn test_overlaps() {
        assert!(pattern("*").overlaps(&pattern("id")));
        assert!(pattern("id").overlaps(&pattern("i*")));
        assert!(!pattern("id").overlaps(&pattern("source")));
        assert!(pattern("test_*").overlaps(&pattern("test_i*")));
        assert!(!pattern("test_i*").overlaps(&pattern("custom*")));
        assert!(pattern("*-id").overlaps(&pattern("*id")));
        assert!(!pattern("*-id").overlaps(&pattern("*-key")));
        assert!(pattern("test_i*").overlaps(&pattern("*header")));
        assert!(pattern("*x*").overlaps(&pattern("*y*")));
    }

    #[test]
    fn test_display_round_trips_body() {
        for body in ["id", "test_i*", "*-id", "*span*", "*"] {
            assert_eq!(pattern(body).to_string(), body);
        }
    }
}
