//! Ordered header classification with negation.

use super::{KeyPattern, MatcherError, NEGATION_PREFIX};
use crate::message::{Headers, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Outcome of classifying one header key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Promoted into the event's extensions
    Extension,
    /// Dropped from both the event and the output message
    Excluded,
    /// Passed through to the output message unchanged
    Unclassified,
}

/// A classification token: a key pattern, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternToken {
    /// Whether the token was `!`-prefixed
    negated: bool,
    /// Compiled pattern body
    pattern: KeyPattern,
}

impl PatternToken {
    /// Parse a token such as `trace-id`, `x-*` or `!secret-*`.
    pub fn parse(token: &str) -> Result<Self, MatcherError> {
        let (negated, body) = match token.strip_prefix(NEGATION_PREFIX) {
            Some(body) => (true, body),
            None => (false, token),
        };

        Ok(Self {
            negated,
            pattern: KeyPattern::compile(body)?,
        })
    }

    /// Whether the token is negated.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The token's pattern body.
    pub fn pattern(&self) -> &KeyPattern {
        &self.pattern
    }

    /// Classification decided by this token when it matches.
    fn outcome(&self) -> Classification {
        if self.negated {
            Classification::Excluded
        } else {
            Classification::Extension
        }
    }
}

impl std::fmt::Display for PatternToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "{}{}", NEGATION_PREFIX, self.pattern)
        } else {
            write!(f, "{}", self.pattern)
        }
    }
}

/// Reduction state while walking the token list for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassifierState {
    /// No token has matched yet
    Undecided,
    /// The first matching token fixed the outcome
    Decided(Classification),
}

impl ClassifierState {
    /// Feed one token. Once decided, later tokens are ignored.
    fn step(self, token: &PatternToken, key: &str) -> Self {
        match self {
            Self::Decided(_) => self,
            Self::Undecided if token.pattern.matches(key) => Self::Decided(token.outcome()),
            Self::Undecided => Self::Undecided,
        }
    }

    fn is_decided(self) -> bool {
        matches!(self, Self::Decided(_))
    }

    fn finish(self) -> Classification {
        match self {
            Self::Decided(classification) => classification,
            Self::Undecided => Classification::Unclassified,
        }
    }
}

/// Classifies header keys against an ordered token list.
///
/// The first token whose body matches a key decides: a negated token excludes
/// the header, any other token promotes it to an extension. Keys no token
/// matches are left unclassified. An empty token list disables extension
/// mapping entirely.
#[derive(Debug, Clone, Default)]
pub struct HeaderClassifier {
    tokens: Vec<PatternToken>,
}

/// Result of classifying a full header set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedHeaders {
    /// Extension headers with their original values
    pub extensions: BTreeMap<String, Value>,
    /// Keys of excluded headers
    pub excluded: BTreeSet<String>,
}

impl HeaderClassifier {
    /// Compile a classifier from its tokens, preserving their order.
    pub fn compile<S: AsRef<str>>(tokens: &[S]) -> Result<Self, MatcherError> {
        let tokens = tokens
            .iter()
            .map(|t| PatternToken::parse(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { tokens })
    }

    /// A classifier that leaves every header unclassified.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether any token is configured.
    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// The configured tokens in evaluation order.
    pub fn tokens(&self) -> &[PatternToken] {
        &self.tokens
    }

    /// Classify a single header key.
    pub fn classify(&self, key: &str) -> Classification {
        let mut state = ClassifierState::Undecided;

        for token in &self.tokens {
            state = state.step(token, key);
            if state.is_decided() {
                break;
            }
        }

        state.finish()
    }

    /// Classify every header in a set.
    pub fn classify_headers(&self, headers: &Headers) -> ClassifiedHeaders {
        let mut classified = ClassifiedHeaders::default();

        if !self.is_enabled() {
            return classified;
        }

        for (key, value) in headers {
            let classification = self.classify(key);
            trace!(header = %key, ?classification, "Classified header");

            match classification {
                Classification::Extension => {
                    classified.extensions.insert(key.clone(), value.clone());
                }
                Classification::Excluded => {
                    classified.excluded.insert(key.clone());
                }
                Classification::Unclassified => {}
            }
        }

        classified
    }
}

impl ClassifiedHeaders {
    /// Whether the key leaves the output message.
    pub fn is_removed(&self, key: &str) -> bool {
        self.extensions.contains_key(key) || self.excluded.contains(key)
    }

    /// Copy the headers that pass through to the output message.
    pub fn filter(&self, headers: &Headers) -> Headers {
        headers
            .iter()
            .filter(|(key, _)| !self.is_removed(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
