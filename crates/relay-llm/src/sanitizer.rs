//! # Response Sanitizer
//!
//! Stateless post-processing of backend output: whitespace normalization and
//! an ordered risk-pattern scan that wraps flagged responses in a fixed
//! warning banner. The rule list ships empty, making the scan a passthrough
//! until an operator configures patterns.

use regex::{Regex, RegexBuilder};
use relay_settings::RiskRule;
use thiserror::Error;
use tracing::debug;

/// Banner prepended when any risk rule matches.
const WARNING_BANNER: &str =
    "⚠️ **Accuracy notice**: this answer may contain unverified information.\n\n";

/// Footer appended when any risk rule matches.
const RECOMMENDATION_FOOTER: &str =
    "\n\n💡 **Recommendation**: double-check important details against an official source.";

/// Errors building a sanitizer from configured rules.
#[derive(Debug, Error)]
pub enum SanitizerError {
    /// A configured risk pattern is not a valid regex.
    #[error("invalid risk pattern for '{label}': {source}")]
    InvalidPattern {
        /// The rule's label.
        label: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Result of one sanitizer pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sanitized {
    /// Normalized (and possibly banner-wrapped) text.
    pub text: String,
    /// Whether the warning banner was applied in this pass.
    pub warning_applied: bool,
}

#[derive(Debug)]
struct CompiledRule {
    regex: Regex,
    label: String,
}

/// Stateless response post-processor.
#[derive(Debug)]
pub struct ResponseSanitizer {
    rules: Vec<CompiledRule>,
    newline_run: Regex,
}

impl ResponseSanitizer {
    /// Compile the configured risk rules.
    ///
    /// Patterns are matched case-insensitively. An invalid pattern fails
    /// construction rather than being skipped at scan time.
    pub fn new(rules: &[RiskRule]) -> Result<Self, SanitizerError> {
        let compiled = rules
            .iter()
            .map(|rule| {
                RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| CompiledRule {
                        regex,
                        label: rule.label.clone(),
                    })
                    .map_err(|source| SanitizerError::InvalidPattern {
                        label: rule.label.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules: compiled,
            newline_run: Regex::new(r"\n{3,}").expect("static pattern"),
        })
    }

    /// A sanitizer with no risk rules (pure whitespace normalization).
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(&[]).expect("empty rule set always compiles")
    }

    /// Normalize whitespace and scan for risk patterns.
    ///
    /// Idempotent over its own output: text that already carries the banner
    /// is normalized but never wrapped a second time.
    #[must_use]
    pub fn sanitize(&self, text: &str) -> Sanitized {
        let collapsed = self.newline_run.replace_all(text, "\n\n");
        let trimmed = collapsed.trim();

        if trimmed.starts_with(WARNING_BANNER.trim_end()) {
            return Sanitized {
                text: trimmed.to_owned(),
                warning_applied: false,
            };
        }

        let matched: Vec<&str> = self
            .rules
            .iter()
            .filter(|rule| rule.regex.is_match(trimmed))
            .map(|rule| rule.label.as_str())
            .collect();

        if matched.is_empty() {
            return Sanitized {
                text: trimmed.to_owned(),
                warning_applied: false,
            };
        }

        debug!(labels = ?matched, "risk patterns matched, applying warning banner");
        Sanitized {
            text: format!("{WARNING_BANNER}{trimmed}{RECOMMENDATION_FOOTER}"),
            warning_applied: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, label: &str) -> RiskRule {
        RiskRule {
            pattern: pattern.into(),
            label: label.into(),
        }
    }

    #[test]
    fn passthrough_trims() {
        let s = ResponseSanitizer::passthrough();
        let out = s.sanitize("  hello world  \n");
        assert_eq!(out.text, "hello world");
        assert!(!out.warning_applied);
    }

    #[test]
    fn collapses_three_or_more_newlines_to_two() {
        let s = ResponseSanitizer::passthrough();
        let out = s.sanitize("a\n\n\nb\n\n\n\n\nc");
        assert_eq!(out.text, "a\n\nb\n\nc");
    }

    #[test]
    fn double_newlines_untouched() {
        let s = ResponseSanitizer::passthrough();
        let out = s.sanitize("a\n\nb");
        assert_eq!(out.text, "a\n\nb");
    }

    #[test]
    fn empty_input_stays_empty() {
        let s = ResponseSanitizer::passthrough();
        let out = s.sanitize("   \n\n  ");
        assert_eq!(out.text, "");
        assert!(!out.warning_applied);
    }

    #[test]
    fn matching_rule_applies_banner_and_footer() {
        let s = ResponseSanitizer::new(&[rule(r"recently (announced|released)", "recency")])
            .unwrap();
        let out = s.sanitize("This was recently announced by the vendor.");
        assert!(out.warning_applied);
        assert!(out.text.starts_with("⚠️ **Accuracy notice**"));
        assert!(out.text.ends_with("official source."));
        assert!(out.text.contains("This was recently announced by the vendor."));
    }

    #[test]
    fn match_is_case_insensitive() {
        let s = ResponseSanitizer::new(&[rule("officially confirmed", "confirmation")]).unwrap();
        let out = s.sanitize("It was OFFICIALLY CONFIRMED yesterday.");
        assert!(out.warning_applied);
    }

    #[test]
    fn non_matching_text_passes_through() {
        let s = ResponseSanitizer::new(&[rule("recently announced", "recency")]).unwrap();
        let out = s.sanitize("Plain factual answer.");
        assert!(!out.warning_applied);
        assert_eq!(out.text, "Plain factual answer.");
    }

    #[test]
    fn empty_rule_list_is_noop_scan() {
        let s = ResponseSanitizer::new(&[]).unwrap();
        let out = s.sanitize("anything at all");
        assert!(!out.warning_applied);
    }

    #[test]
    fn idempotent_over_own_output() {
        let s = ResponseSanitizer::new(&[rule("recently announced", "recency")]).unwrap();
        let once = s.sanitize("It was recently announced.");
        assert!(once.warning_applied);
        let twice = s.sanitize(&once.text);
        assert_eq!(twice.text, once.text);
        assert!(!twice.warning_applied);
        // Exactly one banner.
        assert_eq!(twice.text.matches("Accuracy notice").count(), 1);
    }

    #[test]
    fn idempotent_without_matches() {
        let s = ResponseSanitizer::passthrough();
        let once = s.sanitize("a\n\n\n\nb  ");
        let twice = s.sanitize(&once.text);
        assert_eq!(once.text, twice.text);
    }

    #[test]
    fn first_matching_rule_wins_ordering_stable() {
        let s = ResponseSanitizer::new(&[
            rule("alpha", "first"),
            rule("beta", "second"),
        ])
        .unwrap();
        let out = s.sanitize("alpha and beta both appear");
        assert!(out.warning_applied);
        assert_eq!(out.text.matches("Accuracy notice").count(), 1);
    }

    #[test]
    fn invalid_pattern_fails_construction() {
        let err = ResponseSanitizer::new(&[rule("([unclosed", "broken")]).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
