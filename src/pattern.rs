// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Typed pattern matching for policy rules.
//!
//! A [`Pattern`] couples one expression with a match kind (regular
//! expression, CIDR range, or literal comparison) and an allow/deny action.
//! The match kinds form a closed enumeration, so an unrecognized kind cannot
//! reach evaluation; it is rejected when the policy document is parsed.
//!
//! # Fail-safe bias
//!
//! Deny patterns are evaluated with `match_on_error = true`: a malformed deny
//! expression is treated as matching, which denies the request. Allow
//! patterns use `match_on_error = false`, so a malformed allow expression
//! never grants a pass on its own. CIDR expressions are the exception -- any
//! parse failure (bad address, missing slash, out-of-range prefix, address
//! family mismatch) is defined as a non-match, not an error.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// How a pattern expression is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    /// Case-sensitive regular expression search (the default).
    #[default]
    Regex,
    /// Case-insensitive regular expression search.
    RegexIgnoreCase,
    /// IP network containment, expression in `address/prefix-length` form.
    Cidr,
    /// Literal string equality.
    ExactMatch,
    /// Literal string equality, locale-independent case folding.
    ExactMatchIgnoreCase,
}

/// What a matching pattern means for the evaluated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternAction {
    /// A match permits the value (the default).
    #[default]
    Allow,
    /// A match forbids the value.
    Deny,
}

/// One matching rule inside a [`SubjectRule`](crate::rules::SubjectRule).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pattern {
    /// The expression to evaluate, interpreted per [`MatchKind`].
    pub expression: String,

    /// How the expression is interpreted.
    #[serde(default)]
    pub kind: MatchKind,

    /// Whether a match allows or denies the value.
    #[serde(default)]
    pub action: PatternAction,
}

impl Pattern {
    /// Create an allow pattern with the default (regex) match kind.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            kind: MatchKind::default(),
            action: PatternAction::default(),
        }
    }

    /// Set the match kind.
    pub fn with_kind(mut self, kind: MatchKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the action.
    pub fn with_action(mut self, action: PatternAction) -> Self {
        self.action = action;
        self
    }

    /// The `match_on_error` value appropriate for this pattern's action.
    ///
    /// Deny patterns fail safe by matching on error; allow patterns fail
    /// safe by not matching.
    pub fn match_on_error(&self) -> bool {
        self.action == PatternAction::Deny
    }

    /// Evaluate the pattern against `term`.
    ///
    /// `match_on_error` is returned when the expression is malformed, except
    /// for [`MatchKind::Cidr`], where any parse failure is a non-match.
    pub fn matches(&self, term: &str, match_on_error: bool) -> bool {
        match self.kind {
            MatchKind::Regex => self.matches_regex(term, false, match_on_error),
            MatchKind::RegexIgnoreCase => self.matches_regex(term, true, match_on_error),
            MatchKind::Cidr => cidr_contains(&self.expression, term),
            MatchKind::ExactMatch => self.expression == term,
            MatchKind::ExactMatchIgnoreCase => unicode_eq_ignore_case(&self.expression, term),
        }
    }

    fn matches_regex(&self, term: &str, case_insensitive: bool, match_on_error: bool) -> bool {
        match RegexBuilder::new(&self.expression)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(re) => re.is_match(term),
            Err(_) => match_on_error,
        }
    }
}

/// Locale-independent case-insensitive equality.
///
/// Uses Unicode simple case folding via lowercase mapping; no locale tables
/// are consulted.
fn unicode_eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars().flat_map(char::to_lowercase).eq(b.chars().flat_map(char::to_lowercase))
}

/// Check whether `term` (an IP address) falls inside the CIDR range given by
/// `expression` (`address/prefix-length`).
///
/// Prefix length 0 matches every address of the same family. Any parse
/// failure returns `false`.
fn cidr_contains(expression: &str, term: &str) -> bool {
    let addr: IpAddr = match term.trim().parse() {
        Ok(a) => a,
        Err(_) => return false,
    };

    let (network, prefix) = match expression.trim().split_once('/') {
        Some(parts) => parts,
        None => return false,
    };

    let network: IpAddr = match network.parse() {
        Ok(a) => a,
        Err(_) => return false,
    };

    let prefix: u32 = match prefix.parse() {
        Ok(p) => p,
        Err(_) => return false,
    };

    match (addr, network) {
        (IpAddr::V4(a), IpAddr::V4(n)) => {
            if prefix > 32 {
                return false;
            }
            masked_eq_u32(u32::from(a), u32::from(n), prefix)
        }
        (IpAddr::V6(a), IpAddr::V6(n)) => {
            if prefix > 128 {
                return false;
            }
            masked_eq_u128(u128::from(a), u128::from(n), prefix)
        }
        // Address family mismatch is always a non-match.
        _ => false,
    }
}

fn masked_eq_u32(a: u32, n: u32, prefix: u32) -> bool {
    if prefix == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - prefix);
    a & mask == n & mask
}

fn masked_eq_u128(a: u128, n: u128, prefix: u32) -> bool {
    if prefix == 0 {
        return true;
    }
    let mask = u128::MAX << (128 - prefix);
    a & mask == n & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(expression: &str, kind: MatchKind) -> Pattern {
        Pattern::new(expression).with_kind(kind)
    }

    #[test]
    fn test_regex_match() {
        let p = pattern("^[-_a-zA-Z0-9]*\\.example\\.com$", MatchKind::Regex);
        assert!(p.matches("host.example.com", false));
        assert!(!p.matches("host.example.org", false));
        assert!(!p.matches("HOST.EXAMPLE.COM", false));
    }

    #[test]
    fn test_regex_ignore_case() {
        let p = pattern("^host\\.example\\.com$", MatchKind::RegexIgnoreCase);
        assert!(p.matches("HOST.EXAMPLE.COM", false));
    }

    #[test]
    fn test_malformed_regex_returns_match_on_error() {
        let p = pattern("[unclosed", MatchKind::Regex);
        assert!(!p.matches("anything", false));
        assert!(p.matches("anything", true));
    }

    #[test]
    fn test_deny_pattern_fails_safe() {
        let p = Pattern::new("[unclosed").with_action(PatternAction::Deny);
        assert!(p.match_on_error());
        assert!(p.matches("anything", p.match_on_error()));
    }

    #[test]
    fn test_exact_match() {
        let p = pattern("host.example.com", MatchKind::ExactMatch);
        assert!(p.matches("host.example.com", false));
        assert!(!p.matches("HOST.example.com", false));

        let p = pattern("host.example.com", MatchKind::ExactMatchIgnoreCase);
        assert!(p.matches("HOST.EXAMPLE.COM", false));
        assert!(!p.matches("other.example.com", false));
    }

    #[test]
    fn test_cidr_v4() {
        let p = pattern("192.168.0.0/16", MatchKind::Cidr);
        assert!(p.matches("192.168.42.7", false));
        assert!(!p.matches("192.169.0.1", false));
        assert!(!p.matches("10.0.0.1", false));
    }

    #[test]
    fn test_cidr_v4_host_route() {
        let p = pattern("10.0.0.1/32", MatchKind::Cidr);
        assert!(p.matches("10.0.0.1", false));
        assert!(!p.matches("10.0.0.2", false));
    }

    #[test]
    fn test_cidr_prefix_zero_matches_everything() {
        let p = pattern("0.0.0.0/0", MatchKind::Cidr);
        assert!(p.matches("255.255.255.255", false));
        assert!(p.matches("1.2.3.4", false));

        let p = pattern("::/0", MatchKind::Cidr);
        assert!(p.matches("2001:db8::1", false));
    }

    #[test]
    fn test_cidr_v6() {
        let p = pattern("2001:db8::/32", MatchKind::Cidr);
        assert!(p.matches("2001:db8:1234::1", false));
        assert!(!p.matches("2001:db9::1", false));
    }

    #[test]
    fn test_cidr_family_mismatch_is_non_match() {
        let p = pattern("192.168.0.0/16", MatchKind::Cidr);
        assert!(!p.matches("::ffff:192.168.0.1", false));

        let p = pattern("2001:db8::/32", MatchKind::Cidr);
        assert!(!p.matches("192.168.0.1", false));
    }

    #[test]
    fn test_cidr_parse_failures_never_use_match_on_error() {
        // Malformed mask or term: always false, even with match_on_error.
        for expr in ["192.168.0.0", "192.168.0.0/33", "not-an-ip/8", "10.0.0.0/x"] {
            let p = pattern(expr, MatchKind::Cidr);
            assert!(!p.matches("10.0.0.1", true), "expr {expr}");
        }
        let p = pattern("10.0.0.0/8", MatchKind::Cidr);
        assert!(!p.matches("not-an-ip", true));
    }

    #[test]
    fn test_serde_kind_names() {
        let toml = r#"
            expression = "^.*$"
            kind = "exact-match-ignore-case"
            action = "deny"
        "#;
        let p: Pattern = toml::from_str(toml).unwrap();
        assert_eq!(p.kind, MatchKind::ExactMatchIgnoreCase);
        assert_eq!(p.action, PatternAction::Deny);

        // Defaults: regex / allow.
        let p: Pattern = toml::from_str(r#"expression = "abc""#).unwrap();
        assert_eq!(p.kind, MatchKind::Regex);
        assert_eq!(p.action, PatternAction::Allow);
    }
}
