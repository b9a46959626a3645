// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Subject and subject-alternative-name rule evaluation.
//!
//! A [`SubjectRule`] constrains one identity field: mandatory presence,
//! maximum occurrences, length bounds, and an ordered list of allow/deny
//! [`Pattern`]s. [`verify`] enforces a deny-by-default posture: a field
//! present in the request but not enumerated in policy is rejected, and a
//! rule with zero patterns permits nothing.
//!
//! All applicable violations are reported together; evaluation never
//! short-circuits on the first reason.

use crate::dn::NameField;
use crate::pattern::{Pattern, PatternAction};
use serde::{Deserialize, Serialize};

/// Constraints for one subject or SAN field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectRule {
    /// The field name this rule applies to (e.g. `commonName`, `dNSName`).
    /// Compared case-insensitively.
    pub field: String,

    /// Whether the field must appear in the request.
    #[serde(default)]
    pub mandatory: bool,

    /// Maximum number of times the field may occur.
    #[serde(default = "default_max_occurrences")]
    pub max_occurrences: u32,

    /// Minimum value length in characters.
    #[serde(default)]
    pub min_length: usize,

    /// Maximum value length in characters.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Ordered allow/deny patterns. A rule with no patterns permits nothing.
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

fn default_max_occurrences() -> u32 {
    1
}

fn default_max_length() -> usize {
    128
}

impl SubjectRule {
    /// Create a rule for `field` with defaults and the given patterns.
    pub fn new(field: impl Into<String>, patterns: Vec<Pattern>) -> Self {
        Self {
            field: field.into(),
            mandatory: false,
            max_occurrences: default_max_occurrences(),
            min_length: 0,
            max_length: default_max_length(),
            patterns,
        }
    }

    /// Mark the field as mandatory.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Set the maximum occurrence count.
    pub fn with_max_occurrences(mut self, max: u32) -> Self {
        self.max_occurrences = max;
        self
    }
}

/// Evaluate `fields` against `rules`, returning one human-readable reason
/// per violation. An empty list means the fields are acceptable.
///
/// Two passes run to completion: the first checks presence and occurrence
/// counts per rule, the second checks every present value against its rule
/// (deny-by-default when no rule names the field, length bounds, at least
/// one matching allow pattern, and one reason per matching deny pattern).
pub fn verify(fields: &[NameField], rules: &[SubjectRule]) -> Vec<String> {
    let mut reasons = Vec::new();

    // Pass 1: presence and occurrence counts.
    for rule in rules {
        let count = fields.iter().filter(|f| f.is_named(&rule.field)).count() as u32;
        if count == 0 && rule.mandatory {
            reasons.push(format!(
                "The mandatory field {} is missing from the request.",
                rule.field
            ));
        }
        if count > rule.max_occurrences {
            reasons.push(format!(
                "The field {} occurs {} times; policy permits at most {}.",
                rule.field, count, rule.max_occurrences
            ));
        }
    }

    // Pass 2: per-value policy.
    for field in fields {
        let rule = rules.iter().find(|r| field.is_named(&r.field));
        let rule = match rule {
            Some(rule) => rule,
            None => {
                reasons.push(format!("The field {} is not allowed.", field.name));
                continue;
            }
        };

        if rule.patterns.is_empty() {
            reasons.push(format!(
                "The field {} is not defined: no permitted values are configured.",
                field.name
            ));
            continue;
        }

        let value = field.value.as_str();
        if value.chars().count() < rule.min_length {
            reasons.push(format!(
                "The value \"{}\" for field {} is shorter than the minimum length of {}.",
                value, field.name, rule.min_length
            ));
        }
        if value.chars().count() > rule.max_length {
            reasons.push(format!(
                "The value \"{}\" for field {} exceeds the maximum length of {}.",
                value, field.name, rule.max_length
            ));
        }

        let allowed = rule
            .patterns
            .iter()
            .filter(|p| p.action == PatternAction::Allow)
            .any(|p| p.matches(value, p.match_on_error()));
        if !allowed {
            reasons.push(format!(
                "The value \"{}\" for field {} is not allowed by policy.",
                value, field.name
            ));
        }

        for pattern in rule
            .patterns
            .iter()
            .filter(|p| p.action == PatternAction::Deny)
        {
            if pattern.matches(value, pattern.match_on_error()) {
                reasons.push(format!(
                    "The value \"{}\" for field {} is explicitly disallowed by the pattern \"{}\".",
                    value, field.name, pattern.expression
                ));
            }
        }
    }

    reasons
}
