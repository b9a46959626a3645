// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Request/key stage.
//!
//! Enforces provenance (crypto provider and process allow/deny lists), key
//! algorithm family and length bounds, and -- for templates where the
//! enrollee supplies the subject -- the subject/SAN content rules, the
//! security-identifier extension mode, DNS SAN supplementation from the
//! commonName, and the policy validity override.

use super::{EvaluationContext, EvaluationState, Validator};
use crate::dn::NameField;
use crate::oids;
use crate::policy::SidExtensionMode;
use crate::request::{attributes, san};
use crate::rules;
use crate::verdict::{StatusCode, ValidationResult};
use chrono::Duration;
use std::net::IpAddr;
use tracing::debug;

/// Stage 2: request and key constraints.
pub struct RequestKeyValidator;

impl Validator for RequestKeyValidator {
    fn name(&self) -> &'static str {
        "request-key"
    }

    fn validate(
        &self,
        ctx: &EvaluationContext<'_>,
        _state: &mut EvaluationState,
        verdict: &mut ValidationResult,
    ) {
        if verdict.is_denied() {
            return;
        }

        self.check_provenance(ctx, verdict);
        self.check_key(ctx, verdict);

        if ctx.request.enrollee_supplies_subject {
            self.check_subject_content(ctx, verdict);
            self.check_sid_extension(ctx, verdict);
            self.supplement_dns_names(ctx, verdict);
        }

        self.apply_validity_override(ctx, verdict);
    }
}

impl RequestKeyValidator {
    fn check_provenance(&self, ctx: &EvaluationContext<'_>, verdict: &mut ValidationResult) {
        let policy = ctx.policy;

        check_provenance_lists(
            verdict,
            "crypto provider",
            ctx.request.attribute(attributes::CSP_PROVIDER),
            &policy.allowed_crypto_providers,
            &policy.disallowed_crypto_providers,
        );

        check_provenance_lists(
            verdict,
            "process",
            ctx.request.attribute(attributes::PROCESS_NAME),
            &policy.allowed_processes,
            &policy.disallowed_processes,
        );
    }

    fn check_key(&self, ctx: &EvaluationContext<'_>, verdict: &mut ValidationResult) {
        let policy = ctx.policy;
        let request = ctx.request;

        if request.key_algorithm != policy.key_algorithm {
            verdict.deny(format!(
                "The request uses a {} key; policy requires {}.",
                request.key_algorithm.as_str(),
                policy.key_algorithm.as_str()
            ));
        }

        if policy.minimum_key_length != 0 && request.key_length < policy.minimum_key_length {
            verdict.deny_with_code(
                StatusCode::KeyLength,
                format!(
                    "The key length of {} bits is below the required minimum of {} bits.",
                    request.key_length, policy.minimum_key_length
                ),
            );
        }

        if policy.maximum_key_length != 0 && request.key_length > policy.maximum_key_length {
            verdict.deny_with_code(
                StatusCode::KeyLength,
                format!(
                    "The key length of {} bits is above the permitted maximum of {} bits.",
                    request.key_length, policy.maximum_key_length
                ),
            );
        }
    }

    fn check_subject_content(&self, ctx: &EvaluationContext<'_>, verdict: &mut ValidationResult) {
        for reason in rules::verify(&ctx.request.subject, &ctx.policy.subject_rules) {
            verdict.deny_with_code(StatusCode::InvalidName, reason);
        }
        for reason in rules::verify(
            &ctx.request.subject_alternative_names,
            &ctx.policy.san_rules,
        ) {
            verdict.deny_with_code(StatusCode::InvalidName, reason);
        }
    }

    fn check_sid_extension(&self, ctx: &EvaluationContext<'_>, verdict: &mut ValidationResult) {
        if !ctx
            .request
            .extensions
            .contains_key(&oids::SECURITY_IDENTIFIER)
        {
            return;
        }

        match ctx.policy.security_identifier_extension {
            SidExtensionMode::Deny => {
                verdict.deny(
                    "The request carries the security identifier extension, which this \
                     policy does not permit enrollees to supply."
                        .to_string(),
                );
            }
            SidExtensionMode::Add => {
                // The directory stage supplies the authoritative value.
                verdict.disable_extension(oids::SECURITY_IDENTIFIER);
            }
            SidExtensionMode::Allow => {}
        }
    }

    fn supplement_dns_names(&self, ctx: &EvaluationContext<'_>, verdict: &mut ValidationResult) {
        if !ctx.policy.supplement_dns_names {
            return;
        }

        for value in ctx.request.subject_values("commonName") {
            if let Ok(addr) = value.parse::<IpAddr>() {
                if !ctx.request.has_san(san::IP_ADDRESS, value) {
                    debug!(address = %addr, "supplementing SAN with IP address from commonName");
                    verdict.add_san(NameField::new(san::IP_ADDRESS, value));
                }
            } else if is_dns_name(value, ctx.policy.allow_unqualified_names)
                && !ctx.request.has_san(san::DNS_NAME, value)
            {
                debug!(name = value, "supplementing SAN with DNS name from commonName");
                verdict.add_san(NameField::new(san::DNS_NAME, value));
            }
        }
    }

    fn apply_validity_override(&self, ctx: &EvaluationContext<'_>, verdict: &mut ValidationResult) {
        if let Some(days) = ctx.policy.validity_period_days {
            let cap = ctx.now + Duration::days(i64::from(days));
            if cap < verdict.not_after {
                debug!(not_after = %cap, "shortening certificate validity per policy");
                verdict.not_after = cap;
            }
        }
    }
}

fn check_provenance_lists(
    verdict: &mut ValidationResult,
    what: &str,
    value: Option<&str>,
    allowed: &[String],
    disallowed: &[String],
) {
    if !allowed.is_empty() {
        match value {
            None => {
                // An unknown value when a list is configured is a denial,
                // distinct from "not allowed".
                verdict.deny(format!(
                    "The {what} of the request is unknown, but policy restricts the \
                     permitted {what}s."
                ));
            }
            Some(v) if !contains_ignore_case(allowed, v) => {
                verdict.deny(format!("The {what} '{v}' is not allowed by policy."));
            }
            Some(_) => {}
        }
    }

    if !disallowed.is_empty() {
        match value {
            None => {
                verdict.deny(format!(
                    "The {what} of the request is unknown, but policy disallows \
                     certain {what}s."
                ));
            }
            Some(v) if contains_ignore_case(disallowed, v) => {
                verdict.deny(format!("The {what} '{v}' is explicitly disallowed by policy."));
            }
            Some(_) => {}
        }
    }
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(value))
}

/// Whether `value` is shaped like a DNS name.
///
/// Labels are alphanumeric-plus-hyphen, at most 63 octets, with no leading
/// or trailing hyphen. Single-label names pass only when
/// `allow_unqualified` is set.
pub(super) fn is_dns_name(value: &str, allow_unqualified: bool) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = value.split('.').collect();
    if !allow_unqualified && labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
