// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Request-attribute stage.
//!
//! Flags the insecure combination of an inline `san` request attribute with
//! a CA that honors such attributes, and validates an enrollee-requested
//! `StartDate` attribute when the CA permits one.

use super::{EvaluationContext, EvaluationState, Validator};
use crate::error::{PolicyError, Result};
use crate::request::attributes;
use crate::verdict::{StatusCode, ValidationResult};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Stage 1: request attributes.
pub struct RequestAttributeValidator;

impl Validator for RequestAttributeValidator {
    fn name(&self) -> &'static str {
        "request-attributes"
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

        if ctx.options.honors_san_attribute && ctx.request.attribute(attributes::SAN).is_some() {
            verdict.deny(format!(
                "The request carries a '{}' attribute while the certification authority is \
                 configured to honor inline subject alternative names; this combination allows \
                 identity spoofing and is denied.",
                attributes::SAN
            ));
        }

        if ctx.options.allows_requested_start_date {
            if let Some(raw) = ctx.request.attribute(attributes::START_DATE) {
                self.apply_start_date(ctx, verdict, raw);
            }
        }
    }
}

impl RequestAttributeValidator {
    fn apply_start_date(
        &self,
        ctx: &EvaluationContext<'_>,
        verdict: &mut ValidationResult,
        raw: &str,
    ) {
        let requested = match parse_start_date(raw) {
            Ok(dt) => dt,
            Err(e) => {
                verdict.deny_with_code(StatusCode::InvalidTime, e.to_string());
                return;
            }
        };

        if requested < ctx.now || requested > verdict.not_after {
            verdict.deny_with_code(
                StatusCode::InvalidTime,
                format!(
                    "The requested start date '{raw}' is outside the permitted window \
                     between now and the certificate expiration."
                ),
            );
            return;
        }

        debug!(start_date = %requested, "applying requested start date");
        verdict.not_before = requested;
    }
}

fn parse_start_date(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            PolicyError::invalid_time(format!(
                "the requested start date '{raw}' is not a valid RFC 2822 date"
            ))
        })
}
