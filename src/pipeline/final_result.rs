// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Final-result stage.
//!
//! Runs after every mutation has been applied and rejects certificates
//! that would carry no subject identity at all.

use super::{EvaluationContext, EvaluationState, Validator};
use crate::verdict::{StatusCode, ValidationResult};

/// Stage 6: whole-certificate sanity.
pub struct FinalResultValidator;

impl Validator for FinalResultValidator {
    fn name(&self) -> &'static str {
        "final-result"
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

        let has_common_name = ctx
            .request
            .common_name()
            .map(|cn| !cn.is_empty())
            .unwrap_or(false)
            || verdict
                .property("Subject.CommonName")
                .map(|cn| !cn.is_empty())
                .unwrap_or(false);
        let has_san =
            !ctx.request.subject_alternative_names.is_empty() || !verdict.san_to_add.is_empty();

        if !has_common_name && !has_san {
            verdict.deny_with_code(
                StatusCode::InvalidName,
                "The certificate would carry neither a commonName nor any subject \
                 alternative name."
                    .to_string(),
            );
        }
    }
}
