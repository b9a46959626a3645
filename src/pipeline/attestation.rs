// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Hardware-attestation stage.
//!
//! Decodes the attestation statement through the host-provided
//! [`AttestationDecoder`](crate::attestation::AttestationDecoder) and
//! matches the resulting device profile against the policy's rule list.

use super::{EvaluationContext, EvaluationState, Validator};
use crate::attestation::{self, AttestationOutcome};
use crate::verdict::ValidationResult;
use tracing::debug;

/// Stage 4: hardware attestation.
pub struct AttestationValidator;

impl Validator for AttestationValidator {
    fn name(&self) -> &'static str {
        "attestation"
    }

    fn validate(
        &self,
        ctx: &EvaluationContext<'_>,
        state: &mut EvaluationState,
        verdict: &mut ValidationResult,
    ) {
        let attestation_policy = match &ctx.policy.attestation {
            Some(policy) => policy,
            None => return,
        };
        if verdict.is_denied() {
            return;
        }

        let decoder = match ctx.attestation_decoder {
            Some(decoder) => decoder,
            None => {
                if attestation_policy.required {
                    verdict.deny(
                        "Policy requires hardware attestation but no attestation decoder \
                         is available."
                            .to_string(),
                    );
                } else {
                    verdict.warn(
                        "An attestation policy is configured but no attestation decoder \
                         is available; attestation rules were not evaluated."
                            .to_string(),
                    );
                }
                return;
            }
        };

        let profile = match decoder.decode(&ctx.request.extensions) {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                if attestation_policy.required {
                    verdict.deny(
                        "Policy requires hardware attestation but the request carries \
                         no attestation statement."
                            .to_string(),
                    );
                }
                return;
            }
            Err(e) => {
                verdict.deny(format!("The attestation statement could not be decoded: {e}"));
                return;
            }
        };

        debug!(
            firmware = %profile.firmware,
            serial = ?profile.serial_number,
            "decoded attestation statement"
        );

        if let AttestationOutcome::Deny(reason) =
            attestation::evaluate(&profile, &attestation_policy.rules)
        {
            verdict.deny(reason);
        }

        state.device_profile = Some(profile);
    }
}
