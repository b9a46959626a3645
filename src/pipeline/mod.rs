// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! The validator pipeline and engine facade.
//!
//! Evaluation is a strictly sequential chain of independent validators, each
//! consuming and returning the shared [`ValidationResult`]. A validator that
//! finds the verdict already denied passes through unchanged, so expensive
//! directory and attestation lookups are skipped once the outcome is
//! settled, while every scheduled stage still runs exactly once per request.
//!
//! Stage ordering is a correctness requirement: key checks precede subject
//! checks, the directory stage precedes content synthesis (which may
//! reference directory attributes), and the final-result stage sees all
//! mutations. Do not reorder.

mod attestation;
mod content;
mod directory;
mod final_result;
mod request_attributes;
mod request_key;

pub use attestation::AttestationValidator;
pub use content::{ContentValidator, ExtensionEncoder};
pub use directory::DirectoryValidator;
pub use final_result::FinalResultValidator;
pub use request_attributes::RequestAttributeValidator;
pub use request_key::RequestKeyValidator;

use crate::attestation::{AttestationDecoder, DeviceProfile};
use crate::directory::{DirectoryObject, DirectoryService};
use crate::policy::PolicyDocument;
use crate::request::{CertificateRequest, Disposition};
use crate::store::PolicyStore;
use crate::verdict::{StatusCode, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do when no policy document exists for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoPolicyAction {
    /// Deny the request (the fail-safe default).
    #[default]
    Deny,
    /// Let issuance proceed, recording a warning.
    Issue,
}

/// Host/CA-level configuration that is not part of any policy document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineOptions {
    /// The CA is configured to honor inline `san` request attributes
    /// (an insecure CA flag the engine compensates for).
    #[serde(default)]
    pub honors_san_attribute: bool,

    /// The CA permits enrollee-requested certificate start dates.
    #[serde(default)]
    pub allows_requested_start_date: bool,

    /// Behavior when a template has no policy document.
    #[serde(default)]
    pub no_policy_action: NoPolicyAction,
}

/// Read-only inputs shared by every stage of one evaluation.
pub struct EvaluationContext<'a> {
    /// The decoded certificate request.
    pub request: &'a CertificateRequest,
    /// The immutable policy snapshot for the template.
    pub policy: &'a PolicyDocument,
    /// The certificate template name.
    pub template: &'a str,
    /// Host/CA-level options.
    pub options: &'a EngineOptions,
    /// Evaluation timestamp; every stage uses the same instant.
    pub now: DateTime<Utc>,
    /// Directory service collaborator, when the host provides one.
    pub directory: Option<&'a dyn DirectoryService>,
    /// Attestation decoder collaborator, when the host provides one.
    pub attestation_decoder: Option<&'a dyn AttestationDecoder>,
    /// Extension encoder collaborator, when the host provides one.
    pub extension_encoder: Option<&'a dyn ExtensionEncoder>,
}

/// Data discovered by earlier stages and consumed by later ones.
///
/// Kept separate from the verdict so the output contract stays clean:
/// stage-to-stage plumbing is not part of what the host consumes.
#[derive(Debug, Default)]
pub struct EvaluationState {
    /// The resolved directory object, when the directory stage ran.
    pub directory_object: Option<DirectoryObject>,
    /// The decoded device profile, when the attestation stage ran.
    pub device_profile: Option<DeviceProfile>,
}

/// One stage of the pipeline.
pub trait Validator: Send + Sync {
    /// Stage name for logging.
    fn name(&self) -> &'static str;

    /// Run the stage, mutating the verdict in place.
    fn validate(
        &self,
        ctx: &EvaluationContext<'_>,
        state: &mut EvaluationState,
        verdict: &mut ValidationResult,
    );
}

/// The policy decision engine.
///
/// Safe to call concurrently from independent request evaluations; the only
/// shared state is the read-mostly policy cache inside [`PolicyStore`].
pub struct PolicyEngine {
    store: PolicyStore,
    options: EngineOptions,
    directory: Option<Arc<dyn DirectoryService>>,
    attestation_decoder: Option<Arc<dyn AttestationDecoder>>,
    extension_encoder: Option<Arc<dyn ExtensionEncoder>>,
    validators: Vec<Box<dyn Validator>>,
}

impl PolicyEngine {
    /// Create an engine over a policy store.
    pub fn new(store: PolicyStore, options: EngineOptions) -> Self {
        Self {
            store,
            options,
            directory: None,
            attestation_decoder: None,
            extension_encoder: None,
            validators: vec![
                Box::new(RequestAttributeValidator),
                Box::new(RequestKeyValidator),
                Box::new(DirectoryValidator),
                Box::new(AttestationValidator),
                Box::new(ContentValidator),
                Box::new(FinalResultValidator),
            ],
        }
    }

    /// Attach a directory service collaborator.
    pub fn with_directory(mut self, directory: Arc<dyn DirectoryService>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Attach an attestation decoder collaborator.
    pub fn with_attestation_decoder(mut self, decoder: Arc<dyn AttestationDecoder>) -> Self {
        self.attestation_decoder = Some(decoder);
        self
    }

    /// Attach an extension encoder collaborator.
    pub fn with_extension_encoder(mut self, encoder: Arc<dyn ExtensionEncoder>) -> Self {
        self.extension_encoder = Some(encoder);
        self
    }

    /// Evaluate one certificate request against the template's policy.
    ///
    /// `not_before` and `not_after` are the host-computed certificate
    /// validity bounds; policy may shorten them but never extend them.
    ///
    /// Policy only runs when the CA itself would issue: a request the CA
    /// already denied or parked as pending passes through untouched, so
    /// the upstream disposition is never overridden.
    pub fn evaluate(
        &self,
        template: &str,
        request: &CertificateRequest,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> ValidationResult {
        if request.disposition != Disposition::Issue {
            debug!(
                template,
                request_id = request.request_id,
                disposition = ?request.disposition,
                "upstream disposition is already settled; passing through"
            );
            return ValidationResult::new(false, not_before, not_after);
        }

        let policy = match self.store.policy_for(template) {
            Some(policy) => policy,
            None => {
                return self.no_policy_verdict(template, not_before, not_after);
            }
        };

        let mut verdict = ValidationResult::new(policy.audit_only, not_before, not_after);
        let mut state = EvaluationState::default();
        let ctx = EvaluationContext {
            request,
            policy: policy.as_ref(),
            template,
            options: &self.options,
            now: Utc::now(),
            directory: self.directory.as_deref(),
            attestation_decoder: self.attestation_decoder.as_deref(),
            extension_encoder: self.extension_encoder.as_deref(),
        };

        for validator in &self.validators {
            debug!(
                template,
                request_id = request.request_id,
                stage = validator.name(),
                denied = verdict.is_denied(),
                "running validator stage"
            );
            validator.validate(&ctx, &mut state, &mut verdict);
        }

        // Audit-mode branch: report the would-be denial, return the
        // upstream disposition (always Issue past the gate above)
        // unchanged.
        if verdict.is_denied() && verdict.audit_only() {
            warn!(
                template,
                request_id = request.request_id,
                reasons = ?verdict.description,
                "audit mode: request violates policy but will be issued"
            );
            verdict.downgrade_for_audit();
        }

        if verdict.is_denied() {
            info!(
                template,
                request_id = request.request_id,
                status = verdict.status_code().as_str(),
                "request denied by policy"
            );
        }

        verdict
    }

    fn no_policy_verdict(
        &self,
        template: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> ValidationResult {
        let mut verdict = ValidationResult::new(false, not_before, not_after);
        match self.options.no_policy_action {
            NoPolicyAction::Deny => {
                verdict.deny_with_code(
                    StatusCode::TemplateDenied,
                    format!("No policy document is configured for template '{template}'."),
                );
            }
            NoPolicyAction::Issue => {
                verdict.warn(format!(
                    "No policy document is configured for template '{template}'; issuing without policy evaluation."
                ));
            }
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_policy_deny() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::new(PolicyStore::new(dir.path()), EngineOptions::default());
        let request = CertificateRequest::default();
        let verdict = engine.evaluate(
            "Missing",
            &request,
            Utc::now(),
            Utc::now() + chrono::Duration::days(365),
        );
        assert!(verdict.is_denied());
        assert_eq!(verdict.status_code(), StatusCode::TemplateDenied);
    }

    #[test]
    fn test_settled_upstream_disposition_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PolicyEngine::new(PolicyStore::new(dir.path()), EngineOptions::default());

        // No policy exists, which would normally deny; a request the CA
        // already denied or parked must come back untouched.
        for disposition in [Disposition::Deny, Disposition::Pending] {
            let request = CertificateRequest {
                disposition,
                ..Default::default()
            };
            let verdict = engine.evaluate(
                "Missing",
                &request,
                Utc::now(),
                Utc::now() + chrono::Duration::days(365),
            );
            assert!(!verdict.is_denied());
            assert!(verdict.description.is_empty());
            assert!(verdict.warnings.is_empty());
        }
    }

    #[test]
    fn test_no_policy_issue_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let options = EngineOptions {
            no_policy_action: NoPolicyAction::Issue,
            ..Default::default()
        };
        let engine = PolicyEngine::new(PolicyStore::new(dir.path()), options);
        let request = CertificateRequest::default();
        let verdict = engine.evaluate(
            "Missing",
            &request,
            Utc::now(),
            Utc::now() + chrono::Duration::days(365),
        );
        assert!(!verdict.is_denied());
        assert_eq!(verdict.warnings.len(), 1);
    }
}
