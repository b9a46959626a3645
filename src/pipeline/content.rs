// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Content-synthesis stage.
//!
//! Expands the policy's outbound subject, SAN, and extension URI templates
//! against the request, directory, and device data collected by earlier
//! stages, and schedules the results on the verdict for the host to apply.

use super::{EvaluationContext, EvaluationState, Validator};
use crate::dn::NameField;
use crate::error::Result;
use crate::oids;
use crate::token;
use crate::verdict::ValidationResult;
use const_oid::ObjectIdentifier;
use tracing::debug;

/// Host-provided DER encoder for the extensions the engine schedules.
///
/// The engine never produces ASN.1 itself; it hands the host plain values
/// and receives opaque DER payloads back.
pub trait ExtensionEncoder: Send + Sync {
    /// Encode a CRL distribution points extension payload from URIs.
    fn encode_crl_distribution_points(&self, uris: &[String]) -> Result<Vec<u8>>;

    /// Encode an authority-information-access extension payload from URIs.
    fn encode_authority_info_access(&self, uris: &[String]) -> Result<Vec<u8>>;

    /// Encode the security-identifier extension payload from a SID string.
    fn encode_security_identifier(&self, sid: &str) -> Result<Vec<u8>>;
}

/// Stage 5: outbound content synthesis.
pub struct ContentValidator;

impl Validator for ContentValidator {
    fn name(&self) -> &'static str {
        "content"
    }

    fn validate(
        &self,
        ctx: &EvaluationContext<'_>,
        state: &mut EvaluationState,
        verdict: &mut ValidationResult,
    ) {
        // This stage runs even on a denied verdict: under audit-only policy
        // the certificate is issued anyway and must carry the synthesized
        // content.
        let sources = TokenSources::collect(ctx, state);

        self.apply_outbound_subject(ctx, &sources, verdict);
        self.apply_outbound_san(ctx, &sources, verdict);

        self.apply_uri_extension(
            ctx,
            &sources,
            verdict,
            &ctx.policy.crl_distribution_points,
            oids::CRL_DISTRIBUTION_POINTS,
            "CRL distribution points",
        );
        self.apply_uri_extension(
            ctx,
            &sources,
            verdict,
            &ctx.policy.authority_information_access,
            oids::AUTHORITY_INFO_ACCESS,
            "authority information access",
        );
    }
}

impl ContentValidator {
    fn apply_outbound_subject(
        &self,
        ctx: &EvaluationContext<'_>,
        sources: &TokenSources,
        verdict: &mut ValidationResult,
    ) {
        for rule in &ctx.policy.outbound_subject {
            let present = ctx.request.subject_values(&rule.field).next().is_some();
            if present && !rule.force {
                continue;
            }

            match sources.expand(&rule.value) {
                Ok(value) => {
                    debug!(field = %rule.field, value = %value, "synthesizing subject field");
                    verdict.set_property(subject_property_name(&rule.field), value);
                }
                Err(e) => self.expansion_failed(rule.mandatory, &rule.field, &e, verdict),
            }
        }
    }

    fn apply_outbound_san(
        &self,
        ctx: &EvaluationContext<'_>,
        sources: &TokenSources,
        verdict: &mut ValidationResult,
    ) {
        for rule in &ctx.policy.outbound_san {
            let present = ctx.request.san_values(&rule.field).next().is_some();
            if present && !rule.force {
                continue;
            }

            match sources.expand(&rule.value) {
                Ok(value) => {
                    debug!(field = %rule.field, value = %value, "synthesizing SAN entry");
                    verdict.add_san(NameField::new(&rule.field, value));
                }
                Err(e) => self.expansion_failed(rule.mandatory, &rule.field, &e, verdict),
            }
        }
    }

    fn expansion_failed(
        &self,
        mandatory: bool,
        field: &str,
        error: &crate::error::PolicyError,
        verdict: &mut ValidationResult,
    ) {
        if mandatory {
            verdict.deny(format!(
                "The mandatory outbound rule for '{field}' could not be expanded: {error}"
            ));
        } else {
            verdict.warn(format!(
                "The outbound rule for '{field}' was skipped: {error}"
            ));
        }
    }

    fn apply_uri_extension(
        &self,
        ctx: &EvaluationContext<'_>,
        sources: &TokenSources,
        verdict: &mut ValidationResult,
        templates: &[String],
        oid: ObjectIdentifier,
        what: &str,
    ) {
        if templates.is_empty() {
            return;
        }

        let mut uris = Vec::with_capacity(templates.len());
        for template in templates {
            match sources.expand(template) {
                Ok(uri) => uris.push(uri),
                Err(e) => {
                    verdict.warn(format!("A {what} URI was skipped: {e}"));
                }
            }
        }
        if uris.is_empty() {
            return;
        }

        let encoder = match ctx.extension_encoder {
            Some(encoder) => encoder,
            None => {
                verdict.warn(format!(
                    "Policy configures {what} URIs but no extension encoder is available."
                ));
                return;
            }
        };

        let encoded = if oid == oids::CRL_DISTRIBUTION_POINTS {
            encoder.encode_crl_distribution_points(&uris)
        } else {
            encoder.encode_authority_info_access(&uris)
        };
        match encoded {
            Ok(der) => verdict.add_extension(oid, der, false),
            Err(e) => verdict.warn(format!("Encoding the {what} extension failed: {e}")),
        }
    }
}

/// The per-namespace key/value data one evaluation exposes to templates.
struct TokenSources {
    ad: Vec<(String, String)>,
    vendor: Vec<(String, String)>,
    sdn: Vec<(String, String)>,
    san: Vec<(String, String)>,
}

impl TokenSources {
    fn collect(ctx: &EvaluationContext<'_>, state: &EvaluationState) -> Self {
        let mut ad = Vec::new();
        if let Some(object) = &state.directory_object {
            ad.push((
                "distinguishedName".to_string(),
                object.distinguished_name.clone(),
            ));
            if let Some(sid) = &object.security_identifier {
                ad.push(("objectSid".to_string(), sid.clone()));
            }
            for (key, value) in &object.attributes {
                ad.push((key.clone(), value.clone()));
            }
        }

        let vendor = state
            .device_profile
            .as_ref()
            .map(|profile| profile.token_pairs())
            .unwrap_or_default();

        let field_pairs = |fields: &[NameField]| {
            fields
                .iter()
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect::<Vec<_>>()
        };

        Self {
            ad,
            vendor,
            sdn: field_pairs(&ctx.request.subject),
            san: field_pairs(&ctx.request.subject_alternative_names),
        }
    }

    fn expand(&self, template: &str) -> Result<String> {
        token::expand_all(
            template,
            &[
                ("ad", self.ad.as_slice()),
                ("vendor", self.vendor.as_slice()),
                ("sdn", self.sdn.as_slice()),
                ("san", self.san.as_slice()),
            ],
        )
    }
}

/// Certificate property name the host uses for a subject RDN type.
fn subject_property_name(field: &str) -> String {
    const NAMES: &[(&str, &str)] = &[
        ("commonName", "Subject.CommonName"),
        ("organizationName", "Subject.Organization"),
        ("organizationalUnitName", "Subject.OrgUnit"),
        ("localityName", "Subject.Locality"),
        ("stateOrProvinceName", "Subject.State"),
        ("countryName", "Subject.Country"),
        ("emailAddress", "Subject.EMail"),
        ("givenName", "Subject.GivenName"),
        ("surname", "Subject.SurName"),
        ("initials", "Subject.Initials"),
        ("title", "Subject.Title"),
        ("streetAddress", "Subject.StreetAddress"),
        ("domainComponent", "Subject.DomainComponent"),
        ("serialNumber", "Subject.DeviceSerialNumber"),
    ];

    NAMES
        .iter()
        .find(|(rdn, _)| rdn.eq_ignore_ascii_case(field))
        .map(|(_, property)| (*property).to_string())
        .unwrap_or_else(|| format!("Subject.{field}"))
}
