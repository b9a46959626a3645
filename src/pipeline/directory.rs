// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Directory-binding stage.
//!
//! Resolves the enrollee's identity to a directory object through the
//! host-provided [`DirectoryService`] and enforces the policy's account,
//! organizational-unit, group and attribute constraints. Every lookup
//! failure is converted into a denial; a fault never escapes the pipeline.

use super::{EvaluationContext, EvaluationState, Validator};
use crate::directory::DirectoryObject;
use crate::dn::NameField;
use crate::oids;
use crate::policy::{AttributeRule, DirectoryMapping, SidExtensionMode};
use crate::request::san;
use crate::verdict::ValidationResult;
use chrono::Duration;
use tracing::debug;

/// Stage 3: directory binding.
pub struct DirectoryValidator;

impl Validator for DirectoryValidator {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn validate(
        &self,
        ctx: &EvaluationContext<'_>,
        state: &mut EvaluationState,
        verdict: &mut ValidationResult,
    ) {
        let mapping = match &ctx.policy.directory_services {
            Some(mapping) => mapping,
            None => return,
        };
        if verdict.is_denied() {
            return;
        }

        let cert_attribute = certificate_attribute(mapping, ctx.request.machine_template);
        let identity = match identity_value(ctx.request, &cert_attribute) {
            Some(value) => value.to_string(),
            None => {
                verdict.deny(format!(
                    "The request carries no '{cert_attribute}' field to map against the \
                     directory."
                ));
                return;
            }
        };

        let service = match ctx.directory {
            Some(service) => service,
            None => {
                verdict.deny(
                    "Policy requires a directory mapping but no directory service is \
                     available."
                        .to_string(),
                );
                return;
            }
        };

        let object = match service.search(
            &mapping.directory_attribute,
            &identity,
            mapping.object_category,
            mapping.search_root.as_deref(),
        ) {
            Ok(object) => object,
            Err(e) => {
                verdict.deny(e.to_string());
                return;
            }
        };

        debug!(
            identity = %identity,
            object = %object.distinguished_name,
            "resolved directory object"
        );

        self.check_object(ctx, mapping, &object, verdict);

        // The object is kept for token expansion even when a constraint
        // denied the request, so audit-mode content synthesis still works.
        state.directory_object = Some(object);
    }
}

impl DirectoryValidator {
    fn check_object(
        &self,
        ctx: &EvaluationContext<'_>,
        mapping: &DirectoryMapping,
        object: &DirectoryObject,
        verdict: &mut ValidationResult,
    ) {
        if !object.is_enabled() {
            verdict.deny(format!(
                "The account '{}' is disabled.",
                object.distinguished_name
            ));
        }

        self.check_organizational_units(mapping, object, verdict);
        self.check_groups(mapping, object, verdict);
        self.check_attribute_rules(&mapping.attribute_rules, object, verdict);
        self.check_password_age(ctx, mapping, object, verdict);

        self.apply_sid_extension(ctx, mapping, object, verdict);
        if mapping.add_sid_uri {
            self.add_sid_uri(object, verdict);
        }
        if mapping.supplement_service_principal_names {
            self.supplement_from_spns(ctx, object, verdict);
        }
    }

    fn check_organizational_units(
        &self,
        mapping: &DirectoryMapping,
        object: &DirectoryObject,
        verdict: &mut ValidationResult,
    ) {
        let dn = &object.distinguished_name;

        if !mapping.allowed_organizational_units.is_empty()
            && !mapping
                .allowed_organizational_units
                .iter()
                .any(|ou| dn_has_suffix(dn, ou))
        {
            verdict.deny(format!(
                "The object '{dn}' is not under any permitted organizational unit."
            ));
        }

        for ou in &mapping.disallowed_organizational_units {
            if dn_has_suffix(dn, ou) {
                verdict.deny(format!(
                    "The object '{dn}' is under the disallowed organizational unit '{ou}'."
                ));
            }
        }
    }

    fn check_groups(
        &self,
        mapping: &DirectoryMapping,
        object: &DirectoryObject,
        verdict: &mut ValidationResult,
    ) {
        if !mapping.allowed_security_groups.is_empty()
            && !mapping
                .allowed_security_groups
                .iter()
                .any(|group| object.is_member_of(group))
        {
            verdict.deny(format!(
                "The object '{}' is not a member of any permitted security group.",
                object.distinguished_name
            ));
        }

        for group in &mapping.disallowed_security_groups {
            if object.is_member_of(group) {
                verdict.deny(format!(
                    "The object '{}' is a member of the disallowed security group '{group}'.",
                    object.distinguished_name
                ));
            }
        }
    }

    fn check_attribute_rules(
        &self,
        rules: &[AttributeRule],
        object: &DirectoryObject,
        verdict: &mut ValidationResult,
    ) {
        for rule in rules {
            let has_allow = rule.patterns.iter().any(|p| !p.match_on_error());

            let value = match object.attribute(&rule.attribute) {
                Some(value) => value,
                None => {
                    if has_allow {
                        verdict.deny(format!(
                            "The directory attribute '{}' is absent, but policy requires \
                             it to match a permitted value.",
                            rule.attribute
                        ));
                    }
                    continue;
                }
            };

            if has_allow
                && !rule
                    .patterns
                    .iter()
                    .filter(|p| !p.match_on_error())
                    .any(|p| p.matches(value, false))
            {
                verdict.deny(format!(
                    "The directory attribute '{}' value '{value}' is not allowed by policy.",
                    rule.attribute
                ));
            }

            for pattern in rule.patterns.iter().filter(|p| p.match_on_error()) {
                if pattern.matches(value, true) {
                    verdict.deny(format!(
                        "The directory attribute '{}' value '{value}' is explicitly \
                         disallowed by the pattern \"{}\".",
                        rule.attribute, pattern.expression
                    ));
                }
            }
        }
    }

    fn check_password_age(
        &self,
        ctx: &EvaluationContext<'_>,
        mapping: &DirectoryMapping,
        object: &DirectoryObject,
        verdict: &mut ValidationResult,
    ) {
        let max_days = match mapping.maximum_password_age_days {
            Some(days) => days,
            None => return,
        };
        let last_set = match object.password_last_set {
            Some(last_set) => last_set,
            None => return,
        };

        if ctx.now - last_set > Duration::days(i64::from(max_days)) {
            verdict.deny(format!(
                "The account password of '{}' was last set more than {max_days} days ago.",
                object.distinguished_name
            ));
        }
    }

    fn apply_sid_extension(
        &self,
        ctx: &EvaluationContext<'_>,
        _mapping: &DirectoryMapping,
        object: &DirectoryObject,
        verdict: &mut ValidationResult,
    ) {
        if ctx.policy.security_identifier_extension != SidExtensionMode::Add {
            return;
        }

        let sid = match &object.security_identifier {
            Some(sid) => sid,
            None => {
                verdict.deny(format!(
                    "Policy adds the security identifier extension, but the object '{}' \
                     carries no security identifier.",
                    object.distinguished_name
                ));
                return;
            }
        };

        let encoder = match ctx.extension_encoder {
            Some(encoder) => encoder,
            None => {
                verdict.deny(
                    "Policy adds the security identifier extension but no extension \
                     encoder is available."
                        .to_string(),
                );
                return;
            }
        };

        match encoder.encode_security_identifier(sid) {
            Ok(der) => verdict.add_extension(oids::SECURITY_IDENTIFIER, der, false),
            Err(e) => verdict.deny(format!(
                "Encoding the security identifier extension failed: {e}"
            )),
        }
    }

    fn add_sid_uri(&self, object: &DirectoryObject, verdict: &mut ValidationResult) {
        if let Some(sid) = &object.security_identifier {
            verdict.add_san(NameField::new(
                san::URI,
                format!("tag:microsoft.com,2022-09-14:sid:{sid}"),
            ));
        }
    }

    fn supplement_from_spns(
        &self,
        ctx: &EvaluationContext<'_>,
        object: &DirectoryObject,
        verdict: &mut ValidationResult,
    ) {
        for spn in &object.service_principal_names {
            let host = match spn.get(..5) {
                Some(prefix) if prefix.eq_ignore_ascii_case("host/") => &spn[5..],
                _ => continue,
            };
            if super::request_key::is_dns_name(host, ctx.policy.allow_unqualified_names)
                && !ctx.request.has_san(san::DNS_NAME, host)
            {
                debug!(name = host, "supplementing SAN from service principal name");
                verdict.add_san(NameField::new(san::DNS_NAME, host));
            }
        }
    }
}

/// The request field the identity is read from, defaulting by template scope.
fn certificate_attribute(mapping: &DirectoryMapping, machine_template: bool) -> String {
    match &mapping.certificate_attribute {
        Some(attribute) => attribute.clone(),
        None if machine_template => san::DNS_NAME.to_string(),
        None => san::USER_PRINCIPAL_NAME.to_string(),
    }
}

/// First SAN entry of the mapped type, falling back to a subject RDN of the
/// same name.
fn identity_value<'r>(
    request: &'r crate::request::CertificateRequest,
    cert_attribute: &'r str,
) -> Option<&'r str> {
    request
        .san_values(cert_attribute)
        .next()
        .or_else(|| request.subject_values(cert_attribute).next())
}

/// Whether `dn` sits under the container `suffix` (case-insensitive).
///
/// The match must begin at a component boundary: either the start of the DN
/// or directly after an unescaped comma. A suffix-shaped string inside an
/// escaped RDN value does not count as container membership.
fn dn_has_suffix(dn: &str, suffix: &str) -> bool {
    if suffix.is_empty() || dn.len() < suffix.len() {
        return false;
    }
    let boundary = dn.len() - suffix.len();
    let tail = match dn.get(boundary..) {
        Some(tail) => tail,
        None => return false,
    };
    if !tail.eq_ignore_ascii_case(suffix) {
        return false;
    }
    if boundary == 0 {
        return true;
    }

    let head = &dn[..boundary];
    if !head.ends_with(',') {
        return false;
    }
    // An odd run of backslashes before the comma means the comma is escaped
    // and belongs to the preceding value.
    let backslashes = head[..head.len() - 1]
        .chars()
        .rev()
        .take_while(|&c| c == '\\')
        .count();
    backslashes % 2 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryError, DirectoryService, ObjectCategory, UF_ACCOUNT_DISABLE};
    use crate::error::{PolicyError, Result};
    use crate::pattern::{Pattern, PatternAction};
    use crate::pipeline::{EngineOptions, ExtensionEncoder};
    use crate::policy::PolicyDocument;
    use crate::request::CertificateRequest;
    use chrono::Utc;

    struct FakeDirectory {
        object: Option<DirectoryObject>,
    }

    impl DirectoryService for FakeDirectory {
        fn search(
            &self,
            attribute: &str,
            value: &str,
            category: ObjectCategory,
            _search_root: Option<&str>,
        ) -> std::result::Result<DirectoryObject, DirectoryError> {
            match &self.object {
                Some(object) => Ok(object.clone()),
                None => Err(DirectoryError::NotFound {
                    category: category.as_str().to_string(),
                    attribute: attribute.to_string(),
                    value: value.to_string(),
                }),
            }
        }
    }

    struct FakeEncoder;

    impl ExtensionEncoder for FakeEncoder {
        fn encode_crl_distribution_points(&self, _uris: &[String]) -> Result<Vec<u8>> {
            Ok(vec![0x30, 0x00])
        }
        fn encode_authority_info_access(&self, _uris: &[String]) -> Result<Vec<u8>> {
            Ok(vec![0x30, 0x00])
        }
        fn encode_security_identifier(&self, sid: &str) -> Result<Vec<u8>> {
            if sid.starts_with("S-1-5-") {
                Ok(sid.as_bytes().to_vec())
            } else {
                Err(PolicyError::encoding("malformed SID"))
            }
        }
    }

    fn object() -> DirectoryObject {
        DirectoryObject {
            distinguished_name:
                "CN=HOST01,OU=Servers,DC=example,DC=com".to_string(),
            user_account_control: 0x1000, // WORKSTATION_TRUST_ACCOUNT
            member_of: vec!["CN=Web Servers,OU=Groups,DC=example,DC=com".to_string()],
            security_identifier: Some("S-1-5-21-1-2-3-4567".to_string()),
            service_principal_names: vec![
                "HOST/host01.example.com".to_string(),
                "TERMSRV/host01".to_string(),
            ],
            ..Default::default()
        }
    }

    fn policy() -> PolicyDocument {
        PolicyDocument {
            directory_services: Some(DirectoryMapping::default()),
            ..Default::default()
        }
    }

    fn request() -> CertificateRequest {
        CertificateRequest {
            subject_alternative_names: vec![NameField::new(
                san::DNS_NAME,
                "host01.example.com",
            )],
            machine_template: true,
            ..Default::default()
        }
    }

    fn run(
        request: &CertificateRequest,
        policy: &PolicyDocument,
        directory: Option<&dyn DirectoryService>,
        encoder: Option<&dyn ExtensionEncoder>,
    ) -> (ValidationResult, EvaluationState) {
        let options = EngineOptions::default();
        let ctx = EvaluationContext {
            request,
            policy,
            template: "Test",
            options: &options,
            now: Utc::now(),
            directory,
            attestation_decoder: None,
            extension_encoder: encoder,
        };
        let mut verdict =
            ValidationResult::new(false, Utc::now(), Utc::now() + Duration::days(365));
        let mut state = EvaluationState::default();
        DirectoryValidator.validate(&ctx, &mut state, &mut verdict);
        (verdict, state)
    }

    #[test]
    fn test_no_mapping_skips_stage() {
        let (verdict, state) = run(&request(), &PolicyDocument::default(), None, None);
        assert!(!verdict.is_denied());
        assert!(state.directory_object.is_none());
    }

    #[test]
    fn test_enabled_object_passes() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let (verdict, state) = run(&request(), &policy(), Some(&dir), None);
        assert!(!verdict.is_denied(), "{:?}", verdict.description);
        assert!(state.directory_object.is_some());
    }

    #[test]
    fn test_lookup_failure_denies() {
        let dir = FakeDirectory { object: None };
        let (verdict, _) = run(&request(), &policy(), Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("No computer object found"));
    }

    #[test]
    fn test_missing_directory_service_denies() {
        let (verdict, _) = run(&request(), &policy(), None, None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("no directory service"));
    }

    #[test]
    fn test_missing_identity_field_denies() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut req = request();
        req.subject_alternative_names.clear();
        let (verdict, _) = run(&req, &policy(), Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("dNSName"));
    }

    #[test]
    fn test_identity_falls_back_to_subject() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut req = request();
        req.subject_alternative_names.clear();
        req.subject = vec![NameField::new("dNSName", "host01.example.com")];
        let (verdict, _) = run(&req, &policy(), Some(&dir), None);
        assert!(!verdict.is_denied());
    }

    #[test]
    fn test_disabled_account_denies() {
        let mut obj = object();
        obj.user_account_control |= UF_ACCOUNT_DISABLE;
        let dir = FakeDirectory { object: Some(obj) };
        let (verdict, _) = run(&request(), &policy(), Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("disabled"));
    }

    #[test]
    fn test_allowed_organizational_units() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut pol = policy();
        {
            let mapping = pol.directory_services.as_mut().unwrap();
            mapping.allowed_organizational_units =
                vec!["OU=Servers,DC=example,DC=com".to_string()];
        }
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(!verdict.is_denied());

        let mapping = pol.directory_services.as_mut().unwrap();
        mapping.allowed_organizational_units =
            vec!["OU=Workstations,DC=example,DC=com".to_string()];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
    }

    #[test]
    fn test_dn_suffix_requires_component_boundary() {
        const OU: &str = "OU=Servers,DC=example,DC=com";
        assert!(dn_has_suffix("CN=HOST01,OU=Servers,DC=example,DC=com", OU));
        assert!(dn_has_suffix("ou=servers,dc=example,dc=com", OU));
        // Escaped comma: the "suffix" sits inside the CN value.
        assert!(!dn_has_suffix(
            "CN=evil\\,OU=Servers,DC=example,DC=com",
            OU
        ));
        // Escaped backslash followed by a real separator.
        assert!(dn_has_suffix(
            "CN=a\\\\,OU=Servers,DC=example,DC=com",
            OU
        ));
        // Mid-component match without a separator.
        assert!(!dn_has_suffix("CN=a,XOU=Servers,DC=example,DC=com", OU));
        assert!(!dn_has_suffix("CN=a,DC=example,DC=com", ""));
    }

    #[test]
    fn test_escaped_comma_does_not_grant_container_membership() {
        let mut obj = object();
        obj.distinguished_name = "CN=evil\\,OU=Servers,DC=example,DC=com".to_string();
        let dir = FakeDirectory { object: Some(obj) };
        let mut pol = policy();
        pol.directory_services
            .as_mut()
            .unwrap()
            .allowed_organizational_units = vec!["OU=Servers,DC=example,DC=com".to_string()];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("not under any permitted"));
    }

    #[test]
    fn test_disallowed_organizational_unit() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut pol = policy();
        pol.directory_services
            .as_mut()
            .unwrap()
            .disallowed_organizational_units =
            vec!["ou=servers,dc=example,dc=com".to_string()];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
    }

    #[test]
    fn test_group_constraints() {
        let dir = FakeDirectory {
            object: Some(object()),
        };

        let mut pol = policy();
        pol.directory_services
            .as_mut()
            .unwrap()
            .allowed_security_groups =
            vec!["CN=Web Servers,OU=Groups,DC=example,DC=com".to_string()];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(!verdict.is_denied());

        let mut pol = policy();
        pol.directory_services
            .as_mut()
            .unwrap()
            .disallowed_security_groups =
            vec!["cn=web servers,ou=groups,dc=example,dc=com".to_string()];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("disallowed security group"));
    }

    #[test]
    fn test_attribute_rules() {
        let mut obj = object();
        obj.attributes
            .insert("operatingSystem".to_string(), "Windows Server 2022".to_string());
        let dir = FakeDirectory { object: Some(obj) };

        let mut pol = policy();
        pol.directory_services.as_mut().unwrap().attribute_rules = vec![AttributeRule {
            attribute: "operatingSystem".to_string(),
            patterns: vec![Pattern::new("^Windows Server.*$")],
        }];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(!verdict.is_denied());

        pol.directory_services.as_mut().unwrap().attribute_rules = vec![AttributeRule {
            attribute: "operatingSystem".to_string(),
            patterns: vec![
                Pattern::new("^Windows.*$"),
                Pattern::new("^.*2022$").with_action(PatternAction::Deny),
            ],
        }];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("explicitly"));
    }

    #[test]
    fn test_absent_attribute_with_allow_patterns_denies() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut pol = policy();
        pol.directory_services.as_mut().unwrap().attribute_rules = vec![AttributeRule {
            attribute: "operatingSystem".to_string(),
            patterns: vec![Pattern::new("^Windows.*$")],
        }];
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("absent"));
    }

    #[test]
    fn test_password_age() {
        let mut obj = object();
        obj.password_last_set = Some(Utc::now() - Duration::days(120));
        let dir = FakeDirectory { object: Some(obj) };
        let mut pol = policy();
        pol.directory_services
            .as_mut()
            .unwrap()
            .maximum_password_age_days = Some(90);
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
        assert!(verdict.description[0].contains("90 days"));
    }

    #[test]
    fn test_sid_extension_add() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut pol = policy();
        pol.security_identifier_extension = SidExtensionMode::Add;
        let (verdict, _) = run(&request(), &pol, Some(&dir), Some(&FakeEncoder));
        assert!(!verdict.is_denied());
        assert_eq!(verdict.extensions_to_set.len(), 1);
        assert_eq!(verdict.extensions_to_set[0].oid, oids::SECURITY_IDENTIFIER);

        // No encoder available: hard failure.
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert!(verdict.is_denied());
    }

    #[test]
    fn test_sid_uri_san() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut pol = policy();
        pol.directory_services.as_mut().unwrap().add_sid_uri = true;
        let (verdict, _) = run(&request(), &pol, Some(&dir), None);
        assert_eq!(verdict.san_to_add.len(), 1);
        assert_eq!(verdict.san_to_add[0].name, san::URI);
        assert_eq!(
            verdict.san_to_add[0].value,
            "tag:microsoft.com,2022-09-14:sid:S-1-5-21-1-2-3-4567"
        );
    }

    #[test]
    fn test_spn_supplementation() {
        let dir = FakeDirectory {
            object: Some(object()),
        };
        let mut pol = policy();
        pol.directory_services
            .as_mut()
            .unwrap()
            .supplement_service_principal_names = true;
        let mut req = request();
        req.subject_alternative_names = vec![NameField::new(san::DNS_NAME, "alias.example.com")];
        let (verdict, _) = run(&req, &pol, Some(&dir), None);
        // "HOST/host01.example.com" contributes; "TERMSRV/host01" does not.
        assert_eq!(verdict.san_to_add.len(), 1);
        assert_eq!(verdict.san_to_add[0].value, "host01.example.com");
    }
}
