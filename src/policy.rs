// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! The declarative policy document.
//!
//! One TOML document per certificate template describes everything the
//! pipeline enforces: key requirements, provider and process provenance,
//! subject/SAN content rules, directory binding, attestation policy, and
//! outbound content synthesis. Documents are immutable once loaded for a
//! given evaluation; see [`crate::store`] for caching and staleness.

use crate::attestation::AttestationRule;
use crate::directory::ObjectCategory;
use crate::error::{PolicyError, Result};
use crate::pattern::Pattern;
use crate::request::KeyAlgorithmFamily;
use crate::rules::SubjectRule;
use serde::{Deserialize, Serialize};

/// How the restricted security-identifier extension in a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SidExtensionMode {
    /// Deny any request carrying the extension (the default).
    #[default]
    Deny,
    /// Strip the inline extension; the directory stage adds the
    /// authoritative value from the directory object.
    Add,
    /// Pass the inline extension through untouched.
    Allow,
}

/// Allow/deny patterns applied to one directory attribute of the resolved
/// object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeRule {
    /// Directory attribute name.
    pub attribute: String,

    /// Ordered allow/deny patterns for the attribute value.
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

/// One outbound subject or SAN field synthesized from templated data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutboundRule {
    /// Subject RDN type or SAN type the value is written to.
    pub field: String,

    /// Value template; may reference `{ad:...}`, `{vendor:...}`,
    /// `{sdn:...}` and `{san:...}` tokens.
    pub value: String,

    /// When expansion fails: a mandatory rule denies the request, a
    /// non-mandatory rule is skipped.
    #[serde(default)]
    pub mandatory: bool,

    /// Overwrite even when the request already carries the field.
    #[serde(default)]
    pub force: bool,
}

/// Directory-service binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryMapping {
    /// Request field the enrollee's identity is read from. When absent, a
    /// template-derived default applies (`dNSName` for machine templates,
    /// `userPrincipalName` for user templates).
    #[serde(default)]
    pub certificate_attribute: Option<String>,

    /// Directory attribute the identity value is searched on.
    #[serde(default = "default_directory_attribute")]
    pub directory_attribute: String,

    /// Object category to search.
    #[serde(default)]
    pub object_category: ObjectCategory,

    /// Optional subtree the object must live under.
    #[serde(default)]
    pub search_root: Option<String>,

    /// Organizational units (DN suffixes) the object must be under.
    /// Empty means no restriction.
    #[serde(default)]
    pub allowed_organizational_units: Vec<String>,

    /// Organizational units (DN suffixes) the object must not be under.
    #[serde(default)]
    pub disallowed_organizational_units: Vec<String>,

    /// Security groups (DNs) the object must be a member of at least one
    /// of. Empty means no restriction.
    #[serde(default)]
    pub allowed_security_groups: Vec<String>,

    /// Security groups (DNs) the object must not be a member of.
    #[serde(default)]
    pub disallowed_security_groups: Vec<String>,

    /// Allow/deny pattern rules over directory attribute values.
    #[serde(default)]
    pub attribute_rules: Vec<AttributeRule>,

    /// Add a SID URI SAN entry built from the object's security identifier.
    #[serde(default)]
    pub add_sid_uri: bool,

    /// Add DNS SAN entries derived from `host/` service principal names.
    #[serde(default)]
    pub supplement_service_principal_names: bool,

    /// Deny when the account password is older than this many days.
    #[serde(default)]
    pub maximum_password_age_days: Option<u32>,
}

fn default_directory_attribute() -> String {
    "dNSHostName".to_string()
}

impl Default for DirectoryMapping {
    fn default() -> Self {
        Self {
            certificate_attribute: None,
            directory_attribute: default_directory_attribute(),
            object_category: ObjectCategory::default(),
            search_root: None,
            allowed_organizational_units: Vec::new(),
            disallowed_organizational_units: Vec::new(),
            allowed_security_groups: Vec::new(),
            disallowed_security_groups: Vec::new(),
            attribute_rules: Vec::new(),
            add_sid_uri: false,
            supplement_service_principal_names: false,
            maximum_password_age_days: None,
        }
    }
}

/// Hardware attestation policy section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestationPolicy {
    /// Deny requests that carry no attestation data.
    #[serde(default)]
    pub required: bool,

    /// Ordered device rules; see [`crate::attestation::evaluate`].
    #[serde(default)]
    pub rules: Vec<AttestationRule>,
}

/// The complete declarative policy for one certificate template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    /// Log denials without enforcing them.
    #[serde(default)]
    pub audit_only: bool,

    /// Required key algorithm family.
    #[serde(default)]
    pub key_algorithm: KeyAlgorithmFamily,

    /// Minimum key length in bits. Zero disables the check.
    #[serde(default)]
    pub minimum_key_length: u32,

    /// Maximum key length in bits. Zero disables the check.
    #[serde(default)]
    pub maximum_key_length: u32,

    /// Cap the certificate validity at this many days from evaluation time,
    /// when shorter than the host-computed expiration.
    #[serde(default)]
    pub validity_period_days: Option<u32>,

    /// Rules for the request's subject RDNs.
    #[serde(default)]
    pub subject_rules: Vec<SubjectRule>,

    /// Rules for the request's subject-alternative-name entries.
    #[serde(default)]
    pub san_rules: Vec<SubjectRule>,

    /// Crypto providers the key must come from. Empty means no restriction.
    #[serde(default)]
    pub allowed_crypto_providers: Vec<String>,

    /// Crypto providers the key must not come from.
    #[serde(default)]
    pub disallowed_crypto_providers: Vec<String>,

    /// Process names allowed to enroll. Empty means no restriction.
    #[serde(default)]
    pub allowed_processes: Vec<String>,

    /// Process names denied enrollment.
    #[serde(default)]
    pub disallowed_processes: Vec<String>,

    /// Handling of the inline security-identifier extension.
    #[serde(default)]
    pub security_identifier_extension: SidExtensionMode,

    /// Derive DNS/IP SAN entries from a DNS-shaped commonName.
    #[serde(default)]
    pub supplement_dns_names: bool,

    /// Accept single-label DNS names when supplementing.
    #[serde(default)]
    pub allow_unqualified_names: bool,

    /// Directory binding; absent disables the directory stage.
    #[serde(default)]
    pub directory_services: Option<DirectoryMapping>,

    /// Outbound subject fields to synthesize.
    #[serde(default)]
    pub outbound_subject: Vec<OutboundRule>,

    /// Outbound SAN entries to synthesize.
    #[serde(default)]
    pub outbound_san: Vec<OutboundRule>,

    /// Templated CRL distribution point URIs.
    #[serde(default)]
    pub crl_distribution_points: Vec<String>,

    /// Templated authority-information-access URIs.
    #[serde(default)]
    pub authority_information_access: Vec<String>,

    /// Hardware attestation policy; absent disables the attestation stage.
    #[serde(default)]
    pub attestation: Option<AttestationPolicy>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            audit_only: false,
            key_algorithm: KeyAlgorithmFamily::default(),
            minimum_key_length: 0,
            maximum_key_length: 0,
            validity_period_days: None,
            subject_rules: Vec::new(),
            san_rules: Vec::new(),
            allowed_crypto_providers: Vec::new(),
            disallowed_crypto_providers: Vec::new(),
            allowed_processes: Vec::new(),
            disallowed_processes: Vec::new(),
            security_identifier_extension: SidExtensionMode::default(),
            supplement_dns_names: false,
            allow_unqualified_names: false,
            directory_services: None,
            outbound_subject: Vec::new(),
            outbound_san: Vec::new(),
            crl_distribution_points: Vec::new(),
            authority_information_access: Vec::new(),
            attestation: None,
        }
    }
}

impl PolicyDocument {
    /// Parse a policy document from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| PolicyError::config(format!("Invalid TOML: {e}")))
    }

    /// Serialize the document to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PolicyError::config(format!("TOML serialize: {e}")))
    }

    /// Validate the document for internal consistency.
    ///
    /// All problems are collected and reported together.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.maximum_key_length != 0 && self.minimum_key_length > self.maximum_key_length {
            errors.push(format!(
                "minimum_key_length ({}) exceeds maximum_key_length ({})",
                self.minimum_key_length, self.maximum_key_length
            ));
        }

        // "add" strips the inline extension and relies on the directory
        // stage for the authoritative value; without a mapping the SID
        // would be silently dropped from the issued certificate.
        if self.security_identifier_extension == SidExtensionMode::Add
            && self.directory_services.is_none()
        {
            errors.push(
                "security_identifier_extension = \"add\" requires a [directory_services] \
                 mapping to supply the authoritative value"
                    .to_string(),
            );
        }

        for rule in self.subject_rules.iter().chain(self.san_rules.iter()) {
            if rule.field.trim().is_empty() {
                errors.push("a subject/san rule has an empty field name".to_string());
            }
            if rule.min_length > rule.max_length {
                errors.push(format!(
                    "rule for {} has min_length {} above max_length {}",
                    rule.field, rule.min_length, rule.max_length
                ));
            }
        }

        for rule in self.outbound_subject.iter().chain(self.outbound_san.iter()) {
            if rule.field.trim().is_empty() {
                errors.push("an outbound rule has an empty field name".to_string());
            }
            if rule.value.trim().is_empty() {
                errors.push(format!(
                    "the outbound rule for {} has an empty value template",
                    rule.field
                ));
            }
        }

        for uri in self
            .crl_distribution_points
            .iter()
            .chain(self.authority_information_access.iter())
        {
            if uri.trim().is_empty() {
                errors.push("an extension URI template is empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::config(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternAction;

    const SAMPLE: &str = r#"
        audit_only = false
        key_algorithm = "rsa"
        minimum_key_length = 2048

        [[subject_rules]]
        field = "commonName"
        mandatory = true

        [[subject_rules.patterns]]
        expression = "^[-_a-zA-Z0-9]*\\.example\\.com$"

        [[san_rules]]
        field = "dNSName"
        max_occurrences = 10

        [[san_rules.patterns]]
        expression = "^[-_a-zA-Z0-9.]*\\.example\\.com$"

        [[san_rules.patterns]]
        expression = "^.*\\.internal$"
        action = "deny"

        [directory_services]
        directory_attribute = "dNSHostName"
        object_category = "computer"
        allowed_organizational_units = ["OU=Servers,DC=example,DC=com"]

        [attestation]
        required = true

        [[attestation.rules]]
        minimum_firmware = "5.2.0"
    "#;

    #[test]
    fn test_parse_sample() {
        let policy = PolicyDocument::from_toml(SAMPLE).unwrap();
        assert_eq!(policy.minimum_key_length, 2048);
        assert_eq!(policy.subject_rules.len(), 1);
        assert!(policy.subject_rules[0].mandatory);
        assert_eq!(policy.san_rules[0].max_occurrences, 10);
        assert_eq!(
            policy.san_rules[0].patterns[1].action,
            PatternAction::Deny
        );
        let mapping = policy.directory_services.as_ref().unwrap();
        assert_eq!(mapping.directory_attribute, "dNSHostName");
        assert!(policy.attestation.as_ref().unwrap().required);
        policy.validate().unwrap();
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(PolicyDocument::from_toml("no_such_setting = true").is_err());
    }

    #[test]
    fn test_defaults() {
        let policy = PolicyDocument::from_toml("").unwrap();
        assert!(!policy.audit_only);
        assert_eq!(policy.key_algorithm, KeyAlgorithmFamily::Rsa);
        assert_eq!(
            policy.security_identifier_extension,
            SidExtensionMode::Deny
        );
        assert!(policy.directory_services.is_none());
        assert!(policy.attestation.is_none());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut policy = PolicyDocument {
            minimum_key_length: 4096,
            maximum_key_length: 2048,
            ..Default::default()
        };
        policy.outbound_subject.push(OutboundRule {
            field: "commonName".to_string(),
            value: "  ".to_string(),
            mandatory: false,
            force: false,
        });

        let err = policy.validate().unwrap_err().to_string();
        assert!(err.contains("minimum_key_length"));
        assert!(err.contains("empty value template"));
    }

    #[test]
    fn test_sid_add_requires_directory_mapping() {
        let policy =
            PolicyDocument::from_toml("security_identifier_extension = \"add\"").unwrap();
        let err = policy.validate().unwrap_err().to_string();
        assert!(err.contains("directory_services"));

        let policy = PolicyDocument::from_toml(
            "security_identifier_extension = \"add\"\n[directory_services]\n",
        )
        .unwrap();
        policy.validate().unwrap();
    }

    #[test]
    fn test_round_trip() {
        let policy = PolicyDocument::from_toml(SAMPLE).unwrap();
        let rendered = policy.to_toml().unwrap();
        let reparsed = PolicyDocument::from_toml(&rendered).unwrap();
        assert_eq!(reparsed.subject_rules.len(), policy.subject_rules.len());
        assert_eq!(reparsed.minimum_key_length, policy.minimum_key_length);
    }
}
