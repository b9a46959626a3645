// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! The accumulated evaluation verdict.
//!
//! A [`ValidationResult`] is created once per request at pipeline entry,
//! threaded through every validator stage, and consumed by the issuance host
//! after the pipeline completes. The denial flag is monotonic: once a stage
//! denies, later stages see the denial and pass through. The single
//! exception is the audit-mode branch at the end of the pipeline, which
//! reports the would-be denial but restores the upstream disposition.

use crate::dn::NameField;
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;

/// Sentinel status codes the issuance host contract mandates.
///
/// The numeric values are the host's HRESULT-style codes; the engine treats
/// them as opaque sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCode {
    /// The request passed policy.
    #[default]
    Success,
    /// Generic policy failure.
    GenericFailure,
    /// Key length outside the permitted range.
    KeyLength,
    /// Subject or SAN content violates policy.
    InvalidName,
    /// The template's policy denies issuance outright.
    TemplateDenied,
    /// A requested validity date is malformed or out of range.
    InvalidTime,
}

impl StatusCode {
    /// The numeric code reported to the issuance host.
    pub fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::GenericFailure => 0x8009_0020,
            Self::KeyLength => 0x8009_4811,
            Self::InvalidName => 0x8009_4001,
            Self::TemplateDenied => 0x8009_4012,
            Self::InvalidTime => 0x8007_076D,
        }
    }

    /// Short name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::GenericFailure => "generic-failure",
            Self::KeyLength => "key-length",
            Self::InvalidName => "invalid-name",
            Self::TemplateDenied => "template-denied",
            Self::InvalidTime => "invalid-time",
        }
    }
}

/// One certificate extension the host must set on the issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionUpdate {
    /// Extension object identifier.
    pub oid: ObjectIdentifier,
    /// Raw DER payload, produced by the host-side encoder.
    pub value: Vec<u8>,
    /// Whether the extension is marked critical.
    pub critical: bool,
}

/// Mutable verdict accumulator for one certificate request evaluation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    denied_for_issuance: bool,
    status_code: StatusCode,
    audit_only: bool,
    audit_downgraded: bool,

    /// Ordered human-readable denial reasons, append-only.
    pub description: Vec<String>,

    /// Non-fatal warnings for host logging.
    pub warnings: Vec<String>,

    /// Certificate validity start, possibly adjusted by policy.
    pub not_before: DateTime<Utc>,

    /// Certificate validity end, possibly shortened by policy.
    pub not_after: DateTime<Utc>,

    /// Extensions the host must set.
    pub extensions_to_set: Vec<ExtensionUpdate>,

    /// Extension OIDs the host must remove from the request.
    pub extensions_to_disable: Vec<ObjectIdentifier>,

    /// Certificate properties the host must set (e.g. `Subject.CommonName`).
    pub properties_to_set: Vec<(String, String)>,

    /// Certificate property names the host must clear.
    pub properties_to_disable: Vec<String>,

    /// SAN entries to add to the issued certificate. The host encodes these
    /// into the subject-alternative-name extension.
    pub san_to_add: Vec<NameField>,
}

impl ValidationResult {
    /// Create a fresh verdict. `audit_only` is copied from the policy
    /// document and is immutable for the lifetime of the evaluation.
    pub fn new(audit_only: bool, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        Self {
            denied_for_issuance: false,
            status_code: StatusCode::Success,
            audit_only,
            audit_downgraded: false,
            description: Vec::new(),
            warnings: Vec::new(),
            not_before,
            not_after,
            extensions_to_set: Vec::new(),
            extensions_to_disable: Vec::new(),
            properties_to_set: Vec::new(),
            properties_to_disable: Vec::new(),
            san_to_add: Vec::new(),
        }
    }

    /// Whether issuance is denied.
    pub fn is_denied(&self) -> bool {
        self.denied_for_issuance
    }

    /// Whether the policy runs in audit-only mode.
    pub fn audit_only(&self) -> bool {
        self.audit_only
    }

    /// Whether a logical denial was downgraded by the audit-mode branch.
    pub fn was_audit_downgraded(&self) -> bool {
        self.audit_downgraded
    }

    /// The current status code.
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// Deny issuance with the generic failure code.
    pub fn deny(&mut self, reason: impl Into<String>) {
        self.deny_with_code(StatusCode::GenericFailure, reason);
    }

    /// Deny issuance with a specific sentinel code.
    ///
    /// The first code to arrive sticks; later denials only append their
    /// reason.
    pub fn deny_with_code(&mut self, code: StatusCode, reason: impl Into<String>) {
        self.denied_for_issuance = true;
        if self.status_code == StatusCode::Success {
            self.status_code = code;
        }
        self.description.push(reason.into());
    }

    /// Record a non-fatal warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Schedule an extension to be set on the issued certificate.
    pub fn add_extension(&mut self, oid: ObjectIdentifier, value: Vec<u8>, critical: bool) {
        self.extensions_to_set.push(ExtensionUpdate {
            oid,
            value,
            critical,
        });
    }

    /// Schedule an extension for removal.
    pub fn disable_extension(&mut self, oid: ObjectIdentifier) {
        if !self.extensions_to_disable.contains(&oid) {
            self.extensions_to_disable.push(oid);
        }
    }

    /// Schedule a certificate property to be set.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties_to_set.push((name.into(), value.into()));
    }

    /// Look up a scheduled property value by name (case-insensitive).
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties_to_set
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add a SAN entry unless an identical one is already scheduled.
    pub fn add_san(&mut self, field: NameField) {
        let duplicate = self.san_to_add.iter().any(|existing| {
            existing.is_named(&field.name) && existing.value.eq_ignore_ascii_case(&field.value)
        });
        if !duplicate {
            self.san_to_add.push(field);
        }
    }

    /// Audit-mode branch: report the logical denial but restore the
    /// upstream disposition so issuance proceeds.
    ///
    /// This is the only point where the denial flag is cleared. The
    /// description list is left intact for logging.
    pub fn downgrade_for_audit(&mut self) {
        debug_assert!(self.audit_only && self.denied_for_issuance);
        self.denied_for_issuance = false;
        self.status_code = StatusCode::Success;
        self.audit_downgraded = true;
        self.warnings.push(
            "Audit mode: the request violates policy and would have been denied.".to_string(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn verdict(audit: bool) -> ValidationResult {
        let nb = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let na = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        ValidationResult::new(audit, nb, na)
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StatusCode::Success.code(), 0);
        assert_eq!(StatusCode::GenericFailure.code(), 0x8009_0020);
        assert_eq!(StatusCode::KeyLength.code(), 0x8009_4811);
        assert_eq!(StatusCode::InvalidName.code(), 0x8009_4001);
        assert_eq!(StatusCode::TemplateDenied.code(), 0x8009_4012);
        assert_eq!(StatusCode::InvalidTime.code(), 0x8007_076D);
    }

    #[test]
    fn test_first_specific_code_sticks() {
        let mut v = verdict(false);
        v.deny_with_code(StatusCode::KeyLength, "key too small");
        v.deny("something else");
        assert!(v.is_denied());
        assert_eq!(v.status_code(), StatusCode::KeyLength);
        assert_eq!(v.description.len(), 2);
    }

    #[test]
    fn test_generic_deny_sets_generic_code() {
        let mut v = verdict(false);
        v.deny("reason");
        assert_eq!(v.status_code(), StatusCode::GenericFailure);
    }

    #[test]
    fn test_audit_downgrade_keeps_description() {
        let mut v = verdict(true);
        v.deny("would deny");
        v.downgrade_for_audit();
        assert!(!v.is_denied());
        assert_eq!(v.status_code(), StatusCode::Success);
        assert!(v.was_audit_downgraded());
        assert_eq!(v.description, vec!["would deny".to_string()]);
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn test_add_san_deduplicates() {
        let mut v = verdict(false);
        v.add_san(NameField::new("dNSName", "host.example.com"));
        v.add_san(NameField::new("dNSName", "HOST.EXAMPLE.COM"));
        v.add_san(NameField::new("dNSName", "other.example.com"));
        assert_eq!(v.san_to_add.len(), 2);
    }

    #[test]
    fn test_disable_extension_deduplicates() {
        let mut v = verdict(false);
        v.disable_extension(crate::oids::SECURITY_IDENTIFIER);
        v.disable_extension(crate::oids::SECURITY_IDENTIFIER);
        assert_eq!(v.extensions_to_disable.len(), 1);
    }

    #[test]
    fn test_property_lookup_is_case_insensitive() {
        let mut v = verdict(false);
        v.set_property("Subject.CommonName", "host.example.com");
        assert_eq!(v.property("subject.commonname"), Some("host.example.com"));
        assert_eq!(v.property("Subject.Organization"), None);
    }
}
