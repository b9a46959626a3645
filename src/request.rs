// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! The decoded certificate request record.
//!
//! The issuance host parses the raw PKCS#10/CMC/PKCS#7 request and its
//! database record before calling the engine; this module only defines the
//! data contract the engine consumes. No ASN.1 appears here.

use crate::dn::NameField;
use const_oid::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known SAN type names as they appear in [`NameField::name`].
pub mod san {
    /// DNS name entry.
    pub const DNS_NAME: &str = "dNSName";
    /// IP address entry.
    pub const IP_ADDRESS: &str = "iPAddress";
    /// RFC 822 email entry.
    pub const RFC822_NAME: &str = "rfc822Name";
    /// User principal name entry.
    pub const USER_PRINCIPAL_NAME: &str = "userPrincipalName";
    /// URI entry.
    pub const URI: &str = "uniformResourceIdentifier";
}

/// Well-known request attribute names.
pub mod attributes {
    /// Cryptographic provider that generated the key, as reported by the
    /// enrollment client.
    pub const CSP_PROVIDER: &str = "RequestCSPProvider";
    /// Requested certificate validity start date.
    pub const START_DATE: &str = "StartDate";
    /// Inline subject-alternative-name request attribute.
    pub const SAN: &str = "san";
    /// Requesting process name from the inline client information.
    pub const PROCESS_NAME: &str = "ProcessName";
}

/// Public key algorithm family of the request's key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithmFamily {
    /// RSA keys.
    #[default]
    Rsa,
    /// Elliptic curve keys.
    Ecc,
    /// DSA keys.
    Dsa,
}

impl KeyAlgorithmFamily {
    /// Short name for logging and denial messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Ecc => "ECC",
            Self::Dsa => "DSA",
        }
    }
}

/// Upstream issue/pending/deny outcome from the CA's own validation,
/// passed through and potentially downgraded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// The CA would issue the certificate.
    #[default]
    Issue,
    /// The request is parked for manual approval.
    Pending,
    /// The CA already denied the request.
    Deny,
}

/// A decoded certificate request plus the template facts the engine needs.
///
/// Construction is entirely up to the host; every field is plain data.
#[derive(Debug, Clone, Default)]
pub struct CertificateRequest {
    /// Request identifier in the CA database.
    pub request_id: u32,

    /// Key algorithm family of the public key.
    pub key_algorithm: KeyAlgorithmFamily,

    /// Public key length in bits.
    pub key_length: u32,

    /// Raw SubjectPublicKeyInfo bytes, as decoded by the host. The engine
    /// never parses these; they are carried for host-side logging.
    pub public_key: Vec<u8>,

    /// Ordered subject RDN pairs (long-form attribute names).
    pub subject: Vec<NameField>,

    /// Ordered subject-alternative-name entries.
    pub subject_alternative_names: Vec<NameField>,

    /// Certificate-level request extensions, raw DER payload per OID.
    pub extensions: HashMap<ObjectIdentifier, Vec<u8>>,

    /// Request attributes (name to value); looked up case-insensitively.
    pub attributes: HashMap<String, String>,

    /// Whether the certificate template lets the enrollee supply the
    /// subject. When false, the CA builds the subject from the directory.
    pub enrollee_supplies_subject: bool,

    /// Whether the template is machine-scoped (as opposed to user-scoped).
    pub machine_template: bool,

    /// The CA's own disposition before policy evaluation.
    pub disposition: Disposition,
}

impl CertificateRequest {
    /// Look up a request attribute by name, case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All subject values for a given RDN type (case-insensitive).
    pub fn subject_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.subject
            .iter()
            .filter(move |f| f.is_named(name))
            .map(|f| f.value.as_str())
    }

    /// All SAN values of a given type (case-insensitive).
    pub fn san_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.subject_alternative_names
            .iter()
            .filter(move |f| f.is_named(name))
            .map(|f| f.value.as_str())
    }

    /// Whether the request carries a SAN entry with the given type and
    /// value (both compared case-insensitively).
    pub fn has_san(&self, name: &str, value: &str) -> bool {
        self.subject_alternative_names
            .iter()
            .any(|f| f.is_named(name) && f.value.eq_ignore_ascii_case(value))
    }

    /// The first commonName in the subject, if any.
    pub fn common_name(&self) -> Option<&str> {
        self.subject_values("commonName").next()
    }
}
