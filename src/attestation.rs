// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Hardware attestation data and policy matching.
//!
//! Security tokens embed attestation certificates in the request as
//! extensions. Decoding those certificates is the host's job (see
//! [`AttestationDecoder`]); this module matches the decoded device
//! attributes against an ordered list of [`AttestationRule`]s.
//!
//! # Rule semantics
//!
//! Rules are evaluated in order. The first matching deny rule denies
//! immediately; a match against any allow rule passes. When nothing
//! matches: if every configured rule is a deny rule the device passes
//! (the list is an exclusion list), otherwise the device is denied for not
//! matching any allow rule.

use crate::error::Result;
use crate::pattern::PatternAction;
use crate::request::KeyAlgorithmFamily;
use const_oid::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Device firmware version, ordered numerically per component.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct FirmwareVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch level.
    pub patch: u8,
}

impl FirmwareVersion {
    /// Create a version from its components.
    pub fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for FirmwareVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = |name: &str| {
            parts
                .next()
                .ok_or_else(|| format!("missing {name} component in '{s}'"))?
                .parse::<u8>()
                .map_err(|_| format!("invalid {name} component in '{s}'"))
        };
        let version = Self {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        };
        if parts.next().is_some() {
            return Err(format!("too many components in '{s}'"));
        }
        Ok(version)
    }
}

impl TryFrom<String> for FirmwareVersion {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FirmwareVersion> for String {
    fn from(v: FirmwareVersion) -> Self {
        v.to_string()
    }
}

/// PIN policy burned into the attested key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinPolicy {
    /// PIN is never required.
    Never,
    /// PIN is required once per session.
    Once,
    /// PIN is required for every operation.
    Always,
}

/// Touch policy burned into the attested key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TouchPolicy {
    /// Touch is never required.
    Never,
    /// Touch is required for every operation.
    Always,
    /// Touch is cached for a short window.
    Cached,
}

/// Physical form factor of the attested device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormFactor {
    /// USB-A keychain.
    UsbAKeychain,
    /// USB-A nano.
    UsbANano,
    /// USB-C keychain.
    UsbCKeychain,
    /// USB-C nano.
    UsbCNano,
    /// USB-C with Lightning.
    UsbCLightning,
    /// USB-A biometric keychain.
    UsbABiometricKeychain,
    /// USB-C biometric keychain.
    UsbCBiometricKeychain,
    /// Form factor not reported.
    Unknown,
}

/// Device edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceEdition {
    /// Standard edition.
    Standard,
    /// FIPS-certified edition.
    Fips,
    /// CSPN-certified edition.
    Cspn,
}

/// Decoded attributes of the attested device and key slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Device firmware version.
    pub firmware: FirmwareVersion,
    /// Device serial number, when reported.
    pub serial_number: Option<u32>,
    /// PIN policy of the attested slot.
    pub pin_policy: PinPolicy,
    /// Touch policy of the attested slot.
    pub touch_policy: TouchPolicy,
    /// Physical form factor.
    pub form_factor: FormFactor,
    /// Key algorithm family of the attested key.
    pub key_algorithm: KeyAlgorithmFamily,
    /// Device edition.
    pub edition: DeviceEdition,
}

impl DeviceProfile {
    /// The device attributes as token-substitution pairs for the `vendor`
    /// namespace.
    pub fn token_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("firmwareversion".to_string(), self.firmware.to_string())];
        if let Some(serial) = self.serial_number {
            pairs.push(("serialnumber".to_string(), serial.to_string()));
        }
        pairs
    }
}

/// One entry of the attestation policy list.
///
/// Empty constraint lists match any value; `None` bounds are open-ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestationRule {
    /// Whether a match allows or denies the device.
    #[serde(default)]
    pub action: PatternAction,

    /// Lowest acceptable firmware version, inclusive.
    #[serde(default)]
    pub minimum_firmware: Option<FirmwareVersion>,

    /// Highest acceptable firmware version, inclusive.
    #[serde(default)]
    pub maximum_firmware: Option<FirmwareVersion>,

    /// Acceptable PIN policies; empty matches any.
    #[serde(default)]
    pub pin_policies: Vec<PinPolicy>,

    /// Acceptable touch policies; empty matches any.
    #[serde(default)]
    pub touch_policies: Vec<TouchPolicy>,

    /// Acceptable form factors; empty matches any.
    #[serde(default)]
    pub form_factors: Vec<FormFactor>,

    /// Acceptable key algorithm families; empty matches any.
    #[serde(default)]
    pub key_algorithms: Vec<KeyAlgorithmFamily>,

    /// Acceptable device editions; empty matches any.
    #[serde(default)]
    pub editions: Vec<DeviceEdition>,
}

impl AttestationRule {
    /// Whether the device profile satisfies every constraint of this rule.
    pub fn matches(&self, profile: &DeviceProfile) -> bool {
        if let Some(min) = self.minimum_firmware {
            if profile.firmware < min {
                return false;
            }
        }
        if let Some(max) = self.maximum_firmware {
            if profile.firmware > max {
                return false;
            }
        }
        if !self.pin_policies.is_empty() && !self.pin_policies.contains(&profile.pin_policy) {
            return false;
        }
        if !self.touch_policies.is_empty() && !self.touch_policies.contains(&profile.touch_policy)
        {
            return false;
        }
        if !self.form_factors.is_empty() && !self.form_factors.contains(&profile.form_factor) {
            return false;
        }
        if !self.key_algorithms.is_empty()
            && !self.key_algorithms.contains(&profile.key_algorithm)
        {
            return false;
        }
        if !self.editions.is_empty() && !self.editions.contains(&profile.edition) {
            return false;
        }
        true
    }
}

/// Outcome of matching a device against the configured rule list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationOutcome {
    /// The device is acceptable.
    Pass,
    /// The device is denied, with a reason.
    Deny(String),
}

/// Match `profile` against `rules` in order.
///
/// Invariant: a rule list containing only deny rules is an exclusion list;
/// a device matching none of them passes.
pub fn evaluate(profile: &DeviceProfile, rules: &[AttestationRule]) -> AttestationOutcome {
    for (index, rule) in rules.iter().enumerate() {
        if rule.matches(profile) {
            return match rule.action {
                PatternAction::Deny => AttestationOutcome::Deny(format!(
                    "The attested device (firmware {}) matches deny rule {} of the attestation policy.",
                    profile.firmware,
                    index + 1
                )),
                PatternAction::Allow => AttestationOutcome::Pass,
            };
        }
    }

    let all_deny = rules.iter().all(|r| r.action == PatternAction::Deny);
    if rules.is_empty() || all_deny {
        AttestationOutcome::Pass
    } else {
        AttestationOutcome::Deny(format!(
            "The attested device (firmware {}) does not match any allow rule of the attestation policy.",
            profile.firmware
        ))
    }
}

/// Host-provided decoder for attestation certificates embedded in the
/// request's extension map.
///
/// Returns `Ok(None)` when the request carries no attestation data; absence
/// is not an error.
pub trait AttestationDecoder: Send + Sync {
    /// Decode the attestation statement, if present.
    fn decode(
        &self,
        extensions: &HashMap<ObjectIdentifier, Vec<u8>>,
    ) -> Result<Option<DeviceProfile>>;
}
