// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Object identifiers used by the policy engine.
//!
//! Only the identifiers the engine itself inspects or schedules are listed
//! here; everything else in a request's extension map passes through opaque.

use const_oid::ObjectIdentifier;

/// Microsoft security identifier certificate extension (szOID_NTDS_CA_SECURITY_EXT).
pub const SECURITY_IDENTIFIER: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.25.2");

/// CRL distribution points extension.
pub const CRL_DISTRIBUTION_POINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.31");

/// Authority information access extension.
pub const AUTHORITY_INFO_ACCESS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.1");

/// YubiKey PIV attestation statement extension (attestation certificate
/// carrier). Host-side [`AttestationDecoder`](crate::attestation::AttestationDecoder)
/// implementations read the statement from this entry of the request's
/// extension map.
pub const YUBIKEY_ATTESTATION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.41482.3.11");
