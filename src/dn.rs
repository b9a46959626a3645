// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Distinguished-name parsing.
//!
//! Splits an X.500 distinguished name string into ordered
//! `(attribute-type, value)` pairs, honoring quoting and backslash escaping,
//! and normalizes short attribute aliases (`CN`, `OU`, ...) to their
//! long-form names.
//!
//! An empty input yields an empty list rather than an error: a request
//! without a subject is a legal state for templates where the enrollee does
//! not supply the subject.

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};

/// One named identity component: a subject RDN or a SAN entry.
///
/// Ordering is preserved by the containing list and uniqueness is not
/// assumed; a field may legally repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameField {
    /// Attribute type (long form, e.g. `commonName`) or SAN type
    /// (e.g. `dNSName`).
    pub name: String,
    /// The attribute value.
    pub value: String,
}

impl NameField {
    /// Create a new name field.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive comparison against a field name.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Split `input` on `delimiter`, honoring quoted spans and backslash escapes.
///
/// A `"` that is not preceded by `\` toggles quoted state; the delimiter only
/// separates when outside quotes. Escape sequences are carried through to the
/// output verbatim. Ending the string inside a quoted span, or with a
/// dangling escape, is a format error.
pub fn split_unquoted(input: &str, delimiter: char) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            match chars.next() {
                Some(escaped) => current.push(escaped),
                None => {
                    return Err(PolicyError::dn_format("dangling escape at end of input"));
                }
            }
            continue;
        }
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
            continue;
        }
        if c == delimiter && !in_quotes {
            parts.push(current);
            current = String::new();
            continue;
        }
        current.push(c);
    }

    if in_quotes {
        return Err(PolicyError::dn_format("unterminated quoted value"));
    }

    parts.push(current);
    Ok(parts)
}

/// Parse a distinguished name into ordered `(type, value)` pairs.
///
/// Components are separated by unquoted commas; each component is split once
/// at its first unquoted `=`. A component without exactly one unquoted `=`,
/// or with an empty attribute type after trimming, is a format error.
/// Surrounding quotes on a value are stripped and doubled quotes inside a
/// quoted value collapse to one literal quote. Attribute types are
/// normalized via [`long_form`].
pub fn parse(dn: &str) -> Result<Vec<NameField>> {
    let dn = dn.trim();
    if dn.is_empty() {
        return Ok(Vec::new());
    }

    let mut fields = Vec::new();
    for component in split_unquoted(dn, ',')? {
        let parts = split_unquoted(&component, '=')?;
        if parts.len() != 2 {
            return Err(PolicyError::dn_format(format!(
                "component '{}' does not have the form type=value",
                component.trim()
            )));
        }

        let attribute_type = parts[0].trim();
        if attribute_type.is_empty() {
            return Err(PolicyError::dn_format(format!(
                "component '{}' has an empty attribute type",
                component.trim()
            )));
        }

        fields.push(NameField::new(
            long_form(attribute_type),
            unquote(parts[1].trim()),
        ));
    }

    Ok(fields)
}

/// Strip surrounding quotes from a value and collapse doubled quotes.
fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].replace("\"\"", "\"")
    } else {
        value.to_string()
    }
}

/// Substitute a short attribute-type alias with its long-form name.
///
/// Unrecognized types pass through unchanged, preserving their original
/// spelling.
pub fn long_form(attribute_type: &str) -> String {
    match attribute_type.to_ascii_uppercase().as_str() {
        "CN" => "commonName".to_string(),
        "C" => "countryName".to_string(),
        "DC" => "domainComponent".to_string(),
        "E" => "emailAddress".to_string(),
        "G" | "GN" => "givenName".to_string(),
        "I" => "initials".to_string(),
        "L" => "localityName".to_string(),
        "O" => "organizationName".to_string(),
        "OU" => "organizationalUnitName".to_string(),
        "S" | "ST" => "stateOrProvinceName".to_string(),
        "SERIALNUMBER" => "serialNumber".to_string(),
        "SN" => "surname".to_string(),
        "STREET" => "streetAddress".to_string(),
        "T" => "title".to_string(),
        "UID" => "userId".to_string(),
        _ => attribute_type.to_string(),
    }
}
