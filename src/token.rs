// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Token substitution for outbound subject, SAN, and URI templates.
//!
//! Templates reference source data as `{namespace:token}`, for example
//! `{ad:dNSHostName}` or `{vendor:serialnumber}`. Each namespace is expanded
//! in its own pass; the output of one pass feeds the next, so a single
//! template may reference several namespaces. Tokens from namespaces other
//! than the one being expanded are left in place for a later pass.
//!
//! A template referencing a token that is absent from the source data fails
//! with [`PolicyError::UnknownToken`]; the caller decides whether that skips
//! the owning rule or denies the request.

use crate::error::{PolicyError, Result};

/// Expand every `{namespace:token}` reference in `template` against
/// `pairs`.
///
/// Namespace and token lookup are both case-insensitive. Literal text,
/// braces that do not form a token reference, and references to other
/// namespaces pass through unchanged.
///
/// # Examples
///
/// ```
/// use usg_ca_policy::token::expand;
///
/// let pairs = vec![("cn".to_string(), "host01".to_string())];
/// let out = expand("{ad:CN}.example.com", "ad", &pairs).unwrap();
/// assert_eq!(out, "host01.example.com");
/// ```
pub fn expand(template: &str, namespace: &str, pairs: &[(String, String)]) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    // Find all {...} spans and replace the ones addressed to this namespace.
    while let Some(open) = result[start..].find('{') {
        let open = start + open;

        let close = match result[open..].find('}') {
            Some(offset) => open + offset,
            None => break,
        };

        let body = &result[open + 1..close];
        let (ns, token) = match body.split_once(':') {
            Some(parts) => parts,
            None => {
                // Not a token reference; leave the braces alone.
                start = close + 1;
                continue;
            }
        };

        if !ns.eq_ignore_ascii_case(namespace) {
            // Another namespace's token; a later pass will handle it.
            start = close + 1;
            continue;
        }

        let value = pairs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(token))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| PolicyError::unknown_token(namespace, token))?;

        result.replace_range(open..close + 1, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Expand several namespaces in sequence, each pass consuming the previous
/// pass's output.
pub fn expand_all(template: &str, sources: &[(&str, &[(String, String)])]) -> Result<String> {
    let mut result = template.to_string();
    for (namespace, pairs) in sources {
        result = expand(&result, namespace, pairs)?;
    }
    Ok(result)
}
