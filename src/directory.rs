// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Directory-service collaborator contract.
//!
//! The engine never talks LDAP itself; the host supplies an implementation
//! of [`DirectoryService`] and the engine converts every lookup failure into
//! a denial rather than propagating a fault out of the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// `userAccountControl` bit marking a disabled account.
pub const UF_ACCOUNT_DISABLE: u32 = 0x2;

/// Directory object category to search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectCategory {
    /// Computer accounts.
    #[default]
    Computer,
    /// User accounts.
    User,
}

impl ObjectCategory {
    /// The directory category name used in queries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Computer => "computer",
            Self::User => "user",
        }
    }
}

/// Errors a directory lookup can report.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No object matched the identity value.
    #[error("No {category} object found where {attribute} is '{value}'")]
    NotFound {
        /// Object category searched.
        category: String,
        /// Attribute searched on.
        attribute: String,
        /// Identity value searched for.
        value: String,
    },

    /// More than one object matched the identity value.
    #[error("The {attribute} value '{value}' matched more than one object")]
    Ambiguous {
        /// Attribute searched on.
        attribute: String,
        /// Identity value searched for.
        value: String,
    },

    /// The directory could not be queried at all.
    #[error("Directory query failed: {0}")]
    Query(String),
}

/// The directory object a successful lookup returns.
#[derive(Debug, Clone, Default)]
pub struct DirectoryObject {
    /// Distinguished name of the object.
    pub distinguished_name: String,

    /// Raw `userAccountControl` flags.
    pub user_account_control: u32,

    /// Distinguished names of the groups the object belongs to.
    pub member_of: Vec<String>,

    /// Arbitrary attribute map (single-valued attributes).
    pub attributes: HashMap<String, String>,

    /// Security identifier (SID) string, if the object carries one.
    pub security_identifier: Option<String>,

    /// Service principal names registered on the object.
    pub service_principal_names: Vec<String>,

    /// When the account password was last set.
    pub password_last_set: Option<DateTime<Utc>>,
}

impl DirectoryObject {
    /// Whether the account is enabled.
    pub fn is_enabled(&self) -> bool {
        self.user_account_control & UF_ACCOUNT_DISABLE == 0
    }

    /// Look up an attribute value by name, case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the object is a member of the named group (compared
    /// case-insensitively against the group's distinguished name).
    pub fn is_member_of(&self, group_dn: &str) -> bool {
        self.member_of
            .iter()
            .any(|g| g.eq_ignore_ascii_case(group_dn))
    }
}

/// Host-provided directory lookup.
///
/// Implementations are synchronous, blocking calls; the engine exposes no
/// timeout or cancellation of its own.
pub trait DirectoryService: Send + Sync {
    /// Find the object where `attribute` equals `value`, constrained to
    /// `category` and optionally to the subtree under `search_root`.
    fn search(
        &self,
        attribute: &str,
        value: &str,
        category: ObjectCategory,
        search_root: Option<&str>,
    ) -> Result<DirectoryObject, DirectoryError>;
}
