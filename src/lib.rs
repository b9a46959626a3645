// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # usg-ca-policy
//!
//! A policy decision engine for certificate issuance.
//!
//! The engine sits between a certification authority and its default
//! template handling: the CA hands over the decoded certificate request and
//! its own preliminary disposition, and the engine evaluates the request
//! against a declarative per-template policy document, returning a verdict
//! that either confirms issuance (possibly with content mutations) or denies
//! it with human-readable reasons and a host status code.
//!
//! ## Features
//!
//! - **Declarative TOML policies**, one document per certificate template,
//!   hot-reloaded on file change
//! - **Subject and SAN content rules** with allow/deny patterns (regex,
//!   exact match, CIDR)
//! - **Directory binding**: map the enrollee to a directory object and
//!   enforce account, group, OU and attribute constraints
//! - **Hardware attestation** rules over decoded device profiles
//! - **Content synthesis**: outbound subject/SAN fields and extension URIs
//!   built from `{ad:...}`, `{vendor:...}`, `{sdn:...}` and `{san:...}`
//!   tokens
//! - **Audit-only mode** that reports violations without enforcing them
//!
//! ## Quick Start
//!
//! ```no_run
//! use usg_ca_policy::{CertificateRequest, EngineOptions, PolicyEngine, PolicyStore};
//! use chrono::{Duration, Utc};
//!
//! let store = PolicyStore::new("/etc/ca-policy");
//! let engine = PolicyEngine::new(store, EngineOptions::default());
//!
//! let request = CertificateRequest {
//!     request_id: 4711,
//!     key_length: 2048,
//!     enrollee_supplies_subject: true,
//!     ..Default::default()
//! };
//!
//! let verdict = engine.evaluate(
//!     "WebServer",
//!     &request,
//!     Utc::now(),
//!     Utc::now() + Duration::days(365),
//! );
//! if verdict.is_denied() {
//!     for reason in &verdict.description {
//!         eprintln!("denied: {reason}");
//!     }
//! }
//! ```
//!
//! ## Collaborators
//!
//! The engine never speaks LDAP or produces ASN.1. Hosts that want the
//! directory, attestation, or extension features supply implementations of
//! [`DirectoryService`](directory::DirectoryService),
//! [`AttestationDecoder`](attestation::AttestationDecoder) and
//! [`ExtensionEncoder`](pipeline::ExtensionEncoder) via the
//! [`PolicyEngine`] builder methods. Without them the engine still runs;
//! policies requiring a missing collaborator deny (or warn, where the
//! feature is optional) instead of failing.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod attestation;
pub mod directory;
pub mod dn;
pub mod error;
pub mod oids;
pub mod pattern;
pub mod pipeline;
pub mod policy;
pub mod request;
pub mod rules;
pub mod store;
pub mod token;
pub mod verdict;

// Re-export main types at crate root for convenience
pub use dn::NameField;
pub use error::{PolicyError, Result};
pub use pattern::{MatchKind, Pattern, PatternAction};
pub use pipeline::{EngineOptions, ExtensionEncoder, NoPolicyAction, PolicyEngine};
pub use policy::PolicyDocument;
pub use request::{CertificateRequest, Disposition, KeyAlgorithmFamily};
pub use rules::SubjectRule;
pub use store::PolicyStore;
pub use verdict::{StatusCode, ValidationResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
