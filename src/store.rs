// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Policy document storage and caching.
//!
//! Policies live as TOML files in one directory, one file per certificate
//! template name (sanitized of filesystem-invalid characters). The cache is
//! a concurrent map keyed by template name; each read compares the backing
//! file's modification time and reloads on change. Concurrent evaluations
//! may race to reload, but reloading is idempotent and every reader
//! converges on an immutable snapshot consistent with disk.
//!
//! A missing or undeserializable file surfaces as "no policy" (`None`),
//! never as a pass.

use crate::error::Result;
use crate::policy::PolicyDocument;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Characters that cannot appear in a policy file name.
const INVALID_FILE_NAME_CHARS: &[char] =
    &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace filesystem-invalid characters in a template name with `_`.
pub fn sanitize_file_name(template: &str) -> String {
    template
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[derive(Clone)]
struct CacheEntry {
    modified: SystemTime,
    policy: Arc<PolicyDocument>,
}

/// On-disk policy store with a per-template concurrent cache.
pub struct PolicyStore {
    directory: PathBuf,
    cache: DashMap<String, CacheEntry>,
}

impl PolicyStore {
    /// Create a store over `directory`. The directory does not need to
    /// exist yet; templates without a file simply have no policy.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            cache: DashMap::new(),
        }
    }

    /// The file path a template's policy is read from.
    pub fn policy_path(&self, template: &str) -> PathBuf {
        self.directory
            .join(format!("{}.toml", sanitize_file_name(template)))
    }

    /// Fetch the policy for `template`, reloading from disk when the file
    /// changed since the cached copy was read.
    ///
    /// Returns `None` when there is no policy file or the file does not
    /// deserialize/validate; the caller decides whether that denies or
    /// passes the request.
    pub fn policy_for(&self, template: &str) -> Option<Arc<PolicyDocument>> {
        let path = self.policy_path(template);

        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                debug!(template, path = %path.display(), "no policy file");
                self.cache.remove(template);
                return None;
            }
        };

        if let Some(entry) = self.cache.get(template) {
            if entry.modified == modified {
                return Some(Arc::clone(&entry.policy));
            }
        }

        match Self::load(&path) {
            Ok(policy) => {
                let policy = Arc::new(policy);
                debug!(template, path = %path.display(), "loaded policy document");
                self.cache.insert(
                    template.to_string(),
                    CacheEntry {
                        modified,
                        policy: Arc::clone(&policy),
                    },
                );
                Some(policy)
            }
            Err(e) => {
                warn!(template, path = %path.display(), error = %e, "failed to load policy document");
                self.cache.remove(template);
                None
            }
        }
    }

    fn load(path: &Path) -> Result<PolicyDocument> {
        let content = std::fs::read_to_string(path)?;
        let policy = PolicyDocument::from_toml(&content)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Number of cached policy snapshots.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
