//! Mapping of roles granted by a remote cluster onto local roles.
//!
//! A [`RoleMapping`] matches remote role names with one of:
//!
//! - an exact name (`admin`),
//! - a glob where `*` matches any run of characters (`dev-*`),
//! - an anchored regular expression (`^team-(.*)$`).
//!
//! Local role templates may reference capture groups with `$1`, `$2`, …;
//! each `*` in a glob is a capture group.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AuthorityError, AuthorityResult};

/// Maps one remote role pattern to local roles.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleMapping {
    /// Remote role name, glob, or anchored regular expression.
    pub remote: String,
    /// Local role templates granted on match.
    pub local: Vec<String>,
}

impl RoleMapping {
    /// Creates a mapping.
    pub fn new(remote: impl Into<String>, local: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { remote: remote.into(), local: local.into_iter().map(Into::into).collect() }
    }

    fn compile(&self) -> AuthorityResult<Regex> {
        let pattern = if self.remote.starts_with('^') && self.remote.ends_with('$') {
            self.remote.clone()
        } else {
            let globbed = self.remote.split('*').map(regex::escape).collect::<Vec<_>>().join("(.*)");
            format!("^{globbed}$")
        };
        Regex::new(&pattern).map_err(|e| {
            AuthorityError::validation(format!("invalid role map pattern {:?}: {e}", self.remote))
        })
    }
}

/// Ordered list of role mappings for a trusted cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleMap(pub Vec<RoleMapping>);

impl RoleMap {
    /// Returns `true` when no mappings are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that every mapping has a remote pattern that compiles and at
    /// least one non-empty local role.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Validation`] describing the first bad mapping.
    pub fn check(&self) -> AuthorityResult<()> {
        for mapping in &self.0 {
            if mapping.remote.is_empty() {
                return Err(AuthorityError::validation("role map entry has an empty remote role"));
            }
            if mapping.local.is_empty() || mapping.local.iter().any(String::is_empty) {
                return Err(AuthorityError::validation(format!(
                    "role map entry {:?} must name at least one non-empty local role",
                    mapping.remote
                )));
            }
            mapping.compile()?;
        }
        Ok(())
    }

    /// Maps `remote_roles` to local roles.
    ///
    /// The result is sorted and deduplicated. Templates that expand to an
    /// empty string are dropped. Callers mapping repeatedly should
    /// [`compile`](Self::compile) once and reuse the result.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Validation`] when a pattern does not compile.
    pub fn map<S: AsRef<str>>(&self, remote_roles: &[S]) -> AuthorityResult<Vec<String>> {
        Ok(self.compile()?.map(remote_roles))
    }

    /// Compiles every pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorityError::Validation`] for the first pattern that
    /// does not compile.
    pub fn compile(&self) -> AuthorityResult<CompiledRoleMap> {
        let rules = self
            .0
            .iter()
            .map(|mapping| Ok((mapping.compile()?, mapping.local.clone())))
            .collect::<AuthorityResult<_>>()?;
        Ok(CompiledRoleMap { rules })
    }
}

/// A [`RoleMap`] with its patterns compiled.
#[derive(Clone, Debug)]
pub struct CompiledRoleMap {
    rules: Vec<(Regex, Vec<String>)>,
}

impl CompiledRoleMap {
    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when there are no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Maps `remote_roles` to local roles, sorted and deduplicated.
    #[must_use]
    pub fn map<S: AsRef<str>>(&self, remote_roles: &[S]) -> Vec<String> {
        let mut local = BTreeSet::new();
        for (re, templates) in &self.rules {
            for role in remote_roles.iter().map(AsRef::as_ref) {
                if !re.is_match(role) {
                    continue;
                }
                for template in templates {
                    let expanded = re.replace(role, template.as_str());
                    if !expanded.is_empty() {
                        local.insert(expanded.into_owned());
                    }
                }
            }
        }
        local.into_iter().collect()
    }
}
