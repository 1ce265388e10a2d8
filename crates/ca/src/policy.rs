//! Per-type key cardinality rules used by the validator.
//!
//! Each authority type constrains how many **active** key pairs it holds for
//! each signing purpose. The built-in rules are:
//!
//! | Type | SSH | TLS | JWT |
//! |------|-----|-----|-----|
//! | `host`, `user` | ≥ 1 | ≥ 1 | any |
//! | `db`, `db_client` | any | ≥ 1 | any |
//! | `openssh` | ≥ 1 | any | any |
//! | `jwt`, `oidc_idp` | any | any | ≥ 1 |
//! | `saml_idp` | any | exactly 1 | any |
//! | `spiffe` | any | ≥ 1 | ≥ 1 |
//!
//! Any type can be overridden through [`ValidationPolicy`].
//!
//! # Example
//!
//! ```
//! use trustgate_ca::{CertAuthType, KeyCardinality, KeyPurpose, ValidationPolicy};
//!
//! let policy = ValidationPolicy::builder().relaxed_saml_idp(true).build();
//! let rule = policy.requirements(CertAuthType::SamlIdp);
//!
//! assert_eq!(rule.get(KeyPurpose::Tls), KeyCardinality::range(0, 1)?);
//! # Ok::<(), trustgate_ca::ConfigError>(())
//! ```

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    types::{CertAuthType, KeyPurpose},
};

/// Allowed number of active key pairs for one purpose.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCardinality")]
pub struct KeyCardinality {
    min: usize,
    max: Option<usize>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCardinality {
    #[serde(default)]
    min: usize,
    #[serde(default)]
    max: Option<usize>,
}

impl TryFrom<RawCardinality> for KeyCardinality {
    type Error = ConfigError;

    fn try_from(raw: RawCardinality) -> Result<Self, Self::Error> {
        match raw.max {
            Some(max) => Self::range(raw.min, max),
            None => Ok(Self::at_least(raw.min)),
        }
    }
}

impl KeyCardinality {
    /// No constraint.
    pub const ANY: Self = Self { min: 0, max: None };

    /// At least `min` key pairs.
    #[must_use]
    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    /// Exactly `count` key pairs.
    #[must_use]
    pub const fn exactly(count: usize) -> Self {
        Self { min: count, max: Some(count) }
    }

    /// Between `min` and `max` key pairs, inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRange`] when `min > max`.
    pub fn range(min: usize, max: usize) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidRange { field: "key cardinality".into(), min, max });
        }
        Ok(Self { min, max: Some(max) })
    }

    /// Returns the lower bound.
    #[must_use]
    pub fn min(&self) -> usize {
        self.min
    }

    /// Returns the upper bound, if any.
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Returns `true` when `count` satisfies this rule.
    #[must_use]
    pub fn allows(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    /// Returns `true` when every count is allowed.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::ANY
    }
}

/// Renders the rule as a phrase, e.g. `exactly one` or `at most 2`.
impl fmt::Display for KeyCardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (min, Some(max)) if min == max => write!(f, "exactly {}", Count(min)),
            (0, Some(max)) => write!(f, "at most {}", Count(max)),
            (min, Some(max)) => write!(f, "between {} and {}", Count(min), Count(max)),
            (min, None) => write!(f, "at least {}", Count(min)),
        }
    }
}

struct Count(usize);

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            1 => f.write_str("one"),
            n => write!(f, "{n}"),
        }
    }
}

/// Active key cardinality for each purpose of one authority type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyRequirements {
    /// SSH key pairs.
    #[serde(default)]
    pub ssh: KeyCardinality,
    /// TLS key pairs.
    #[serde(default)]
    pub tls: KeyCardinality,
    /// JWT key pairs.
    #[serde(default)]
    pub jwt: KeyCardinality,
}

impl KeyRequirements {
    /// Returns the rule for `purpose`.
    #[must_use]
    pub fn get(&self, purpose: KeyPurpose) -> KeyCardinality {
        match purpose {
            KeyPurpose::Ssh => self.ssh,
            KeyPurpose::Tls => self.tls,
            KeyPurpose::Jwt => self.jwt,
        }
    }

    /// Returns the purposes that carry a constraint, in key set order.
    pub fn constrained(&self) -> impl Iterator<Item = (KeyPurpose, KeyCardinality)> {
        let rules = *self;
        KeyPurpose::ALL
            .into_iter()
            .map(move |p| (p, rules.get(p)))
            .filter(|(_, rule)| !rule.is_unconstrained())
    }

    /// Built-in requirements for `ca_type`.
    #[must_use]
    pub fn builtin(ca_type: CertAuthType) -> Self {
        const ONE: KeyCardinality = KeyCardinality::at_least(1);
        const ANY: KeyCardinality = KeyCardinality::ANY;
        let (ssh, tls, jwt) = match ca_type {
            CertAuthType::Host | CertAuthType::User => (ONE, ONE, ANY),
            CertAuthType::Database | CertAuthType::DatabaseClient => (ANY, ONE, ANY),
            CertAuthType::OpenSsh => (ONE, ANY, ANY),
            CertAuthType::Jwt | CertAuthType::OidcIdp => (ANY, ANY, ONE),
            CertAuthType::SamlIdp => (ANY, KeyCardinality::exactly(1), ANY),
            CertAuthType::Spiffe => (ANY, ONE, ONE),
        };
        Self { ssh, tls, jwt }
    }
}

/// Rules applied by [`Validator`](crate::Validator).
///
/// Deserializes from configuration. Types without an override use
/// [`KeyRequirements::builtin`].
///
/// ```
/// use trustgate_ca::{CertAuthType, KeyPurpose, ValidationPolicy};
///
/// let policy: ValidationPolicy = serde_json::from_str(
///     r#"{ "overrides": { "db": { "tls": { "min": 2 } } } }"#,
/// )?;
///
/// assert_eq!(policy.requirements(CertAuthType::Database).get(KeyPurpose::Tls).min(), 2);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct ValidationPolicy {
    /// Per-type replacements for the built-in requirements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    pub overrides: BTreeMap<CertAuthType, KeyRequirements>,

    /// Allow a SAML IdP authority with no active TLS key pair.
    ///
    /// Ignored when `overrides` has an entry for `saml_idp`.
    #[serde(default)]
    #[builder(default)]
    pub relaxed_saml_idp: bool,

    /// Also parse certificates and private keys of additional key pairs.
    #[serde(default)]
    #[builder(default)]
    pub verify_additional_keys: bool,
}

impl ValidationPolicy {
    /// Returns the requirements for `ca_type`.
    #[must_use]
    pub fn requirements(&self, ca_type: CertAuthType) -> KeyRequirements {
        if let Some(rule) = self.overrides.get(&ca_type) {
            return *rule;
        }
        let mut rule = KeyRequirements::builtin(ca_type);
        if ca_type == CertAuthType::SamlIdp && self.relaxed_saml_idp {
            rule.tls = KeyCardinality { min: 0, max: Some(1) };
        }
        rule
    }

    /// Replaces the requirements for `ca_type`.
    pub fn set_requirements(&mut self, ca_type: CertAuthType, rule: KeyRequirements) {
        self.overrides.insert(ca_type, rule);
    }
}
