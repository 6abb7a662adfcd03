//! Credential scoping: which targets may resolve which secrets.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ScopeError, ScopeResult};

/// Reference to a secret held by the secret manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn new(reference: &str) -> Self {
        Self(reference.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secrets a target was granted at deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialScope {
    pub secret_refs: BTreeSet<SecretRef>,
}

impl CredentialScope {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: SecretRef) -> Self {
        Self {
            secret_refs: BTreeSet::from([secret]),
        }
    }

    pub fn grants(&self, secret: &SecretRef) -> bool {
        self.secret_refs.contains(secret)
    }

    pub fn is_empty(&self) -> bool {
        self.secret_refs.is_empty()
    }
}

/// Secret material. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: &str) -> Self {
        Self(value.to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// In-process stand-in for the secret manager.
///
/// Resolution requires the caller's [`CredentialScope`]; a scope that was not
/// granted the reference cannot read it even if the secret exists.
#[derive(Debug, Clone, Default)]
pub struct SecretVault {
    secrets: HashMap<SecretRef, SecretValue>,
}

impl SecretVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, secret: SecretRef, value: SecretValue) {
        self.secrets.insert(secret, value);
    }

    pub fn resolve(&self, scope: &CredentialScope, secret: &SecretRef) -> ScopeResult<&SecretValue> {
        if !scope.grants(secret) {
            return Err(ScopeError::SecretDenied(secret.to_string()));
        }
        self.secrets
            .get(secret)
            .ok_or_else(|| ScopeError::SecretMissing(secret.to_string()))
    }
}
