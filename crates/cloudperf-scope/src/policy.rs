//! Least-privilege scope assignment per target kind.

use cloudperf_core::{StackConfig, TargetKind};

use crate::credential::{CredentialScope, SecretRef};
use crate::error::{ScopeError, ScopeResult};
use crate::network::{Ipv4Cidr, NetworkScope, StoreKind};

/// Decides the network and credential scope each target kind receives.
///
/// API and admin targets sit on the private subnets with both store ports
/// open and may resolve the database secret. The web renderer gets an
/// isolated scope and no secrets.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    internal: Ipv4Cidr,
    subnets: Vec<String>,
    db_secret: SecretRef,
}

impl ScopePolicy {
    pub fn new(internal: Ipv4Cidr, subnets: Vec<String>, db_secret: SecretRef) -> Self {
        Self {
            internal,
            subnets,
            db_secret,
        }
    }

    /// Fails on a malformed internal CIDR or a store port other than the
    /// one the network scopes open.
    pub fn from_config(config: &StackConfig) -> ScopeResult<Self> {
        let internal: Ipv4Cidr = config.stack.internal_cidr.parse()?;
        for (store, port) in [
            (StoreKind::Relational, config.stores.relational.port),
            (StoreKind::Cache, config.stores.cache.port),
        ] {
            if port != store.port() {
                return Err(ScopeError::InvalidStorePort {
                    store: store.to_string(),
                    port,
                    expected: store.port(),
                });
            }
        }
        Ok(Self::new(
            internal,
            config.stack.subnets.clone(),
            SecretRef::new(&config.stores.db_secret),
        ))
    }

    pub fn internal(&self) -> &Ipv4Cidr {
        &self.internal
    }

    pub fn db_secret(&self) -> &SecretRef {
        &self.db_secret
    }

    pub fn assign(&self, kind: TargetKind) -> (NetworkScope, CredentialScope) {
        if kind.reaches_stores() {
            (
                NetworkScope::internal(self.subnets.iter().cloned(), self.internal),
                CredentialScope::with_secret(self.db_secret.clone()),
            )
        } else {
            (NetworkScope::isolated(), CredentialScope::none())
        }
    }
}
