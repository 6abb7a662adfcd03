//! Target registry — the immutable catalog of compute targets.
//!
//! Built once from configuration. Scopes and budgets are resolved during
//! construction; lookups afterwards are plain reads and need no locking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cloudperf_core::{HealthCheckConfig, TargetConfig, TargetId, TargetKind};

use crate::budget::ResourceBudget;
use crate::credential::CredentialScope;
use crate::error::{ScopeError, ScopeResult};
use crate::network::NetworkScope;
use crate::policy::ScopePolicy;

/// A backend compute target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub kind: TargetKind,
    /// `host:port` the edge forwards to.
    pub endpoint: String,
    pub network: NetworkScope,
    pub credential: CredentialScope,
    pub health_check: HealthCheckConfig,
    pub budget: ResourceBudget,
}

impl Target {
    pub fn health_check_enabled(&self) -> bool {
        self.health_check.enabled
    }
}

/// Borrowed view of a target's scopes.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedScope<'a> {
    pub network: &'a NetworkScope,
    pub credential: &'a CredentialScope,
}

/// Immutable registry of targets keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<TargetId, Target>,
}

impl TargetRegistry {
    /// Build the registry, assigning scopes and budgets by kind.
    pub fn build(configs: &[TargetConfig], policy: &ScopePolicy) -> ScopeResult<Self> {
        let mut targets = BTreeMap::new();
        for config in configs {
            if targets.contains_key(&config.id) {
                return Err(ScopeError::DuplicateTarget(config.id.clone()));
            }
            if config.endpoint.trim().is_empty() {
                return Err(ScopeError::InvalidScope {
                    target: config.id.clone(),
                    reason: "endpoint is empty".to_string(),
                });
            }

            let (network, credential) = policy.assign(config.kind);
            let target = Target {
                id: config.id.clone(),
                kind: config.kind,
                endpoint: config.endpoint.clone(),
                network,
                credential,
                health_check: config.health_check.clone(),
                budget: ResourceBudget::from_config(config)?,
            };
            Self::check(&target, policy)?;
            debug!(
                target = %target.id,
                kind = target.kind.label(),
                stores = target.network.reaches_any_store(),
                secrets = target.credential.secret_refs.len(),
                "target registered"
            );
            targets.insert(target.id.clone(), target);
        }
        info!(count = targets.len(), "target registry built");
        Ok(Self { targets })
    }

    /// Build from already-scoped targets, validating every scope.
    pub fn from_targets(list: Vec<Target>, policy: &ScopePolicy) -> ScopeResult<Self> {
        let mut targets = BTreeMap::new();
        for target in list {
            Self::check(&target, policy)?;
            if targets.insert(target.id.clone(), target.clone()).is_some() {
                return Err(ScopeError::DuplicateTarget(target.id));
            }
        }
        Ok(Self { targets })
    }

    fn check(target: &Target, policy: &ScopePolicy) -> ScopeResult<()> {
        target.network.validate(&target.id, policy.internal())?;
        if !target.kind.reaches_stores()
            && (target.network.reaches_any_store() || !target.credential.is_empty())
        {
            return Err(ScopeError::InvalidScope {
                target: target.id.clone(),
                reason: format!("{} targets may not reach stores or secrets", target.kind.label()),
            });
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    /// Network and credential scope of a target.
    pub fn resolve_scope(&self, id: &str) -> ScopeResult<ResolvedScope<'_>> {
        let target = self
            .get(id)
            .ok_or_else(|| ScopeError::UnknownTarget(id.to_string()))?;
        Ok(ResolvedScope {
            network: &target.network,
            credential: &target.credential,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn of_kind(&self, kind: TargetKind) -> impl Iterator<Item = &Target> {
        self.targets.values().filter(move |t| t.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{SecretRef, SecretValue, SecretVault};
    use crate::network::{StoreCatalog, StoreKind};
    use cloudperf_core::StackConfig;

    fn registry() -> (TargetRegistry, ScopePolicy) {
        let config = StackConfig::reference();
        let policy = ScopePolicy::from_config(&config).unwrap();
        (TargetRegistry::build(&config.targets, &policy).unwrap(), policy)
    }

    #[test]
    fn builds_reference_targets() {
        let (registry, _) = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("admin").unwrap().kind, TargetKind::AdminCompute);
        assert_eq!(registry.of_kind(TargetKind::ApiCompute).count(), 1);
    }

    #[test]
    fn resolve_scope_follows_least_privilege() {
        let (registry, policy) = registry();

        let web = registry.resolve_scope("web").unwrap();
        assert!(!web.network.reaches_any_store());
        assert!(web.credential.is_empty());

        let api = registry.resolve_scope("api").unwrap();
        assert!(api.network.reaches(StoreKind::Relational));
        assert!(api.credential.grants(policy.db_secret()));
    }

    #[test]
    fn resolve_unknown_target_fails() {
        let (registry, _) = registry();
        assert_eq!(
            registry.resolve_scope("nope").unwrap_err(),
            ScopeError::UnknownTarget("nope".to_string())
        );
    }

    #[test]
    fn duplicate_target_ids_rejected() {
        let mut config = StackConfig::reference();
        let dup = config.targets[0].clone();
        config.targets.push(dup);
        let policy = ScopePolicy::from_config(&config).unwrap();
        assert!(matches!(
            TargetRegistry::build(&config.targets, &policy),
            Err(ScopeError::DuplicateTarget(_))
        ));
    }

    #[test]
    fn web_renderer_with_secret_rejected() {
        let (registry, policy) = registry();
        let mut web = registry.get("web").unwrap().clone();
        web.credential = CredentialScope::with_secret(policy.db_secret().clone());
        assert!(matches!(
            TargetRegistry::from_targets(vec![web], &policy),
            Err(ScopeError::InvalidScope { .. })
        ));
    }

    #[test]
    fn only_scoped_targets_reach_stores_and_secrets() {
        let (registry, policy) = registry();
        let catalog = StoreCatalog::new(*policy.internal(), "rds.internal", "redis.internal");
        let mut vault = SecretVault::new();
        vault.insert(policy.db_secret().clone(), SecretValue::new("pw"));

        for target in registry.iter() {
            let scope = registry.resolve_scope(&target.id).unwrap();
            let reached = catalog.connect(scope.network, StoreKind::Relational).is_ok();
            let resolved = vault.resolve(scope.credential, policy.db_secret()).is_ok();
            let expected = target.kind != TargetKind::WebRenderer;
            assert_eq!(reached, expected, "store reachability for {}", target.id);
            assert_eq!(resolved, expected, "secret access for {}", target.id);
        }

        let web = registry.resolve_scope("web").unwrap();
        assert!(vault.resolve(web.credential, &SecretRef::new("anything")).is_err());
    }

    #[test]
    fn admin_budget_exceeds_api_budget() {
        let (registry, _) = registry();
        let api = registry.get("api").unwrap();
        let admin = registry.get("admin").unwrap();
        assert!(admin.budget.timeout > api.budget.timeout);
        assert!(admin.budget.memory_mb > api.budget.memory_mb);
    }
}
