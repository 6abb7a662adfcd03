//! Stack — validated deployment state and the deploy lifecycle.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use cloudperf_core::{DeploymentOutputs, StackConfig, TargetId, TargetKind};
use cloudperf_ingest::{
    AdminInvoker, EventRuleSet, IngestionPipeline, InitOutcome, Initializer, validate_init,
};
use cloudperf_router::{Dispatcher, Forwarder, HealthBoard, RuleTable};
use cloudperf_scope::{ScopePolicy, StoreCatalog, StoreKind, TargetRegistry};
use cloudperf_state::{DeploymentRecord, StateStore, epoch_secs};

use crate::error::{StackError, StackResult};

/// Result of a successful deploy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployReport {
    /// `None` when the configuration declares no init invocation.
    #[serde(skip)]
    pub init: Option<InitOutcome>,
    pub record: DeploymentRecord,
    pub outputs: DeploymentOutputs,
}

/// Which stores and secrets a target can reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityRow {
    pub target: TargetId,
    pub kind: TargetKind,
    pub relational: bool,
    pub cache: bool,
    pub db_secret: bool,
}

/// A validated deployment.
pub struct Stack {
    config: StackConfig,
    policy: ScopePolicy,
    registry: Arc<TargetRegistry>,
    table: Arc<RuleTable>,
    event_rules: Arc<EventRuleSet>,
    state: StateStore,
}

impl Stack {
    /// Build every immutable structure and check all construction invariants.
    pub fn build(config: StackConfig, state: StateStore) -> StackResult<Self> {
        let policy = ScopePolicy::from_config(&config)?;
        let registry = TargetRegistry::build(&config.targets, &policy)?;

        let mut builder = RuleTable::builder().rules(config.rules.iter().cloned());
        if let Some(action) = &config.default_action {
            builder = builder.default_action(action.clone());
        }
        let table = builder.build(&registry)?;

        let event_rules = EventRuleSet::build(&config.object_store.bucket, &config.event_rules, &registry)?;
        if let Some(init) = &config.init {
            validate_init(init, &registry)?;
        }

        info!(
            stack = %config.stack.name,
            targets = registry.len(),
            rules = table.len(),
            event_rules = event_rules.len(),
            "stack validated"
        );
        Ok(Self {
            config,
            policy,
            registry: Arc::new(registry),
            table: Arc::new(table),
            event_rules: Arc::new(event_rules),
            state,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn table(&self) -> &Arc<RuleTable> {
        &self.table
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn dispatcher(&self, health: HealthBoard, forwarder: Arc<dyn Forwarder>) -> Dispatcher {
        Dispatcher::new(self.table.clone(), self.registry.clone(), health, forwarder)
    }

    pub fn pipeline(&self, invoker: Arc<dyn AdminInvoker>) -> IngestionPipeline {
        IngestionPipeline::new(
            self.event_rules.clone(),
            self.registry.clone(),
            invoker,
            self.state.clone(),
        )
    }

    /// sha256 hex of the canonical TOML form of the configuration.
    pub fn config_digest(&self) -> StackResult<String> {
        let canonical = self
            .config
            .to_toml_string()
            .map_err(|e| StackError::Config(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Run the init invocation (once per identity) and record the deployment.
    ///
    /// An init failure aborts before anything is recorded as completed.
    pub async fn deploy(&self, invoker: Arc<dyn AdminInvoker>) -> StackResult<DeployReport> {
        let init = match &self.config.init {
            Some(spec) => {
                let initializer = Initializer::new(spec.clone(), self.registry.clone(), invoker, self.state.clone())?;
                match initializer.run().await {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        warn!(stack = %self.config.stack.name, error = %e, "deployment aborted");
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        let record = DeploymentRecord {
            stack: self.config.stack.name.clone(),
            config_digest: self.config_digest()?,
            completed: true,
            init_identity: self.config.init.as_ref().map(|i| i.identity.clone()),
            deployed_at: epoch_secs(),
        };
        self.state.put_deployment(&record)?;
        info!(stack = %record.stack, digest = %record.config_digest, "deployment complete");

        Ok(DeployReport {
            init,
            record,
            outputs: self.outputs(),
        })
    }

    /// Whether the current configuration is the one last deployed.
    pub fn is_deployed(&self) -> StackResult<bool> {
        match self.ensure_deployed() {
            Ok(()) => Ok(true),
            Err(StackError::NotDeployed(_) | StackError::ConfigChanged { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fail unless a completed deployment exists for exactly this
    /// configuration. A config that changed since the last deploy, such as a
    /// new init identity, has to be deployed before it may serve.
    pub fn ensure_deployed(&self) -> StackResult<()> {
        let name = &self.config.stack.name;
        let record = self
            .state
            .get_deployment(name)?
            .filter(|r| r.completed)
            .ok_or_else(|| StackError::NotDeployed(name.clone()))?;
        let current = self.config_digest()?;
        if record.config_digest != current {
            return Err(StackError::ConfigChanged {
                stack: name.clone(),
                deployed: record.config_digest,
                current,
            });
        }
        Ok(())
    }

    pub fn outputs(&self) -> DeploymentOutputs {
        let stores = &self.config.stores;
        let admin_target = self
            .config
            .init
            .as_ref()
            .map(|i| i.target.clone())
            .or_else(|| {
                self.registry
                    .of_kind(TargetKind::AdminCompute)
                    .next()
                    .map(|t| t.id.clone())
            });
        DeploymentOutputs {
            db_host: stores.relational.host.clone(),
            db_read_host: stores
                .relational
                .read_host
                .clone()
                .unwrap_or_else(|| stores.relational.host.clone()),
            db_secret: stores.db_secret.clone(),
            cache_host: stores.cache.host.clone(),
            edge_host: self
                .config
                .edge
                .public_host
                .clone()
                .unwrap_or_else(|| self.config.edge.bind.clone()),
            internal_scope_id: self.config.stack.scope_id.clone(),
            object_store: self.config.object_store.bucket.clone(),
            admin_target,
        }
    }

    pub fn store_catalog(&self) -> StoreCatalog {
        StoreCatalog::new(
            *self.policy.internal(),
            &self.config.stores.relational.host,
            &self.config.stores.cache.host,
        )
    }

    /// Store and secret reachability of every target, checked through the
    /// same capability calls a target would make.
    pub fn reachability(&self) -> Vec<ReachabilityRow> {
        let catalog = self.store_catalog();
        self.registry
            .iter()
            .map(|t| ReachabilityRow {
                target: t.id.clone(),
                kind: t.kind,
                relational: catalog.connect(&t.network, StoreKind::Relational).is_ok(),
                cache: catalog.connect(&t.network, StoreKind::Cache).is_ok(),
                db_secret: t.credential.grants(self.policy.db_secret()),
            })
            .collect()
    }
}
