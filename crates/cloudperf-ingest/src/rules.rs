//! Validated event rules.

use tracing::info;

use cloudperf_core::{EventRuleSpec, ObjectWriteEvent, PayloadTemplate, TargetId, TargetKind};
use cloudperf_scope::TargetRegistry;

use crate::error::{IngestError, IngestResult};

/// An event rule bound to an admin target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRule {
    /// Position in configuration; identifies the rule in the ledger.
    pub index: usize,
    pub key_prefix: String,
    pub key_suffix: String,
    pub target: TargetId,
    pub payload: PayloadTemplate,
}

impl EventRule {
    pub fn matches_key(&self, key: &str) -> bool {
        key.starts_with(&self.key_prefix) && key.ends_with(&self.key_suffix)
    }
}

/// All event rules of a deployment, in configuration order.
///
/// Rules are bound to the deployment's bucket; writes to any other bucket
/// never fire.
#[derive(Debug, Clone, Default)]
pub struct EventRuleSet {
    bucket: String,
    rules: Vec<EventRule>,
}

impl EventRuleSet {
    pub fn build(bucket: &str, specs: &[EventRuleSpec], registry: &TargetRegistry) -> IngestResult<Self> {
        if bucket.trim().is_empty() && !specs.is_empty() {
            return Err(IngestError::InvalidRule {
                index: 0,
                reason: "object store bucket is empty".to_string(),
            });
        }
        let mut rules = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let invalid = |reason: String| IngestError::InvalidRule { index, reason };

            if spec.key_prefix.is_empty() && spec.key_suffix.is_empty() {
                return Err(invalid("prefix and suffix are both empty".to_string()));
            }
            let target = registry
                .get(&spec.target)
                .ok_or_else(|| invalid(format!("unknown target {}", spec.target)))?;
            if target.kind != TargetKind::AdminCompute {
                return Err(invalid(format!(
                    "target {} is {}, not admin-compute",
                    target.id,
                    target.kind.label()
                )));
            }
            if spec.payload.action.is_empty() {
                return Err(invalid("payload action is empty".to_string()));
            }

            rules.push(EventRule {
                index,
                key_prefix: spec.key_prefix.clone(),
                key_suffix: spec.key_suffix.clone(),
                target: spec.target.clone(),
                payload: spec.payload.clone(),
            });
        }
        info!(%bucket, rules = rules.len(), "event rules built");
        Ok(Self {
            bucket: bucket.to_string(),
            rules,
        })
    }

    /// Rules that fire for this event. Only object-created events in the
    /// bound bucket fire.
    pub fn matching<'a>(&'a self, event: &'a ObjectWriteEvent) -> impl Iterator<Item = &'a EventRule> + 'a {
        let created = event.is_object_created() && event.bucket == self.bucket;
        self.rules
            .iter()
            .filter(move |r| created && r.matches_key(&event.key))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn rules(&self) -> &[EventRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudperf_core::StackConfig;
    use cloudperf_scope::ScopePolicy;

    fn build(specs: &[EventRuleSpec]) -> IngestResult<EventRuleSet> {
        let config = StackConfig::reference();
        let policy = ScopePolicy::from_config(&config).unwrap();
        let registry = TargetRegistry::build(&config.targets, &policy).unwrap();
        EventRuleSet::build(&config.object_store.bucket, specs, &registry)
    }

    fn spec(prefix: &str, suffix: &str, target: &str) -> EventRuleSpec {
        EventRuleSpec {
            key_prefix: prefix.to_string(),
            key_suffix: suffix.to_string(),
            target: target.to_string(),
            payload: PayloadTemplate {
                action: "exec_sqlfile".to_string(),
                param: "s3://{bucket}/{key}".to_string(),
            },
        }
    }

    #[test]
    fn reference_rules_match_by_prefix_and_suffix() {
        let set = build(&StackConfig::reference().event_rules).unwrap();
        assert_eq!(set.len(), 2);

        let count = |key: &str| {
            let event = ObjectWriteEvent::created("cloudperf-data", key, 1);
            set.matching(&event).count()
        };
        assert_eq!(count("import-sql/2024-01-01.sql"), 1);
        assert_eq!(count("import-sql/archive.zip"), 1);
        assert_eq!(count("other/readme.txt"), 0);
        assert_eq!(count("import-sql/readme.txt"), 0);
        assert_eq!(count("elsewhere/a.sql"), 0);
    }

    #[test]
    fn overlapping_rules_each_fire() {
        let set = build(&[spec("import-sql/", "", "admin"), spec("", ".sql", "admin")]).unwrap();
        let event = ObjectWriteEvent::created("cloudperf-data", "import-sql/x.sql", 1);
        let fired: Vec<usize> = set.matching(&event).map(|r| r.index).collect();
        assert_eq!(fired, vec![0, 1]);
    }

    #[test]
    fn non_created_events_never_fire() {
        let set = build(&StackConfig::reference().event_rules).unwrap();
        let mut event = ObjectWriteEvent::created("cloudperf-data", "import-sql/x.sql", 1);
        event.event_type = "ObjectRemoved:Delete".to_string();
        assert_eq!(set.matching(&event).count(), 0);
    }

    #[test]
    fn writes_to_other_buckets_never_fire() {
        let set = build(&StackConfig::reference().event_rules).unwrap();
        assert_eq!(set.bucket(), "cloudperf-data");
        let event = ObjectWriteEvent::created("attacker-bucket", "import-sql/x.sql", 1);
        assert_eq!(set.matching(&event).count(), 0);
    }

    #[test]
    fn empty_bucket_rejected() {
        let config = StackConfig::reference();
        let policy = ScopePolicy::from_config(&config).unwrap();
        let registry = TargetRegistry::build(&config.targets, &policy).unwrap();
        assert!(EventRuleSet::build(" ", &config.event_rules, &registry).is_err());
    }

    #[test]
    fn rule_must_target_admin() {
        let err = build(&[spec("import-sql/", ".sql", "api")]).unwrap_err();
        assert!(matches!(err, IngestError::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn rule_target_must_exist() {
        assert!(build(&[spec("a/", "", "ghost")]).is_err());
    }

    #[test]
    fn unconstrained_rule_rejected() {
        assert!(build(&[spec("", "", "admin")]).is_err());
    }
}
