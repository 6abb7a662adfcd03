//! Rule table — priority-ordered request rules.
//!
//! The table is assembled once through [`RuleTableBuilder`], which enforces
//! the structural invariants (unique priorities, a single catch-all that
//! sorts last, known forward targets). After that it is read-only and can be
//! shared across any number of concurrent dispatches.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use cloudperf_core::{Action, Condition, RequestDescriptor, Rule};
use cloudperf_scope::TargetRegistry;

use crate::error::RuleTableError;
use crate::glob::PathGlob;

/// Priority assigned to the configured default action.
pub const CATCH_ALL_PRIORITY: u32 = u32::MAX;

/// A condition ready for evaluation.
#[derive(Debug, Clone)]
enum Matcher {
    /// Any one of the globs must match the path.
    Path(Vec<PathGlob>),
    Query { key: String, value: String },
}

impl Matcher {
    fn compile(priority: u32, condition: &Condition) -> Result<Self, RuleTableError> {
        let invalid = |reason: String| RuleTableError::InvalidCondition { priority, reason };
        match condition {
            Condition::PathPattern { patterns } => {
                if patterns.is_empty() {
                    return Err(invalid("path pattern list is empty".to_string()));
                }
                if let Some(bad) = patterns
                    .iter()
                    .find(|p| !(p.starts_with('/') || p.starts_with('*')))
                {
                    return Err(invalid(format!("path pattern {bad:?} must start with '/' or '*'")));
                }
                Ok(Matcher::Path(patterns.iter().map(|p| PathGlob::new(p)).collect()))
            }
            Condition::QueryParam { key, value } => {
                if key.is_empty() {
                    return Err(invalid("query parameter key is empty".to_string()));
                }
                Ok(Matcher::Query {
                    key: key.clone(),
                    value: value.clone(),
                })
            }
        }
    }

    fn matches(&self, req: &RequestDescriptor) -> bool {
        match self {
            Matcher::Path(globs) => globs.iter().any(|g| g.matches(&req.path)),
            Matcher::Query { key, value } => req.query_param(key) == Some(value.as_str()),
        }
    }
}

/// A validated rule.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    priority: u32,
    matchers: Vec<Matcher>,
    action: Action,
}

impl CompiledRule {
    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn is_catch_all(&self) -> bool {
        self.matchers.is_empty()
    }

    /// All conditions must hold; a rule without conditions always matches.
    pub fn matches(&self, req: &RequestDescriptor) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

/// Collects rules and validates them into a [`RuleTable`].
#[derive(Debug, Default)]
pub struct RuleTableBuilder {
    rules: Vec<Rule>,
    default_action: Option<Action>,
}

impl RuleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Becomes the catch-all rule at [`CATCH_ALL_PRIORITY`].
    pub fn default_action(mut self, action: Action) -> Self {
        self.default_action = Some(action);
        self
    }

    pub fn build(self, registry: &TargetRegistry) -> Result<RuleTable, RuleTableError> {
        let mut rules = self.rules;
        if let Some(action) = self.default_action {
            rules.push(Rule::new(CATCH_ALL_PRIORITY, Vec::new(), action));
        }

        let mut by_priority: BTreeMap<u32, CompiledRule> = BTreeMap::new();
        let mut catch_all: Option<u32> = None;

        for rule in rules {
            if by_priority.contains_key(&rule.priority) {
                return Err(RuleTableError::DuplicatePriority(rule.priority));
            }
            if rule.is_catch_all() {
                if let Some(first) = catch_all {
                    return Err(RuleTableError::MultipleCatchAll {
                        first: first.min(rule.priority),
                        second: first.max(rule.priority),
                    });
                }
                catch_all = Some(rule.priority);
            }
            validate_action(rule.priority, &rule.action, registry)?;

            let matchers = rule
                .conditions
                .iter()
                .map(|c| Matcher::compile(rule.priority, c))
                .collect::<Result<Vec<_>, _>>()?;
            debug!(priority = rule.priority, conditions = matchers.len(), "rule compiled");
            by_priority.insert(
                rule.priority,
                CompiledRule {
                    priority: rule.priority,
                    matchers,
                    action: rule.action,
                },
            );
        }

        if let Some(catch_all) = catch_all {
            let highest = by_priority.keys().next_back().copied().unwrap_or(catch_all);
            if highest != catch_all {
                return Err(RuleTableError::CatchAllNotLast { catch_all, highest });
            }
        }

        let rules: Vec<CompiledRule> = by_priority.into_values().collect();
        info!(rules = rules.len(), catch_all = catch_all.is_some(), "rule table built");
        Ok(RuleTable { rules })
    }
}

fn validate_action(priority: u32, action: &Action, registry: &TargetRegistry) -> Result<(), RuleTableError> {
    match action {
        Action::Forward { target, .. } => {
            if !registry.contains(target) {
                return Err(RuleTableError::UnknownTarget {
                    priority,
                    target: target.clone(),
                });
            }
        }
        Action::FixedResponse {
            status,
            content_type,
            ..
        } => {
            if !(100..=599).contains(status) {
                return Err(RuleTableError::InvalidResponse {
                    priority,
                    reason: format!("status {status} is out of range"),
                });
            }
            if content_type.is_empty() {
                return Err(RuleTableError::InvalidResponse {
                    priority,
                    reason: "content type is empty".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Immutable, priority-sorted rule table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    /// Sorted by ascending priority.
    rules: Vec<CompiledRule>,
}

impl RuleTable {
    pub fn builder() -> RuleTableBuilder {
        RuleTableBuilder::new()
    }

    /// First rule, in ascending priority, whose conditions all match.
    pub fn evaluate(&self, req: &RequestDescriptor) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.matches(req))
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Targets that some forward action gates on health.
    pub fn health_checked_targets(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .filter_map(|r| match r.action() {
                Action::Forward {
                    target,
                    health_check_enabled: true,
                } => Some(target.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_catch_all(&self) -> bool {
        self.rules.last().is_some_and(CompiledRule::is_catch_all)
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

    fn registry() -> TargetRegistry {
        let config = StackConfig::reference();
        let policy = ScopePolicy::from_config(&config).unwrap();
        TargetRegistry::build(&config.targets, &policy).unwrap()
    }

    fn reference_table() -> RuleTable {
        let config = StackConfig::reference();
        let mut builder = RuleTable::builder().rules(config.rules);
        if let Some(action) = config.default_action {
            builder = builder.default_action(action);
        }
        builder.build(&registry()).unwrap()
    }

    #[test]
    fn rules_sorted_by_priority() {
        let registry = registry();
        let table = RuleTable::builder()
            .rule(Rule::new(30, vec![Condition::paths(["/c"])], Action::forward("web")))
            .rule(Rule::new(10, vec![Condition::paths(["/a"])], Action::forward("api")))
            .rule(Rule::new(20, vec![Condition::paths(["/b"])], Action::forbidden()))
            .build(&registry)
            .unwrap();
        let priorities: Vec<u32> = table.rules().iter().map(CompiledRule::priority).collect();
        assert_eq!(priorities, vec![10, 20, 30]);
    }

    #[test]
    fn health_checked_targets_follow_forward_flag() {
        assert!(reference_table().health_checked_targets().is_empty());

        let checked = Action::Forward {
            target: "api".to_string(),
            health_check_enabled: true,
        };
        let table = RuleTable::builder()
            .rule(Rule::new(10, vec![Condition::paths(["/api*"])], checked))
            .rule(Rule::new(20, vec![Condition::paths(["/web*"])], Action::forward("web")))
            .build(&registry())
            .unwrap();
        assert_eq!(table.health_checked_targets(), BTreeSet::from(["api"]));
    }

    #[test]
    fn duplicate_priority_rejected() {
        let err = RuleTable::builder()
            .rule(Rule::new(10, vec![Condition::paths(["/a"])], Action::forward("api")))
            .rule(Rule::new(10, vec![Condition::paths(["/b"])], Action::forward("web")))
            .build(&registry())
            .unwrap_err();
        assert_eq!(err, RuleTableError::DuplicatePriority(10));
    }

    #[test]
    fn second_catch_all_rejected() {
        let err = RuleTable::builder()
            .rule(Rule::new(99, vec![], Action::forward("api")))
            .default_action(Action::forward("web"))
            .build(&registry())
            .unwrap_err();
        assert_eq!(
            err,
            RuleTableError::MultipleCatchAll {
                first: 99,
                second: CATCH_ALL_PRIORITY
            }
        );
    }

    #[test]
    fn catch_all_must_sort_last() {
        let err = RuleTable::builder()
            .rule(Rule::new(5, vec![], Action::forward("web")))
            .rule(Rule::new(10, vec![Condition::paths(["/api*"])], Action::forward("api")))
            .build(&registry())
            .unwrap_err();
        assert_eq!(err, RuleTableError::CatchAllNotLast { catch_all: 5, highest: 10 });
    }

    #[test]
    fn unknown_forward_target_rejected() {
        let err = RuleTable::builder()
            .rule(Rule::new(1, vec![Condition::paths(["/x"])], Action::forward("ghost")))
            .build(&registry())
            .unwrap_err();
        assert!(matches!(err, RuleTableError::UnknownTarget { priority: 1, .. }));
    }

    #[test]
    fn empty_pattern_list_rejected() {
        let err = RuleTable::builder()
            .rule(Rule::new(1, vec![Condition::paths(Vec::<String>::new())], Action::forbidden()))
            .build(&registry())
            .unwrap_err();
        assert!(matches!(err, RuleTableError::InvalidCondition { .. }));
    }

    #[test]
    fn relative_pattern_rejected() {
        let err = RuleTable::builder()
            .rule(Rule::new(1, vec![Condition::paths(["api*"])], Action::forbidden()))
            .build(&registry())
            .unwrap_err();
        assert!(matches!(err, RuleTableError::InvalidCondition { .. }));
    }

    #[test]
    fn bad_fixed_status_rejected() {
        let err = RuleTable::builder()
            .rule(Rule::new(1, vec![Condition::paths(["/"])], Action::fixed(42, "text/plain", "x")))
            .build(&registry())
            .unwrap_err();
        assert!(matches!(err, RuleTableError::InvalidResponse { .. }));
    }

    #[test]
    fn conditions_are_anded_across_groups() {
        let table = RuleTable::builder()
            .rule(Rule::new(
                1,
                vec![Condition::paths(["/report*"]), Condition::query("format", "csv")],
                Action::forward("api"),
            ))
            .build(&registry())
            .unwrap();

        let both = RequestDescriptor::get("/report/1").with_query("format", "csv");
        let path_only = RequestDescriptor::get("/report/1");
        let query_only = RequestDescriptor::get("/other").with_query("format", "csv");

        assert_eq!(table.evaluate(&both).map(CompiledRule::priority), Some(1));
        assert!(table.evaluate(&path_only).is_none());
        assert!(table.evaluate(&query_only).is_none());
    }

    #[test]
    fn query_value_must_match_exactly() {
        let table = reference_table();
        let req = RequestDescriptor::get("/").with_query("query", "Login");
        assert_eq!(table.evaluate(&req).map(CompiledRule::priority), Some(21));
    }

    #[test]
    fn reference_table_priorities() {
        let table = reference_table();
        assert_eq!(table.len(), 4);
        assert!(table.has_catch_all());

        let cases = [
            (RequestDescriptor::get("/api/status"), 10),
            (RequestDescriptor::get("/job/42"), 10),
            (RequestDescriptor::get("/").with_query("query", "login"), 20),
            (RequestDescriptor::get("/index.html"), 21),
            (RequestDescriptor::get("/assets/app.js"), CATCH_ALL_PRIORITY),
        ];
        for (req, priority) in cases {
            assert_eq!(
                table.evaluate(&req).map(CompiledRule::priority),
                Some(priority),
                "{}",
                req.path_and_query()
            );
        }
    }

    #[test]
    fn table_without_catch_all_can_miss() {
        let table = RuleTable::builder()
            .rule(Rule::new(10, vec![Condition::paths(["/api*"])], Action::forward("api")))
            .build(&registry())
            .unwrap();
        assert!(!table.has_catch_all());
        assert!(table.evaluate(&RequestDescriptor::get("/")).is_none());
    }
}
