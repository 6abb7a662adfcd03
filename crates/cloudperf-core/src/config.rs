//! cloudperf.toml stack configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub stack: StackSection,
    pub stores: StoresConfig,
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub edge: EdgeConfig,
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Fallback when no rule matches. Compiled into the catch-all rule.
    pub default_action: Option<Action>,
    #[serde(default)]
    pub event_rules: Vec<EventRuleSpec>,
    pub init: Option<InitSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSection {
    pub name: String,
    /// Internal address range, e.g. `10.0.0.0/16`.
    pub internal_cidr: String,
    /// Private subnets data-store reachable targets are attached to.
    pub subnets: Vec<String>,
    /// Identifier of the internal network scope (security group).
    pub scope_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoresConfig {
    pub relational: RelationalStoreConfig,
    pub cache: CacheStoreConfig,
    /// Secret reference holding the database credentials.
    pub db_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationalStoreConfig {
    pub host: String,
    pub read_host: Option<String>,
    #[serde(default = "default_relational_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStoreConfig {
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_edge_bind")]
    pub bind: String,
    #[serde(default = "default_control_bind")]
    pub control_bind: String,
    /// Host name published as the edge endpoint output.
    pub public_host: Option<String>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            bind: default_edge_bind(),
            control_bind: default_control_bind(),
            public_host: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: TargetId,
    pub kind: TargetKind,
    /// `host:port` the edge forwards to.
    pub endpoint: String,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    /// Overrides the per-kind invocation timeout.
    pub timeout: Option<String>,
    pub memory_mb: Option<u32>,
    pub ephemeral_storage_mb: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_health_interval")]
    pub interval: String,
    #[serde(default = "default_health_timeout")]
    pub timeout: String,
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_health_path(),
            interval: default_health_interval(),
            timeout: default_health_timeout(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

fn default_relational_port() -> u16 {
    3306
}

fn default_cache_port() -> u16 {
    6379
}

fn default_edge_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_control_bind() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_health_interval() -> String {
    "5s".to_string()
}

fn default_health_timeout() -> String {
    "2s".to_string()
}

fn default_unhealthy_threshold() -> u32 {
    3
}

impl StackConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: StackConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn target(&self, id: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// The reference deployment: web dashboard, JSON API, admin maintenance.
    ///
    /// `/job*` and `/api*` go to the API, `?query=login` opens the web UI,
    /// direct hits on `/` and `/index.html` get a 403, everything else is
    /// rendered by the web target. SQL dropped under `import-sql/` is applied
    /// by the admin target, which also initializes the schema once.
    pub fn reference() -> Self {
        let target = |id: &str, kind: TargetKind, port: u16| TargetConfig {
            id: id.to_string(),
            kind,
            endpoint: format!("127.0.0.1:{port}"),
            health_check: HealthCheckConfig::default(),
            timeout: None,
            memory_mb: None,
            ephemeral_storage_mb: None,
        };
        let import = |suffix: &str| EventRuleSpec {
            key_prefix: "import-sql/".to_string(),
            key_suffix: suffix.to_string(),
            target: "admin".to_string(),
            payload: PayloadTemplate {
                action: "exec_sqlfile".to_string(),
                param: "s3://{bucket}/{key}".to_string(),
            },
        };

        StackConfig {
            stack: StackSection {
                name: "cloudperf".to_string(),
                internal_cidr: "10.0.0.0/16".to_string(),
                subnets: vec!["private-a".to_string(), "private-b".to_string()],
                scope_id: "cloudperf-int-sg".to_string(),
            },
            stores: StoresConfig {
                relational: RelationalStoreConfig {
                    host: "rds.cloudperf.vpc".to_string(),
                    read_host: Some("rds-r.cloudperf.vpc".to_string()),
                    port: default_relational_port(),
                },
                cache: CacheStoreConfig {
                    host: "redis.cloudperf.vpc".to_string(),
                    port: default_cache_port(),
                },
                db_secret: "cloudperf/db-credentials".to_string(),
            },
            object_store: ObjectStoreConfig {
                bucket: "cloudperf-data".to_string(),
            },
            edge: EdgeConfig {
                public_host: Some("api.cloudperf.vpc".to_string()),
                ..EdgeConfig::default()
            },
            targets: vec![
                target("web", TargetKind::WebRenderer, 9001),
                target("api", TargetKind::ApiCompute, 9002),
                target("admin", TargetKind::AdminCompute, 9003),
            ],
            rules: vec![
                Rule::new(10, vec![Condition::paths(["/job*", "/api*"])], Action::forward("api")),
                Rule::new(20, vec![Condition::query("query", "login")], Action::forward("web")),
                Rule::new(21, vec![Condition::paths(["/", "/index.html"])], Action::forbidden()),
            ],
            default_action: Some(Action::forward("web")),
            event_rules: vec![import(".sql"), import(".zip")],
            init: Some(InitSpec {
                identity: "init-db".to_string(),
                target: "admin".to_string(),
                payload: InvocationPayload::new("exec_sql", "init_db"),
            }),
        }
    }
}
