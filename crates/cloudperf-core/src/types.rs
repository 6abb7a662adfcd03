//! Shared types used across cloudperf crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique identifier for a compute target.
pub type TargetId = String;

// ── Targets ────────────────────────────────────────────────────────

/// The class of backend compute a target represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Renders the browser dashboard. Never touches the data stores.
    WebRenderer,
    /// Serves the JSON API.
    ApiCompute,
    /// Schema initialization and bulk import.
    AdminCompute,
}

impl TargetKind {
    pub fn label(&self) -> &'static str {
        match self {
            TargetKind::WebRenderer => "web-renderer",
            TargetKind::ApiCompute => "api-compute",
            TargetKind::AdminCompute => "admin-compute",
        }
    }

    /// Whether targets of this kind are granted data-store reachability.
    pub fn reaches_stores(&self) -> bool {
        matches!(self, TargetKind::ApiCompute | TargetKind::AdminCompute)
    }
}

// ── Rules ──────────────────────────────────────────────────────────

/// A single request predicate attached to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Glob patterns matched against the request path. Any one may match.
    PathPattern { patterns: Vec<String> },
    /// Exact match on a query string parameter.
    QueryParam { key: String, value: String },
}

impl Condition {
    pub fn paths<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::PathPattern {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn query(key: &str, value: &str) -> Self {
        Condition::QueryParam {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// What the edge does once a rule matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Invoke a target with the original request.
    Forward {
        target: TargetId,
        #[serde(default)]
        health_check_enabled: bool,
    },
    /// Answer locally without touching any backend.
    FixedResponse {
        status: u16,
        content_type: String,
        body: String,
    },
}

impl Action {
    pub fn forward(target: &str) -> Self {
        Action::Forward {
            target: target.to_string(),
            health_check_enabled: false,
        }
    }

    pub fn fixed(status: u16, content_type: &str, body: &str) -> Self {
        Action::FixedResponse {
            status,
            content_type: content_type.to_string(),
            body: body.to_string(),
        }
    }

    /// The literal 403 used to block direct access to the dashboard root.
    pub fn forbidden() -> Self {
        Self::fixed(403, "text/plain", "Forbidden")
    }

    /// Target this action forwards to, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Action::Forward { target, .. } => Some(target),
            Action::FixedResponse { .. } => None,
        }
    }
}

/// A routing rule as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Ascending priority; lower numbers are evaluated first.
    pub priority: u32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub action: Action,
}

impl Rule {
    pub fn new(priority: u32, conditions: Vec<Condition>, action: Action) -> Self {
        Self {
            priority,
            conditions,
            action,
        }
    }

    /// A rule without conditions matches every request.
    pub fn is_catch_all(&self) -> bool {
        self.conditions.is_empty()
    }
}

// ── Requests ───────────────────────────────────────────────────────

/// An inbound HTTP request as seen by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    pub path: String,
    /// Decoded query parameters. On duplicate keys the last value wins.
    pub query: BTreeMap<String, String>,
    /// Raw query string, kept verbatim for forwarding.
    pub raw_query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestDescriptor {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    /// Build a descriptor from a path and an optional raw query string.
    pub fn from_parts(method: &str, path: &str, raw_query: Option<&str>) -> Self {
        let mut req = Self::new(method, path);
        if let Some(q) = raw_query.filter(|q| !q.is_empty()) {
            req.query = parse_query(q);
            req.raw_query = Some(q.to_string());
        }
        req
    }

    /// Add a query parameter (builder style, mainly for tests and the CLI).
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        let encoded = serde_urlencoded::to_string(&self.query).unwrap_or_default();
        self.raw_query = Some(encoded);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Path plus query, as it should appear on the forwarded request line.
    pub fn path_and_query(&self) -> String {
        match &self.raw_query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Decode a raw query string. Malformed input yields an empty map.
pub fn parse_query(raw: &str) -> BTreeMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

// ── Object store events ────────────────────────────────────────────

/// A write observed in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectWriteEvent {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub size: u64,
    /// Notification event name, e.g. `ObjectCreated:Put`.
    pub event_type: String,
    /// Object version or entity tag, when the store reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ObjectWriteEvent {
    pub fn created(bucket: &str, key: &str, size: u64) -> Self {
        Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            event_type: "ObjectCreated:Put".to_string(),
            version: None,
        }
    }

    pub fn is_object_created(&self) -> bool {
        self.event_type.starts_with("ObjectCreated:")
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

// ── Invocations ────────────────────────────────────────────────────

/// Payload delivered to a target on direct invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationPayload {
    pub action: String,
    pub param: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl InvocationPayload {
    pub fn new(action: &str, param: &str) -> Self {
        Self {
            action: action.to_string(),
            param: param.to_string(),
            idempotency_key: None,
        }
    }
}

/// Payload template attached to an event rule.
///
/// `{bucket}`, `{key}` and `{size}` are substituted from the triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadTemplate {
    pub action: String,
    pub param: String,
}

impl PayloadTemplate {
    pub fn render(&self, event: &ObjectWriteEvent) -> InvocationPayload {
        InvocationPayload {
            action: substitute(&self.action, event),
            param: substitute(&self.param, event),
            idempotency_key: None,
        }
    }
}

/// Expand placeholders in one left-to-right pass. Substituted text is never
/// rescanned, so a key containing `{size}` is passed through verbatim.
/// Unknown `{...}` sequences are kept as written.
fn substitute(template: &str, event: &ObjectWriteEvent) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            rest = tail;
            break;
        };
        match &tail[1..close] {
            "bucket" => out.push_str(&event.bucket),
            "key" => out.push_str(&event.key),
            "size" => out.push_str(&event.size.to_string()),
            _ => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }
    out.push_str(rest);
    out
}

/// An object-store trigger as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRuleSpec {
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default)]
    pub key_suffix: String,
    pub target: TargetId,
    pub payload: PayloadTemplate,
}

/// The one-shot deployment-time invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitSpec {
    /// Stable identity. Changing it causes the invocation to fire again.
    pub identity: String,
    pub target: TargetId,
    pub payload: InvocationPayload,
}

// ── Outputs ────────────────────────────────────────────────────────

/// Wiring values published once a deployment completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentOutputs {
    pub db_host: String,
    pub db_read_host: String,
    pub db_secret: String,
    pub cache_host: String,
    pub edge_host: String,
    pub internal_scope_id: String,
    pub object_store: String,
    pub admin_target: Option<TargetId>,
}
