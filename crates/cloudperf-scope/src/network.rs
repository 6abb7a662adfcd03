//! Network isolation: CIDR ranges, network scopes, and store reachability.
//!
//! The relational cluster listens on 3306 and the cache cluster on 6379.
//! A scope that lists either port as an allowed egress must also sit on the
//! internal subnets and accept ingress only from inside the internal range.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ScopeError, ScopeResult};

pub const RELATIONAL_PORT: u16 = 3306;
pub const CACHE_PORT: u16 = 6379;

/// Ports a store-reaching scope may open.
pub const STORE_PORTS: [u16; 2] = [RELATIONAL_PORT, CACHE_PORT];

/// Reference to a private subnet.
pub type SubnetRef = String;

// ── CIDR ───────────────────────────────────────────────────────────

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> ScopeResult<Self> {
        if prefix > 32 {
            return Err(ScopeError::InvalidCidr {
                value: format!("{addr}/{prefix}"),
                reason: "prefix length exceeds 32".to_string(),
            });
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Ok(Self { network, prefix })
    }

    /// `0.0.0.0/0`.
    pub fn any() -> Self {
        Self {
            network: Ipv4Addr::UNSPECIFIED,
            prefix: 0,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains_addr(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.network)
    }

    /// Whether `other` lies entirely within this network.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && self.contains_addr(other.network)
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ScopeError::InvalidCidr {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let (addr, prefix) = s.split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid("bad address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix length"))?;
        Ipv4Cidr::new(addr, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = ScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

// ── Stores ─────────────────────────────────────────────────────────

/// A shared backing store behind the internal network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Relational,
    Cache,
}

impl StoreKind {
    pub const ALL: [StoreKind; 2] = [StoreKind::Relational, StoreKind::Cache];

    pub fn port(&self) -> u16 {
        match self {
            StoreKind::Relational => RELATIONAL_PORT,
            StoreKind::Cache => CACHE_PORT,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Relational => f.write_str("relational"),
            StoreKind::Cache => f.write_str("cache"),
        }
    }
}

// ── Scope ──────────────────────────────────────────────────────────

/// Where a target sits on the network and what it may reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkScope {
    pub subnets: BTreeSet<SubnetRef>,
    pub allowed_egress_ports: BTreeSet<u16>,
    pub ingress_allowed_from: Ipv4Cidr,
}

impl NetworkScope {
    /// No subnets, no store ports. Used for targets outside the private network.
    pub fn isolated() -> Self {
        Self {
            subnets: BTreeSet::new(),
            allowed_egress_ports: BTreeSet::new(),
            ingress_allowed_from: Ipv4Cidr::any(),
        }
    }

    /// Attached to the private subnets with both store ports open.
    pub fn internal<I, S>(subnets: I, internal: Ipv4Cidr) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SubnetRef>,
    {
        Self {
            subnets: subnets.into_iter().map(Into::into).collect(),
            allowed_egress_ports: STORE_PORTS.into_iter().collect(),
            ingress_allowed_from: internal,
        }
    }

    pub fn reaches(&self, store: StoreKind) -> bool {
        !self.subnets.is_empty() && self.allowed_egress_ports.contains(&store.port())
    }

    pub fn reaches_any_store(&self) -> bool {
        StoreKind::ALL.iter().any(|s| self.reaches(*s))
    }

    /// Check the store-reachability invariant against the internal range.
    pub fn validate(&self, target: &str, internal: &Ipv4Cidr) -> ScopeResult<()> {
        let opens_store_port = self
            .allowed_egress_ports
            .iter()
            .any(|p| STORE_PORTS.contains(p));
        if !opens_store_port {
            return Ok(());
        }

        let invalid = |reason: String| ScopeError::InvalidScope {
            target: target.to_string(),
            reason,
        };
        if self.subnets.is_empty() {
            return Err(invalid("store ports opened without internal subnets".to_string()));
        }
        if !internal.contains(&self.ingress_allowed_from) {
            return Err(invalid(format!(
                "ingress {} is outside the internal range {internal}",
                self.ingress_allowed_from
            )));
        }
        if let Some(port) = self
            .allowed_egress_ports
            .iter()
            .find(|p| !STORE_PORTS.contains(*p))
        {
            return Err(invalid(format!(
                "port {port} is not a store port; store-reaching scopes may only open 3306 and 6379"
            )));
        }
        Ok(())
    }
}

// ── Catalog ────────────────────────────────────────────────────────

/// Proof that a scope was allowed to open a connection to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreGrant {
    pub store: StoreKind,
    /// `host:port` of the store endpoint.
    pub endpoint: String,
}

/// Store endpoints behind the internal network.
#[derive(Debug, Clone)]
pub struct StoreCatalog {
    internal: Ipv4Cidr,
    relational_host: String,
    cache_host: String,
}

impl StoreCatalog {
    pub fn new(internal: Ipv4Cidr, relational_host: &str, cache_host: &str) -> Self {
        Self {
            internal,
            relational_host: relational_host.to_string(),
            cache_host: cache_host.to_string(),
        }
    }

    /// Open a store on behalf of a scope. Fails unless the scope was granted it.
    pub fn connect(&self, scope: &NetworkScope, store: StoreKind) -> ScopeResult<StoreGrant> {
        let denied = |reason: &str| ScopeError::NetworkDenied {
            store: store.to_string(),
            reason: reason.to_string(),
        };
        if scope.subnets.is_empty() {
            return Err(denied("scope is not attached to the internal subnets"));
        }
        if !scope.allowed_egress_ports.contains(&store.port()) {
            return Err(denied("store port is not an allowed egress"));
        }
        if !self.internal.contains(&scope.ingress_allowed_from) {
            return Err(denied("scope ingress lies outside the internal range"));
        }

        let host = match store {
            StoreKind::Relational => &self.relational_host,
            StoreKind::Cache => &self.cache_host,
        };
        let endpoint = format!("{host}:{}", store.port());
        debug!(%store, %endpoint, "store connection granted");
        Ok(StoreGrant { store, endpoint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal() -> Ipv4Cidr {
        "10.0.0.0/16".parse().unwrap()
    }

    #[test]
    fn cidr_parses_and_normalizes() {
        let cidr: Ipv4Cidr = "10.0.5.7/16".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert!(cidr.contains_addr("10.0.255.1".parse().unwrap()));
        assert!(!cidr.contains_addr("10.1.0.1".parse().unwrap()));
    }

    #[test]
    fn cidr_rejects_malformed() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("ten/8".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn cidr_containment() {
        let outer = internal();
        assert!(outer.contains(&"10.0.1.0/24".parse().unwrap()));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&"10.0.0.0/8".parse().unwrap()));
        assert!(!outer.contains(&Ipv4Cidr::any()));
    }

    #[test]
    fn internal_scope_reaches_both_stores() {
        let scope = NetworkScope::internal(["private-a"], internal());
        assert!(scope.reaches(StoreKind::Relational));
        assert!(scope.reaches(StoreKind::Cache));
        assert!(scope.validate("api", &internal()).is_ok());
    }

    #[test]
    fn isolated_scope_reaches_nothing() {
        let scope = NetworkScope::isolated();
        assert!(!scope.reaches_any_store());
        assert!(scope.validate("web", &internal()).is_ok());
    }

    #[test]
    fn store_scope_with_public_ingress_is_invalid() {
        let mut scope = NetworkScope::internal(["private-a"], internal());
        scope.ingress_allowed_from = Ipv4Cidr::any();
        assert!(matches!(
            scope.validate("api", &internal()),
            Err(ScopeError::InvalidScope { .. })
        ));
    }

    #[test]
    fn store_scope_with_extra_port_is_invalid() {
        let mut scope = NetworkScope::internal(["private-a"], internal());
        scope.allowed_egress_ports.insert(22);
        let err = scope.validate("api", &internal()).unwrap_err();
        assert!(err.to_string().contains("port 22"));
    }

    #[test]
    fn catalog_grants_only_scoped_stores() {
        let catalog = StoreCatalog::new(internal(), "rds.internal", "redis.internal");
        let scope = NetworkScope::internal(["private-a"], internal());

        let grant = catalog.connect(&scope, StoreKind::Relational).unwrap();
        assert_eq!(grant.endpoint, "rds.internal:3306");

        let denied = catalog.connect(&NetworkScope::isolated(), StoreKind::Cache);
        assert!(matches!(denied, Err(ScopeError::NetworkDenied { .. })));
    }

    #[test]
    fn catalog_denies_cache_when_only_relational_port_open() {
        let catalog = StoreCatalog::new(internal(), "rds.internal", "redis.internal");
        let mut scope = NetworkScope::internal(["private-a"], internal());
        scope.allowed_egress_ports.remove(&CACHE_PORT);

        assert!(catalog.connect(&scope, StoreKind::Relational).is_ok());
        assert!(catalog.connect(&scope, StoreKind::Cache).is_err());
    }
}
