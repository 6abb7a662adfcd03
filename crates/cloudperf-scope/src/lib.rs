//! cloudperf-scope — target registry and least-privilege scope policies.
//!
//! Every compute target carries an explicit [`NetworkScope`] and
//! [`CredentialScope`]. Scopes are assigned per [`TargetKind`] when the
//! registry is built and never change afterwards; reaching a data store or
//! resolving a secret requires presenting the scope object, so a grant that
//! was not made at construction cannot be exercised later.
//!
//! # Architecture
//!
//! ```text
//! TargetConfig[] ──► ScopePolicy::assign(kind) ──► TargetRegistry (immutable)
//!                                                    │
//!                     StoreCatalog::connect(&NetworkScope, store)
//!                     SecretVault::resolve(&CredentialScope, secret)
//! ```
//!
//! [`TargetKind`]: cloudperf_core::TargetKind

pub mod budget;
pub mod credential;
pub mod error;
pub mod network;
pub mod policy;
pub mod registry;

pub use budget::ResourceBudget;
pub use credential::{CredentialScope, SecretRef, SecretValue, SecretVault};
pub use error::{ScopeError, ScopeResult};
pub use network::{Ipv4Cidr, NetworkScope, StoreCatalog, StoreGrant, StoreKind};
pub use policy::ScopePolicy;
pub use registry::{ResolvedScope, Target, TargetRegistry};
