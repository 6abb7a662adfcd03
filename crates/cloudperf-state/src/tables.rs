//! redb table definitions.
//!
//! All tables use `&str` keys and JSON `&[u8]` values.

use redb::TableDefinition;

/// Init invocation records keyed by identity.
pub const INIT_INVOCATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("init_invocations");

/// Ingestion cycles keyed by zero-padded sequence number.
pub const INGESTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("ingestions");

/// Idempotency claims keyed by idempotency key.
pub const IDEMPOTENCY: TableDefinition<&str, &[u8]> = TableDefinition::new("idempotency");

/// Completed deployments keyed by stack name.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Counters keyed by name.
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Shape shared by every table above.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
