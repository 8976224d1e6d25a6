//! Usage accounting and audit events.

mod audit;
mod ledger;

pub use audit::{AuditLogger, EmbeddingEvent, InMemoryAuditLogger, TracingAuditLogger};
pub use ledger::{UsageLedger, UsageRecord, UsageSummary};
