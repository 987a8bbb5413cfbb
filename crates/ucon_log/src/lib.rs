//! UCON.FABRIC Audit Log
//!
//! Append-only, hash-chained JSON-lines streams recording every access
//! decision, deletion and submission. Records are never edited or removed;
//! ordering within a stream is write order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod error;
pub mod record;
pub mod stream;

pub use chain::{ChainReport, ChainVerifier, verify_records};
pub use error::{AuditError, AuditResult};
pub use record::{AuditEntry, AuditRecord, RecordKind};
pub use stream::{AuditLog, GENERATED_DIR, StreamId};
