//! UCON.FABRIC Core Types
//!
//! Pure types shared by every component: content hashes, policy
//! fingerprints, instance identifiers, clocks, and the lock primitives the
//! repository and runtime use to serialize work per key.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod error;
pub mod fs;
pub mod hash;
pub mod id;
pub mod lock;
pub mod time;

// Re-exports
pub use canonical::{canonical_json, to_canonical_json};
pub use error::{CoreError, CoreResult};
pub use hash::{ContentHash, HashError};
pub use id::{DedupKey, Fingerprint, InstanceId};
pub use lock::{FileLock, KeyedLocks};
pub use time::{Clock, FixedClock, SystemClock, parse_policy_datetime};
