//! State management module for the Stratus provisioning system.
//!
//! This module provides persistent state storage for tracking provisioned
//! resources: the logical-to-physical mapping, applied configuration
//! hashes, exported outputs, and pass history.

mod local;
mod lock;
mod s3;
mod store;
mod types;

pub use local::LocalStateStore;
pub use lock::{generate_holder_id, LockInfo, LOCK_EXPIRY_SECS};
pub use s3::S3StateStore;
pub use store::StateStore;
pub use types::{
    PassHistoryEntry, PassOperation, RecordedState, ResourceRecord, ResourceStatus, STATE_VERSION,
};
