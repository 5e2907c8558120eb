//! Configuration hashing for change detection.
//!
//! This module provides deterministic hashing of resource specifications
//! to detect changes between deployment passes and enable idempotent
//! operations.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::spec::{ResourceSpec, StackConfig};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire stack configuration.
    ///
    /// This hash changes when any declared resource changes.
    #[must_use]
    pub fn hash_stack(&self, config: &StackConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.project.name.as_bytes());
        hasher.update(config.project.environment.as_bytes());
        if let Some(region) = &config.project.region {
            hasher.update(region.as_bytes());
        }

        for resource in &config.resources {
            hasher.update(self.hash_spec(resource).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single resource spec.
    ///
    /// The hash covers the kind, explicit dependencies (sorted), and the
    /// attribute tree in canonical key order, so it is stable across
    /// re-serialization.
    #[must_use]
    pub fn hash_spec(&self, spec: &ResourceSpec) -> String {
        let mut hasher = Sha256::new();

        hasher.update(spec.id.as_bytes());
        hasher.update(spec.kind.as_str().as_bytes());

        // Explicit dependencies (sorted for determinism)
        let mut deps: Vec<_> = spec.depends_on.iter().collect();
        deps.sort();
        for dep in deps {
            hasher.update(dep.as_bytes());
        }

        // Attributes are a BTreeMap, already in canonical key order
        for (key, value) in &spec.attributes {
            hasher.update(key.as_bytes());
            Self::hash_value(&mut hasher, value);
        }

        hex::encode(hasher.finalize())
    }

    /// Hashes a JSON value tree with unambiguous type tags.
    fn hash_value(hasher: &mut Sha256, value: &Value) {
        match value {
            Value::Null => hasher.update([0u8]),
            Value::Bool(b) => {
                hasher.update([1u8]);
                hasher.update(if *b { [1u8] } else { [0u8] });
            }
            Value::Number(n) => {
                hasher.update([2u8]);
                hasher.update(n.to_string().as_bytes());
            }
            Value::String(s) => {
                hasher.update([3u8]);
                hasher.update(s.len().to_be_bytes());
                hasher.update(s.as_bytes());
            }
            Value::Array(items) => {
                hasher.update([4u8]);
                hasher.update(items.len().to_be_bytes());
                for item in items {
                    Self::hash_value(hasher, item);
                }
            }
            Value::Object(map) => {
                hasher.update([5u8]);
                hasher.update(map.len().to_be_bytes());
                for (key, item) in map {
                    hasher.update(key.len().to_be_bytes());
                    hasher.update(key.as_bytes());
                    Self::hash_value(hasher, item);
                }
            }
        }
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        // Use constant-time comparison to avoid timing attacks
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
