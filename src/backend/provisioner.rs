//! Provisioner trait: the seam to the external provisioning backend.
//!
//! The core treats the backend as an opaque, potentially slow, potentially
//! failing remote collaborator exposing exactly two operations: apply a
//! resource configuration and delete a physical resource. Everything the
//! backend does internally (how a distribution or a VPC actually comes to
//! exist) is out of scope.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::ResourceKind;
use crate::error::Result;

/// A fully resolved apply request for a single resource.
///
/// All `${id.output}` references have been substituted with concrete
/// values before the request is built.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    /// Logical id of the resource (for error reporting and tagging).
    pub logical_id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Existing physical id for in-place updates; `None` for creates.
    pub physical_id: Option<String>,
    /// Resolved configuration attributes.
    pub attributes: BTreeMap<String, Value>,
}

/// A confirmed apply result from the backend.
#[derive(Debug, Clone)]
pub struct Applied {
    /// Physical identifier assigned (or retained) by the backend.
    pub physical_id: String,
    /// Outputs exported by the resource.
    pub outputs: HashMap<String, String>,
}

/// Trait for provisioning backends.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Applies a resource configuration, creating or updating the physical
    /// resource, and returns its identity and outputs.
    ///
    /// A returned error means the backend did not confirm the operation;
    /// the caller must not record it.
    async fn apply(&self, request: &ApplyRequest) -> Result<Applied>;

    /// Deletes a physical resource.
    ///
    /// Deleting an already-absent resource is not an error at this layer;
    /// callers decide how to treat `BackendError::NotFound`.
    async fn delete(&self, kind: ResourceKind, physical_id: &str) -> Result<()>;
}

impl ApplyRequest {
    /// Creates a request for a fresh resource.
    #[must_use]
    pub fn create(
        logical_id: impl Into<String>,
        kind: ResourceKind,
        attributes: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            physical_id: None,
            attributes,
        }
    }

    /// Creates a request for an in-place update of an existing resource.
    #[must_use]
    pub fn update(
        logical_id: impl Into<String>,
        kind: ResourceKind,
        physical_id: impl Into<String>,
        attributes: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            physical_id: Some(physical_id.into()),
            attributes,
        }
    }

    /// Returns true if this request updates an existing resource.
    #[must_use]
    pub const fn is_update(&self) -> bool {
        self.physical_id.is_some()
    }
}
