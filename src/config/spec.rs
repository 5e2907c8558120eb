//! Configuration specification types for the provisioning system.
//!
//! This module defines all the structs that map to the `stratus.stack.yaml`
//! file. These types are designed to be declarative and fully describe the
//! desired composition of a resource stack.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The root configuration structure for a Stratus stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    pub state: StateConfig,
    /// Provisioning backend configuration.
    pub backend: BackendConfig,
    /// Declared resources, in declaration order.
    pub resources: Vec<ResourceSpec>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Region hint forwarded to the provisioning backend.
    #[serde(default)]
    pub region: Option<String>,
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type (local or s3).
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state file path (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
}

/// Provisioning backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Base URL of the provisioning control plane API.
    pub endpoint: String,
    /// Request timeout in seconds.
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

/// A single declared resource.
///
/// Immutable once declared for a given deployment pass: the planner and
/// executor never mutate specs, only derive operations from them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSpec {
    /// Logical id, unique within the stack.
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Explicit dependencies in addition to scanned references.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Kind-specific configuration attributes.
    ///
    /// String values may embed `${id.output}` references to other
    /// resources' outputs.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

/// Resource kinds understood by the capability catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// DNS hosted zone.
    HostedZone,
    /// TLS certificate.
    Certificate,
    /// Object storage bucket.
    Bucket,
    /// Content delivery distribution.
    Distribution,
    /// DNS record in a hosted zone.
    DnsRecord,
    /// HTTP API gateway.
    RestApi,
    /// Serverless function.
    Function,
    /// Private network.
    Vpc,
    /// Interface endpoint inside a private network.
    VpcEndpoint,
    /// Custom domain mapping onto an API.
    DomainMapping,
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

const fn default_backend_timeout() -> u64 {
    30
}

impl StackConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns a resource spec by logical id.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Returns all declared logical ids in declaration order.
    #[must_use]
    pub fn resource_ids(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.id.as_str()).collect()
    }
}

impl ResourceSpec {
    /// Returns an attribute as a string slice, if present and a string.
    #[must_use]
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Returns the full physical name prefix for this resource.
    #[must_use]
    pub fn full_name(&self, project: &ProjectConfig) -> String {
        format!("{}-{}-{}", project.name, project.environment, self.id)
    }
}

impl ResourceKind {
    /// Returns the canonical snake_case name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostedZone => "hosted_zone",
            Self::Certificate => "certificate",
            Self::Bucket => "bucket",
            Self::Distribution => "distribution",
            Self::DnsRecord => "dns_record",
            Self::RestApi => "rest_api",
            Self::Function => "function",
            Self::Vpc => "vpc",
            Self::VpcEndpoint => "vpc_endpoint",
            Self::DomainMapping => "domain_mapping",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_through_serde() {
        let kind: ResourceKind =
            serde_json::from_str("\"hosted_zone\"").expect("kind should deserialize");
        assert_eq!(kind, ResourceKind::HostedZone);
        assert_eq!(
            serde_json::to_string(&ResourceKind::VpcEndpoint).expect("kind should serialize"),
            "\"vpc_endpoint\""
        );
    }

    #[test]
    fn test_qualified_name() {
        let config = StackConfig {
            project: ProjectConfig {
                name: String::from("website"),
                environment: String::from("prod"),
                region: None,
            },
            state: StateConfig {
                backend: StateBackend::Local,
                bucket: None,
                prefix: None,
                region: None,
                path: None,
            },
            backend: BackendConfig {
                endpoint: String::from("http://localhost:8400/v1"),
                timeout_secs: 30,
            },
            resources: vec![],
        };

        assert_eq!(config.qualified_name(), "website-prod");
    }

    #[test]
    fn test_attr_str() {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            String::from("domain_name"),
            Value::String(String::from("example.com")),
        );
        attributes.insert(String::from("ttl"), Value::from(300));

        let spec = ResourceSpec {
            id: String::from("zone"),
            kind: ResourceKind::HostedZone,
            depends_on: vec![],
            attributes,
        };

        assert_eq!(spec.attr_str("domain_name"), Some("example.com"));
        assert_eq!(spec.attr_str("ttl"), None);
        assert_eq!(spec.attr_str("missing"), None);
    }
}
