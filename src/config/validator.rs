//! Configuration validation for stack documents.
//!
//! This module provides structural validation of stack configurations,
//! ensuring all values are valid and consistent before graph construction.
//! Reference resolution (whether `${id.output}` targets exist) belongs to
//! the dependency graph builder, not here.

use crate::error::{ConfigError, Result, StratusError};
use std::collections::HashSet;
use tracing::debug;

use super::catalog;
use super::spec::{ResourceSpec, StackConfig, StateBackend};

/// Validator for stack configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a stack configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &StackConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_backend(&config.backend, &mut result);
        Self::validate_resources(&config.resources, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StratusError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(project: &super::spec::ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: String::from("Project name cannot be empty"),
            });
        } else if !is_valid_name(&project.name) {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            });
        }

        if !is_valid_name(&project.environment) {
            result.errors.push(ValidationError {
                field: String::from("project.environment"),
                message: format!(
                    "Environment '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.environment
                ),
            });
        }
    }

    /// Validates state backend configuration.
    fn validate_state(state: &super::spec::StateConfig, result: &mut ValidationResult) {
        if state.backend == StateBackend::S3 && state.bucket.is_none() {
            result.errors.push(ValidationError {
                field: String::from("state.bucket"),
                message: String::from("S3 state backend requires a bucket name"),
            });
        }

        if state.backend == StateBackend::Local && state.bucket.is_some() {
            result
                .warnings
                .push(String::from("state.bucket is ignored for the local backend"));
        }
    }

    /// Validates provisioning backend configuration.
    fn validate_backend(backend: &super::spec::BackendConfig, result: &mut ValidationResult) {
        if backend.endpoint.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("backend.endpoint"),
                message: String::from("Backend endpoint cannot be empty"),
            });
        } else if !backend.endpoint.starts_with("http://") && !backend.endpoint.starts_with("https://")
        {
            result.errors.push(ValidationError {
                field: String::from("backend.endpoint"),
                message: format!(
                    "Backend endpoint '{}' must be an http(s) URL",
                    backend.endpoint
                ),
            });
        }

        if backend.timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("backend.timeout_secs"),
                message: String::from("Backend timeout must be at least 1 second"),
            });
        }
    }

    /// Validates the declared resources.
    fn validate_resources(resources: &[ResourceSpec], result: &mut ValidationResult) {
        let mut seen: HashSet<&str> = HashSet::new();

        for resource in resources {
            let field = format!("resources.{}", resource.id);

            if resource.id.is_empty() {
                result.errors.push(ValidationError {
                    field: String::from("resources.id"),
                    message: String::from("Resource id cannot be empty"),
                });
                continue;
            }

            if !is_valid_name(&resource.id) {
                result.errors.push(ValidationError {
                    field: field.clone(),
                    message: format!(
                        "Resource id '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        resource.id
                    ),
                });
            }

            if !seen.insert(resource.id.as_str()) {
                result.errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("Duplicate resource id: {}", resource.id),
                });
            }

            if resource.depends_on.iter().any(|d| d == &resource.id) {
                result.errors.push(ValidationError {
                    field: format!("{field}.depends_on"),
                    message: format!("Resource '{}' cannot depend on itself", resource.id),
                });
            }

            Self::validate_attributes(resource, &field, result);
        }
    }

    /// Validates kind-specific attributes against the capability catalog.
    fn validate_attributes(
        resource: &ResourceSpec,
        field: &str,
        result: &mut ValidationResult,
    ) {
        let caps = catalog::capabilities(resource.kind);

        for required in caps.required {
            if !resource.attributes.contains_key(*required) {
                result.errors.push(ValidationError {
                    field: format!("{field}.attributes.{required}"),
                    message: format!(
                        "Resource '{}' ({}) is missing required attribute '{required}'",
                        resource.id, resource.kind
                    ),
                });
            }
        }

        // Kind-specific advisory checks
        match resource.kind {
            super::spec::ResourceKind::Certificate => {
                if !resource.attributes.contains_key("zone_id") {
                    result.warnings.push(format!(
                        "Certificate '{}' has no zone_id; validation records must be created manually",
                        resource.id
                    ));
                }
            }
            super::spec::ResourceKind::DnsRecord => {
                if let Some(target) = resource.attr_str("target")
                    && !target.contains("${")
                {
                    result.warnings.push(format!(
                        "DNS record '{}' targets the literal '{target}' instead of another resource's output",
                        resource.id
                    ));
                }
            }
            _ => {}
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    let mut chars = name.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return false;
        }
    }

    // Cannot end with hyphen
    if name.ends_with('-') {
        return false;
    }

    // Cannot have consecutive hyphens
    if name.contains("--") {
        return false;
    }

    true
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{
        BackendConfig, ProjectConfig, ResourceKind, StateConfig,
    };
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn base_config() -> StackConfig {
        StackConfig {
            project: ProjectConfig {
                name: String::from("website"),
                environment: String::from("dev"),
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
        }
    }

    fn zone_spec(id: &str) -> ResourceSpec {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            String::from("domain_name"),
            Value::String(String::from("example.com")),
        );
        ResourceSpec {
            id: id.to_string(),
            kind: ResourceKind::HostedZone,
            depends_on: vec![],
            attributes,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let mut config = base_config();
        config.resources.push(zone_spec("zone"));

        let validator = ConfigValidator::new();
        let result = validator.validate(&config).expect("validation should pass");
        assert!(result.is_valid());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut config = base_config();
        config.resources.push(zone_spec("zone"));
        config.resources.push(zone_spec("zone"));

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_missing_required_attribute_rejected() {
        let mut config = base_config();
        config.resources.push(ResourceSpec {
            id: String::from("zone"),
            kind: ResourceKind::HostedZone,
            depends_on: vec![],
            attributes: BTreeMap::new(),
        });

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut config = base_config();
        let mut spec = zone_spec("zone");
        spec.depends_on = vec![String::from("zone")];
        config.resources.push(spec);

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let mut config = base_config();
        config.state.backend = StateBackend::S3;

        let validator = ConfigValidator::new();
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_literal_dns_target_warns() {
        let mut config = base_config();
        let mut attributes = BTreeMap::new();
        attributes.insert(
            String::from("zone_id"),
            Value::String(String::from("Z123")),
        );
        attributes.insert(
            String::from("record_name"),
            Value::String(String::from("example.com")),
        );
        attributes.insert(
            String::from("target"),
            Value::String(String::from("d111.cloudfront.example")),
        );
        config.resources.push(ResourceSpec {
            id: String::from("dns"),
            kind: ResourceKind::DnsRecord,
            depends_on: vec![],
            attributes,
        });

        let validator = ConfigValidator::new();
        let result = validator.validate(&config).expect("validation should pass");
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("cdn"));
        assert!(is_valid_name("site-bucket-2"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Cdn")); // uppercase
        assert!(!is_valid_name("2cdn")); // starts with number
        assert!(!is_valid_name("cdn_edge")); // underscore
        assert!(!is_valid_name("cdn-")); // ends with hyphen
        assert!(!is_valid_name("cdn--edge")); // consecutive hyphens
    }
}
