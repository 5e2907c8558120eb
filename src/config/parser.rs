//! Configuration parser for loading stack documents.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, StratusError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::StackConfig;

/// Configuration parser for loading stack configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(StratusError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StratusError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<StackConfig> {
        debug!("Parsing YAML configuration");

        let config: StackConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StratusError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed configuration for project: {}",
            config.project.name
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format:
    /// `STRATUS_<SECTION>_<KEY>` (e.g., `STRATUS_PROJECT_NAME`)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let mut config = self.load_file(path)?;

        // Apply environment overrides
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut StackConfig) {
        // Project overrides
        if let Ok(name) = std::env::var("STRATUS_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Ok(env) = std::env::var("STRATUS_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        if let Ok(region) = std::env::var("STRATUS_PROJECT_REGION") {
            debug!("Overriding project.region from environment");
            config.project.region = Some(region);
        }

        // State overrides
        if let Ok(bucket) = std::env::var("STRATUS_STATE_BUCKET") {
            debug!("Overriding state.bucket from environment");
            config.state.bucket = Some(bucket);
        }

        if let Ok(prefix) = std::env::var("STRATUS_STATE_PREFIX") {
            debug!("Overriding state.prefix from environment");
            config.state.prefix = Some(prefix);
        }

        // Backend overrides
        if let Ok(endpoint) = std::env::var("STRATUS_BACKEND_ENDPOINT") {
            debug!("Overriding backend.endpoint from environment");
            config.backend.endpoint = endpoint;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StratusError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the control plane API key from environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not set.
    pub fn get_api_key() -> Result<String> {
        std::env::var("STRATUS_API_KEY").map_err(|_| {
            StratusError::Config(ConfigError::MissingEnvVar {
                name: String::from("STRATUS_API_KEY"),
            })
        })
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "stratus.stack.yaml",
    "stratus.stack.yml",
    "stack.yaml",
    "stack.yml",
];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StratusError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{ResourceKind, StateBackend};

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: test-project
state:
  backend: local
backend:
  endpoint: http://localhost:8400/v1
resources: []
";
        let parser = ConfigParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.name, "test-project");
        assert_eq!(config.project.environment, "dev");
        assert_eq!(config.backend.timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
project:
  name: website
  environment: prod
  region: us-east-1

state:
  backend: s3
  bucket: stratus-state
  prefix: website/prod

backend:
  endpoint: https://controlplane.internal/v1
  timeout_secs: 60

resources:
  - id: zone
    kind: hosted_zone
    attributes:
      domain_name: example.com

  - id: cert
    kind: certificate
    attributes:
      domain_name: example.com
      zone_id: "${zone.zone_id}"

  - id: assets
    kind: bucket
    attributes:
      bucket_name: website-assets

  - id: cdn
    kind: distribution
    depends_on: [cert]
    attributes:
      origin_domain: "${assets.bucket_domain}"
      certificate_arn: "${cert.certificate_arn}"
      aliases:
        - example.com
        - www.example.com
"#;
        let parser = ConfigParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.name, "website");
        assert_eq!(config.state.backend, StateBackend::S3);
        assert_eq!(config.resources.len(), 4);
        assert_eq!(config.resources[0].kind, ResourceKind::HostedZone);
        assert_eq!(config.resources[3].depends_on, vec!["cert"]);
        assert_eq!(
            config.resources[3].attr_str("certificate_arn"),
            Some("${cert.certificate_arn}")
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let yaml = r"
project:
  name: test
state:
  backend: local
backend:
  endpoint: http://localhost:8400/v1
resources:
  - id: thing
    kind: quantum_tunnel
";
        let parser = ConfigParser::new();
        assert!(parser.parse_yaml(yaml, None).is_err());
    }
}
