//! Configuration module for the Stratus provisioning system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `stratus.stack.yaml`
//! - The resource kind capability catalog
//! - Validation of configuration values
//! - Computing configuration hashes for change detection

mod catalog;
mod hash;
mod parser;
mod spec;
mod validator;

pub use catalog::{capabilities, exports_output, is_immutable, KindCapabilities};
pub use hash::ConfigHasher;
pub use parser::{find_config_file, ConfigParser, DEFAULT_CONFIG_FILES};
pub use spec::{
    BackendConfig, ProjectConfig, ResourceKind, ResourceSpec, StackConfig, StateBackend,
    StateConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
