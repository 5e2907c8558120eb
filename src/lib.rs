// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stratus Deploy
//!
//! A declarative, dependency-ordered provisioning planner for cloud
//! resource stacks.
//!
//! ## Overview
//!
//! Stratus takes a declarative set of resource specifications with typed
//! references between them, resolves creation order by dependency, and
//! drives a provisioning backend to make the target environment match:
//!
//! - Declare a stack (zones, certificates, buckets, distributions, DNS
//!   records, APIs, functions, networks) in a YAML configuration file
//! - References like `${cert.certificate_arn}` become dependency edges and
//!   are substituted with real outputs at apply time
//! - Resources are diffed against recorded state; only what changed is
//!   touched, and resources no longer declared are torn down
//!
//! ## Architecture
//!
//! A deployment pass flows through four stages:
//!
//! 1. **Graph**: scan references, build a DAG, reject cycles
//! 2. **Diff**: compare spec hashes against recorded state
//! 3. **Plan**: order operations topologically, deletions first
//! 4. **Execute**: apply wave by wave, independent branches concurrently
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation, and hashing
//! - [`graph`]: Dependency graph construction and scheduling
//! - [`resolver`]: Reference scanning and output substitution
//! - [`planner`]: Diff computation, plan construction, and execution
//! - [`backend`]: The provisioning backend seam and HTTP client
//! - [`state`]: Recorded state storage backends (local, S3)
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: website
//!   environment: prod
//!
//! resources:
//!   - id: zone
//!     kind: hosted_zone
//!     attributes:
//!       domain_name: example.com
//!   - id: cert
//!     kind: certificate
//!     attributes:
//!       domain_name: example.com
//!       zone_id: "${zone.zone_id}"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod planner;
pub mod resolver;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{Applied, ApplyRequest, ControlPlaneClient, HttpProvisioner, Provisioner};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, ResourceKind, StackConfig};
pub use error::{Result, StratusError};
pub use graph::{DependencyGraph, GraphBuilder, Schedule, Scheduler};
pub use planner::{ApplyExecutor, DeploymentPlan, DiffOp, PassReport, StateDiffer};
pub use resolver::{OutputTable, Reference};
pub use state::{LocalStateStore, RecordedState, S3StateStore, StateStore};
