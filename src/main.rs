//! Stratus CLI entrypoint.
//!
//! This is the main entrypoint for the stratus command-line tool.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use stratus_deploy::cli::{Cli, Commands, OutputFormatter, StateCommands};
use stratus_deploy::config::{
    find_config_file, ConfigHasher, ConfigParser, ConfigValidator, StackConfig, StateBackend,
};
use stratus_deploy::error::Result;
use stratus_deploy::graph::{GraphBuilder, Scheduler};
use stratus_deploy::planner::{ApplyExecutor, DeploymentPlan, StateDiffer};
use stratus_deploy::state::{LocalStateStore, RecordedState, S3StateStore, StateStore};
use stratus_deploy::{ControlPlaneClient, HttpProvisioner, Provisioner};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply { yes, allow_replace } => {
            cmd_apply(cli.config.as_ref(), yes, allow_replace, &formatter).await
        }
        Commands::Destroy { yes } => cmd_destroy(cli.config.as_ref(), yes, &formatter).await,
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new Stratus project in: {}", path.display());

    let config_path = path.join("stratus.stack.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    // Write config template
    let config_template = include_str!("../templates/stratus.stack.yaml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    // Write .env.example
    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    // Write/update .gitignore
    let gitignore_content = ".env\n.stratus/\n";
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".env") || !existing.contains(".stratus") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Stratus")?;
            if !existing.contains(".env") {
                writeln!(file, ".env")?;
            }
            if !existing.contains(".stratus") {
                writeln!(file, ".stratus/")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, gitignore_content)?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and fill in your API key");
    eprintln!("  2. Edit stratus.stack.yaml with your resource declarations");
    eprintln!("  3. Run 'stratus validate' to check your configuration");
    eprintln!("  4. Run 'stratus plan' to see what will be provisioned");
    eprintln!("  5. Run 'stratus apply' to provision your stack");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    // Load .env
    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    // Parse config
    let config = parser.load_file(&config_file)?;

    // Validate structure, then graph shape (cycles, unresolved references)
    let validator = ConfigValidator::new();
    let result = validator.validate(&config)?;
    if let Err(e) = GraphBuilder::new().build(&config.resources, None) {
        eprintln!("Graph check (ignores recorded imports): {e}");
    }

    if result.is_valid() {
        eprintln!("Configuration is valid!");
        if show_warnings && !result.warnings.is_empty() {
            eprintln!("\nWarnings:");
            for warning in &result.warnings {
                eprintln!("  - {warning}");
            }
        }
    }

    // Show summary
    eprintln!("\nConfiguration summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  Environment: {}", config.project.environment);
    eprintln!("  Resources: {}", config.resources.len());

    Ok(())
}

/// Show deployment plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;

    // Load state
    let state = state_store.load().await?;

    let plan = build_plan(&config, state.as_ref())?;

    // Output
    let output = formatter.format_plan(&plan);
    eprintln!("{output}");

    if detailed {
        eprintln!("Execution waves:");
        for (i, wave) in plan.waves.iter().enumerate() {
            eprintln!("  {i}: {}", wave.join(", "));
        }
        eprintln!("\nDetailed changes:");
        for op in plan.deletions.iter().chain(plan.operations.iter()) {
            eprintln!("  {op}");
        }
    }

    Ok(())
}

/// Apply deployment plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    allow_replace: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;

    // Load state
    let mut state = state_store.load().await?.unwrap_or_else(|| {
        RecordedState::new(&config.project.name, &config.project.environment)
    });

    let plan = build_plan(&config, Some(&state))?;

    if plan.is_empty() {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    // Show plan
    let output = formatter.format_plan(&plan);
    eprintln!("{output}");

    // Replacements need explicit confirmation
    plan.ensure_replacements_allowed(allow_replace)?;

    // Confirm
    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    // Execute plan with cooperative cancellation on ctrl-c
    let provisioner = create_provisioner(&config)?;
    let executor = ApplyExecutor::new(provisioner);

    let cancel = executor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested; in-flight operations will finish");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = executor.execute(&plan, &config, &mut state).await?;

    // Save state
    state_store.save(&state).await?;

    // Show result
    eprintln!("\n{}", formatter.format_report(&report));

    if report.incomplete {
        return Err(stratus_deploy::error::StratusError::Exec(
            stratus_deploy::error::ExecError::Incomplete {
                abandoned: report.abandoned,
            },
        ));
    }

    Ok(())
}

/// Destroy all recorded resources.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path).await?;

    let Some(mut state) = state_store.load().await? else {
        eprintln!("No state found; nothing to destroy.");
        return Ok(());
    };

    if state.is_empty() {
        eprintln!("No resources recorded; nothing to destroy.");
        return Ok(());
    }

    let plan = DeploymentPlan::destroy(&state);

    eprintln!("The following resources will be destroyed:");
    for op in &plan.deletions {
        eprintln!(
            "  - {} ({})",
            op.id,
            op.physical_id.as_deref().unwrap_or("no physical id")
        );
    }

    // Confirm
    if !auto_approve
        && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let provisioner = create_provisioner(&config)?;
    let executor = ApplyExecutor::new(provisioner);
    let report = executor.execute(&plan, &config, &mut state).await?;

    // Clear state only when everything went; otherwise keep the remainder.
    if state.is_empty() {
        state_store.delete().await?;
        eprintln!("\nAll resources destroyed.");
    } else {
        state_store.save(&state).await?;
        eprintln!("\n{}", formatter.format_report(&report));
    }

    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path).await?;

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load().await? {
                let output = formatter.format_state(&state);
                eprintln!("{output}");
            } else {
                eprintln!("No state found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder_str = holder.as_deref().unwrap_or("");
            let lock = state_store.acquire_lock(holder_str).await?;
            eprintln!("State locked: {}", lock.lock_id);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                // Force unlock by releasing whatever lock is present
                if let Some(lock_info) = state_store.get_lock_info().await? {
                    state_store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("State forcefully unlocked.");
                }
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Prompts for confirmation on stderr and checks the reply.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Builds graph, schedule, diff, and plan for the current configuration.
fn build_plan(config: &StackConfig, state: Option<&RecordedState>) -> Result<DeploymentPlan> {
    let graph = GraphBuilder::new().build(&config.resources, state)?;
    let schedule = Scheduler::new().schedule(&graph);

    let dependencies: HashMap<String, Vec<String>> = graph
        .ids()
        .iter()
        .map(|id| {
            (
                id.clone(),
                graph.dependencies_of(id).iter().cloned().collect(),
            )
        })
        .collect();

    let hasher = ConfigHasher::new();
    let config_hash = hasher.hash_stack(config);

    let diff = StateDiffer::new().diff(&config.resources, state);
    debug!(
        "Diff: {} creates, {} updates, {} replaces, {} deletes, {} unchanged",
        diff.creates, diff.updates, diff.replaces, diff.deletes, diff.unchanged
    );

    Ok(DeploymentPlan::from_diff(
        &diff,
        config,
        &schedule,
        &dependencies,
        state,
        &config_hash,
    ))
}

/// Loads configuration and creates the appropriate state store.
async fn load_config_and_state(
    config_path: Option<&PathBuf>,
) -> Result<(StackConfig, Box<dyn StateStore>)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    // Validate
    let validator = ConfigValidator::new();
    validator.validate(&config)?;

    // Create state store based on config
    let state_store: Box<dyn StateStore> = match config.state.backend {
        StateBackend::Local => {
            let path = config.state.path.as_ref().map_or_else(
                || {
                    config_file
                        .parent()
                        .unwrap_or_else(|| std::path::Path::new("."))
                        .join(".stratus")
                },
                PathBuf::from,
            );
            Box::new(LocalStateStore::with_base_dir(path))
        }
        StateBackend::S3 => {
            let bucket = config
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| stratus_deploy::StratusError::internal("S3 bucket not configured"))?;
            let prefix = config.state.prefix.as_deref();
            let region = config.state.region.as_deref();
            Box::new(S3StateStore::new(bucket, prefix, region).await?)
        }
    };

    Ok((config, state_store))
}

/// Creates the provisioning backend from configuration and environment.
fn create_provisioner(config: &StackConfig) -> Result<Arc<dyn Provisioner>> {
    let api_key = ConfigParser::get_api_key()?;
    let client = ControlPlaneClient::new(
        &config.backend.endpoint,
        &api_key,
        config.backend.timeout_secs,
    )?;

    Ok(Arc::new(HttpProvisioner::new(
        client,
        config.qualified_name(),
    )))
}
