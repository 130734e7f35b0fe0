mod manifest;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Map;

use cumulus_core::{ProviderConfig, ResourceData, ResourceTimeouts};
use cumulus_provider_sim::resources::{ResourceType, TypeKind};
use cumulus_provider_sim::{SimCloud, SimProvider, SimSettings};
use cumulus_state::{BackendConfig, LockInfo, StateBackend, StateFile, create_backend};

use manifest::{Manifest, ResourceSpec};

#[derive(Parser)]
#[command(name = "cumulus")]
#[command(about = "Drive resource lifecycles against a simulated cloud", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Snapshot file of the simulated cloud
    #[arg(long, global = true, env = "CUMULUS_CLOUD", default_value = "cumulus.cloud.json")]
    cloud: PathBuf,

    /// Provider configuration file (JSON)
    #[arg(long, global = true, env = "CUMULUS_PROVIDER_CONFIG")]
    provider_config: Option<PathBuf>,

    /// State file
    #[arg(long, global = true, env = "CUMULUS_STATE", default_value = "cumulus.state.json")]
    state: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, update or replace resources to match the manifest
    Apply {
        /// Path to manifest file
        #[arg(default_value = "cumulus.json")]
        file: PathBuf,
    },
    /// Re-read every resource in the state from the cloud
    Refresh,
    /// Delete every resource in the state
    Destroy,
    /// Print the resources in the state
    Show,
    /// List the supported resource types
    Types,
    /// Remove a stale state lock
    ForceUnlock {
        lock_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Apply { file } => run_apply(&cli, file).await,
        Commands::Refresh => run_refresh(&cli).await,
        Commands::Destroy => run_destroy(&cli).await,
        Commands::Show => run_show(&cli).await,
        Commands::Types => run_types(),
        Commands::ForceUnlock { lock_id } => run_force_unlock(&cli, lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

// =============================================================================
// Session
// =============================================================================

/// Everything one command works with: the cloud, the provider and the state
struct Session {
    cloud: SimCloud,
    cloud_path: PathBuf,
    provider: SimProvider,
    backend: Box<dyn StateBackend>,
}

impl Session {
    async fn open(cli: &Cli) -> Result<Self> {
        let config = ProviderConfig::resolve(cli.provider_config.as_deref())
            .context("Failed to load provider configuration")?;
        let settings = SimSettings {
            region: config.region.clone(),
            ..Default::default()
        };
        let cloud = SimCloud::load_or_new(&cli.cloud, settings)?;
        let provider = SimProvider::new(&cloud, config);
        let backend = create_backend(&BackendConfig::local(cli.state.to_string_lossy())).await?;
        log::info!(
            "provider {} in {} (state {})",
            provider.name(),
            provider.config().region,
            cli.state.display()
        );

        Ok(Self {
            cloud,
            cloud_path: cli.cloud.clone(),
            provider,
            backend,
        })
    }

    async fn read_state(&self) -> Result<StateFile> {
        Ok(self.backend.read_state().await?.unwrap_or_default())
    }

    /// Read the state under `lock`, releasing the lock when the state is unreadable
    async fn read_locked_state(&self, lock: &LockInfo) -> Result<StateFile> {
        match self.read_state().await {
            Ok(state) => Ok(state),
            Err(e) => {
                if let Err(release) = self.backend.release_lock(lock).await {
                    log::error!("failed to release lock {}: {}", lock.id, release);
                }
                Err(e)
            }
        }
    }

    fn default_timeouts(&self) -> ResourceTimeouts {
        self.provider.config().timeouts
    }

    /// Persist the state and the cloud, then release the lock
    async fn finish(&self, state: &mut StateFile, lock: &LockInfo) -> Result<()> {
        state.increment_serial();
        let written = self.backend.write_state(state).await;
        let saved = self.cloud.save(&self.cloud_path);
        let released = self.backend.release_lock(lock).await;
        written.context("Failed to write state")?;
        saved.context("Failed to save simulated cloud")?;
        released.context("Failed to release state lock")?;
        Ok(())
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run_apply(cli: &Cli, file: &Path) -> Result<()> {
    let manifest = Manifest::load(file)?;
    let session = Session::open(cli).await?;

    let lock = session.backend.acquire_lock("apply").await?;
    let mut state = session.read_locked_state(&lock).await?;
    let report = apply(
        &session.provider,
        &manifest,
        session.default_timeouts(),
        &mut state,
    )
    .await;
    session.finish(&mut state, &lock).await?;

    report.print("Apply")
}

async fn run_refresh(cli: &Cli) -> Result<()> {
    let session = Session::open(cli).await?;

    let lock = session.backend.acquire_lock("refresh").await?;
    let mut state = session.read_locked_state(&lock).await?;
    let report = refresh(&session.provider, session.default_timeouts(), &mut state).await;
    session.finish(&mut state, &lock).await?;

    report.print("Refresh")
}

async fn run_destroy(cli: &Cli) -> Result<()> {
    let session = Session::open(cli).await?;

    let lock = session.backend.acquire_lock("destroy").await?;
    let mut state = session.read_locked_state(&lock).await?;
    if state.resources.is_empty() {
        session.backend.release_lock(&lock).await?;
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }
    let report = destroy(&session.provider, session.default_timeouts(), &mut state).await;
    session.finish(&mut state, &lock).await?;

    report.print("Destroy")
}

async fn run_show(cli: &Cli) -> Result<()> {
    let backend = create_backend(&BackendConfig::local(cli.state.to_string_lossy())).await?;
    let Some(state) = backend.read_state().await? else {
        println!("{}", "No state.".yellow());
        return Ok(());
    };

    println!(
        "{}",
        format!("State serial {} (lineage {})", state.serial, state.lineage).bold()
    );
    for resource in &state.resources {
        println!();
        println!(
            "{} {}",
            format!("{}.{}", resource.resource_type, resource.name).cyan().bold(),
            resource.id.dimmed()
        );
        for (key, value) in &resource.attributes {
            println!("    {} = {}", key, value);
        }
    }
    Ok(())
}

fn run_types() -> Result<()> {
    for resource_type in cumulus_provider_sim::resources::resource_types() {
        let kind = match resource_type.kind() {
            TypeKind::Resource => "resource".normal(),
            TypeKind::DataSource => "data source".yellow(),
        };
        println!("{} ({})", resource_type.name().bold(), kind);
        println!(
            "    required: {}",
            resource_type.required_attributes().join(", ")
        );
        if !resource_type.force_new_attributes().is_empty() {
            println!(
                "    replace on change: {}",
                resource_type.force_new_attributes().join(", ")
            );
        }
    }
    Ok(())
}

async fn run_force_unlock(cli: &Cli, lock_id: &str) -> Result<()> {
    let backend = create_backend(&BackendConfig::local(cli.state.to_string_lossy())).await?;
    backend.force_unlock(lock_id).await?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

// =============================================================================
// Planning
// =============================================================================

/// What apply does to one resource
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Read,
    Create,
    Update(Vec<String>),
    /// Delete then create, because of a change to these attributes
    Replace(Vec<String>),
    NoOp,
}

fn plan_action(resource_type: &dyn ResourceType, data: &ResourceData) -> Action {
    if resource_type.kind() == TypeKind::DataSource {
        return Action::Read;
    }
    if !data.has_id() {
        return Action::Create;
    }
    let changed: Vec<String> = data.changed_keys().into_iter().map(str::to_string).collect();
    if changed.is_empty() {
        return Action::NoOp;
    }
    let force_new = resource_type.force_new_attributes();
    if changed.iter().any(|k| force_new.contains(&k.as_str())) {
        Action::Replace(changed)
    } else {
        Action::Update(changed)
    }
}

fn format_action(action: &Action, address: &str) -> String {
    match action {
        Action::Read => format!("{} {}", "<=".cyan(), address),
        Action::Create => format!("{} {}", "+".green(), address),
        Action::Update(keys) => format!("{} {} ({})", "~".yellow(), address, keys.join(", ")),
        Action::Replace(keys) => format!("{} {} ({})", "-/+".red(), address, keys.join(", ")),
        Action::NoOp => format!("{} {}", "=".dimmed(), address),
    }
}

/// Outcome counts of one command
#[derive(Debug, Default)]
struct Report {
    succeeded: usize,
    unchanged: usize,
    failed: usize,
}

impl Report {
    fn success(&mut self, line: String) {
        println!("  {} {}", "✓".green(), line);
        self.succeeded += 1;
    }

    fn failure(&mut self, line: String, error: &anyhow::Error) {
        println!("  {} {} - {:#}", "✗".red(), line, error);
        self.failed += 1;
    }

    fn print(&self, command: &str) -> Result<()> {
        println!();
        if self.failed > 0 {
            bail!(
                "{} failed. {} succeeded, {} failed.",
                command,
                self.succeeded,
                self.failed
            );
        }
        println!(
            "{}",
            format!(
                "{} complete! {} changed, {} unchanged.",
                command, self.succeeded, self.unchanged
            )
            .green()
            .bold()
        );
        Ok(())
    }
}

// =============================================================================
// Apply / Refresh / Destroy
// =============================================================================

async fn apply(
    provider: &SimProvider,
    manifest: &Manifest,
    defaults: ResourceTimeouts,
    state: &mut StateFile,
) -> Report {
    let mut report = Report::default();

    for spec in &manifest.resources {
        match apply_one(provider, spec, defaults, state).await {
            Ok(Action::NoOp) => report.unchanged += 1,
            Ok(action) => report.success(format_action(&action, &spec.address())),
            Err(e) => report.failure(spec.address(), &e),
        }
    }

    // Resources no longer in the manifest, newest first
    let orphans: Vec<_> = state
        .resources
        .iter()
        .filter(|r| !manifest.contains(&r.resource_type, &r.name))
        .map(|r| (r.resource_type.clone(), r.name.clone()))
        .rev()
        .collect();
    for (resource_type, name) in orphans {
        let address = format!("{}.{}", resource_type, name);
        match destroy_one(provider, &resource_type, &name, defaults, state).await {
            Ok(()) => report.success(format!("{} {}", "-".red(), address)),
            Err(e) => report.failure(address, &e),
        }
    }

    report
}

async fn apply_one(
    provider: &SimProvider,
    spec: &ResourceSpec,
    defaults: ResourceTimeouts,
    state: &mut StateFile,
) -> Result<Action> {
    let resource_type = provider.resource_type(&spec.resource_type)?;
    let config = spec.resolved_config(state)?;
    let timeouts = spec.timeouts(defaults)?;
    let fresh = || {
        ResourceData::new(&spec.resource_type)
            .with_config(config.clone())
            .with_timeouts(timeouts)
    };

    let mut data = match state.find_resource(&spec.resource_type, &spec.name) {
        Some(stored) if resource_type.kind() == TypeKind::Resource => {
            let mut data = stored.to_data(config.clone(), timeouts);
            provider.read(&mut data).await?;
            if !data.has_id() {
                log::warn!("{} no longer exists, recreating", spec.address());
                data = fresh();
            }
            data
        }
        _ => fresh(),
    };

    let action = plan_action(resource_type.as_ref(), &data);
    let result = match &action {
        Action::Read => provider.read(&mut data).await,
        Action::Create => provider.create(&mut data).await,
        Action::Update(_) => provider.update(&mut data).await,
        Action::Replace(_) => match provider.delete(&mut data).await {
            Ok(()) => {
                state.record(&spec.name, provider.name(), &data);
                data = fresh();
                provider.create(&mut data).await
            }
            Err(e) => Err(e),
        },
        Action::NoOp => Ok(()),
    };

    // A failed create may still have produced a resource worth tracking
    state.record(&spec.name, provider.name(), &data);
    result?;
    Ok(action)
}

async fn refresh(provider: &SimProvider, defaults: ResourceTimeouts, state: &mut StateFile) -> Report {
    let mut report = Report::default();
    let stored = state.resources.clone();

    for resource in stored {
        let address = format!("{}.{}", resource.resource_type, resource.name);
        let mut data = resource.to_data(resource.attributes.clone(), defaults);
        match provider.read(&mut data).await {
            Ok(()) => {
                if !data.has_id() {
                    report.success(format!("{} {} (gone)", "-".red(), address));
                } else if data.attributes() != &resource.attributes {
                    report.success(format!("{} {}", "~".yellow(), address));
                } else {
                    report.unchanged += 1;
                }
                state.record(&resource.name, provider.name(), &data);
            }
            Err(e) => report.failure(address, &e.into()),
        }
    }

    report
}

async fn destroy(provider: &SimProvider, defaults: ResourceTimeouts, state: &mut StateFile) -> Report {
    let mut report = Report::default();
    let targets: Vec<_> = state
        .resources
        .iter()
        .rev()
        .map(|r| (r.resource_type.clone(), r.name.clone()))
        .collect();

    for (resource_type, name) in targets {
        let address = format!("{}.{}", resource_type, name);
        match destroy_one(provider, &resource_type, &name, defaults, state).await {
            Ok(()) => report.success(format!("{} {}", "-".red(), address)),
            Err(e) => report.failure(address, &e),
        }
    }

    report
}

async fn destroy_one(
    provider: &SimProvider,
    resource_type: &str,
    name: &str,
    defaults: ResourceTimeouts,
    state: &mut StateFile,
) -> Result<()> {
    if provider.is_data_source(resource_type) {
        state.remove_resource(resource_type, name);
        return Ok(());
    }
    let Some(stored) = state.find_resource(resource_type, name) else {
        return Ok(());
    };

    let mut data = stored.to_data(Map::new(), defaults);
    let result = provider.delete(&mut data).await;
    state.record(name, provider.name(), &data);
    result.with_context(|| format!("Failed to delete {}.{}", resource_type, name))
}
