//! `fck` — a thin CLI that boots a [`fck_kernel::FederatedCapabilityKernel`]
//! for one agent and drives its governed entrypoints from the command line.
//!
//! Every collaborator this binary wires up is a reference implementation
//! (`fck-governance`'s `RuleBasedGovernanceGate`, `fck-mock`'s attestation /
//! federation / assistance stand-ins) plus the durable `fck-storage-file`
//! adapter — there is no real federation transport behind this CLI, only the
//! mechanics of the pipeline itself.
//!
//! Settings layer the same way across every subcommand: an optional
//! `--config` TOML file, then `FCK_AGENT_ID` / `FCK_STORAGE_DIR` /
//! `FCK_LOG_LEVEL` environment overrides, then the subcommand's own flags,
//! which win over both.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fck_config::KernelBootConfig;
use fck_core::{CapabilityManifest, RiskTier, UpdatePackage};
use fck_governance::RuleBasedGovernanceGate;
use fck_kernel::{AssistanceCallRequest, FederatedCapabilityKernel, GovernedCallRequest};
use fck_mock::{
    AcceptAllSignatureVerifier, AlwaysAttestClient, AlwaysEscalateAssistanceBroker,
    EchoFederationClient, NoopBundleApplier,
};
use fck_storage_file::FileStorageAdapter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code used when a governed entrypoint returns a structured failure.
const EXIT_GOVERNED_FAILURE: i32 = 1;
/// Exit code used for fatal boot or configuration failures (in particular
/// `AGENT_ID_MISMATCH`).
const EXIT_BOOT_FAILURE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "fck", version, about = "Federated Capability Kernel CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file providing defaults for `--agent-id`,
    /// `--storage-dir`, and `--manifest`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force debug logging regardless of the config's `log_level`.
    #[arg(long, global = true)]
    debug: bool,
}

/// Flags common to every subcommand that boots a kernel. Each falls back to
/// the loaded [`KernelBootConfig`] when omitted.
#[derive(clap::Args, Debug)]
struct BootFlags {
    /// Agent this kernel instance acts on behalf of.
    #[arg(long)]
    agent_id: Option<String>,
    /// Directory the file-backed storage adapter persists state under.
    #[arg(long)]
    storage_dir: Option<PathBuf>,
    /// Path to the capability manifest JSON to boot with on first boot.
    #[arg(long)]
    manifest: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot (or re-boot) a kernel for one agent and print the loaded manifest.
    Boot {
        #[command(flatten)]
        boot: BootFlags,
    },

    /// Execute a governed federation call.
    Call {
        #[command(flatten)]
        boot: BootFlags,
        /// Remote operation tag, checked against `federation.allowed_operations`.
        #[arg(long)]
        operation: String,
        /// JSON payload for the operation.
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Declared risk tier of the action.
        #[arg(long, value_enum, default_value_t = RiskTierArg::T1Standard)]
        risk_tier: RiskTierArg,
        /// Trace identifier for correlation.
        #[arg(long, default_value = "cli-trace")]
        trace_id: String,
    },

    /// Submit an explicit assistance request.
    Assist {
        #[command(flatten)]
        boot: BootFlags,
        /// The help query text.
        #[arg(long)]
        query: String,
        /// Optional JSON context accompanying the query.
        #[arg(long)]
        context: Option<String>,
        /// Declared risk tier of the request.
        #[arg(long, value_enum, default_value_t = RiskTierArg::T1Standard)]
        risk_tier: RiskTierArg,
        /// Trace identifier, folded into the content-addressed `action_id`.
        #[arg(long, default_value = "cli-trace")]
        trace_id: String,
    },

    /// Apply an update package.
    Apply {
        #[command(flatten)]
        boot: BootFlags,
        /// Path to the update package JSON to apply.
        #[arg(long)]
        package: PathBuf,
        /// Declared risk tier of the update.
        #[arg(long, value_enum, default_value_t = RiskTierArg::T1Standard)]
        risk_tier: RiskTierArg,
    },

    /// Print the currently loaded manifest for an agent.
    ShowManifest {
        #[command(flatten)]
        boot: BootFlags,
    },
}

/// CLI-facing mirror of [`RiskTier`] so clap can derive a `--risk-tier` flag.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum RiskTierArg {
    /// Lowest-stakes actions.
    T0Low,
    /// Everyday, standard-stakes actions.
    T1Standard,
    /// High-stakes actions that usually require attestation.
    T2HighStakes,
    /// Regulated actions; almost always require attestation.
    T3Regulated,
}

impl From<RiskTierArg> for RiskTier {
    fn from(arg: RiskTierArg) -> Self {
        match arg {
            RiskTierArg::T0Low => RiskTier::T0Low,
            RiskTierArg::T1Standard => RiskTier::T1Standard,
            RiskTierArg::T2HighStakes => RiskTier::T2HighStakes,
            RiskTierArg::T3Regulated => RiskTier::T3Regulated,
        }
    }
}

/// Settings resolved for one kernel boot, after layering config file, env
/// overrides, and subcommand flags.
struct ResolvedSettings {
    agent_id: String,
    storage_dir: PathBuf,
    manifest_path: PathBuf,
    log_level: String,
}

/// Load the config file (applying `FCK_AGENT_ID` / `FCK_STORAGE_DIR` /
/// `FCK_LOG_LEVEL` env overrides), layer `flags` on top, validate the result,
/// and surface any advisory warnings via `tracing::warn`.
fn resolve_settings(cli: &Cli, flags: BootFlags) -> Result<ResolvedSettings> {
    let mut config = fck_config::load_config(cli.config.as_deref()).context("load config")?;
    if let Some(agent_id) = flags.agent_id {
        config.agent_id = Some(agent_id);
    }
    if let Some(storage_dir) = flags.storage_dir {
        config.storage_dir = Some(storage_dir.display().to_string());
    }
    if let Some(manifest) = flags.manifest {
        config.default_manifest_path = Some(manifest.display().to_string());
    }
    if cli.debug {
        config.log_level = Some("debug".to_string());
    }

    let warnings = fck_config::validate_config(&config).context("validate config")?;
    for warning in &warnings {
        tracing::warn!(target: "fck.cli", %warning, "configuration warning");
    }

    into_resolved(config)
}

fn into_resolved(config: KernelBootConfig) -> Result<ResolvedSettings> {
    let agent_id = config.agent_id.context("agent_id is required: pass --agent-id, set it in --config, or export FCK_AGENT_ID")?;
    let storage_dir = config
        .storage_dir
        .map(PathBuf::from)
        .context("storage_dir is required: pass --storage-dir, set it in --config, or export FCK_STORAGE_DIR")?;
    let manifest_path = config
        .default_manifest_path
        .map(PathBuf::from)
        .context("manifest is required: pass --manifest or set default_manifest_path in --config")?;
    let log_level = config.log_level.unwrap_or_else(|| "info".to_string());
    Ok(ResolvedSettings { agent_id, storage_dir, manifest_path, log_level })
}

fn load_manifest(path: &PathBuf) -> Result<CapabilityManifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read manifest from {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse manifest from {}", path.display()))
}

fn load_package(path: &PathBuf) -> Result<UpdatePackage> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read update package from {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse update package from {}", path.display()))
}

/// Wire up a kernel for `agent_id` with the reference collaborators: a
/// `RuleBasedGovernanceGate` seeded from `manifest.governance`, mock
/// attestation/federation/assistance, and durable file storage.
fn build_kernel(
    agent_id: &str,
    storage_dir: &PathBuf,
    manifest: &CapabilityManifest,
) -> Result<FederatedCapabilityKernel> {
    let governance = RuleBasedGovernanceGate::from_invariant_keys(&manifest.governance.invariant_keys_required)
        .context("compile governance rules")?;

    Ok(FederatedCapabilityKernel::new(
        agent_id,
        Arc::new(governance),
        Arc::new(AlwaysAttestClient),
        Arc::new(EchoFederationClient),
        Arc::new(AlwaysEscalateAssistanceBroker),
        Arc::new(FileStorageAdapter::new(storage_dir)),
    ))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Boot a kernel from resolved settings, exiting with [`EXIT_BOOT_FAILURE`]
/// on a fatal boot error. Returns the kernel and its loaded manifest.
async fn boot_kernel(settings: &ResolvedSettings) -> Result<(FederatedCapabilityKernel, CapabilityManifest)> {
    let default_manifest = load_manifest(&settings.manifest_path)?;
    let kernel = build_kernel(&settings.agent_id, &settings.storage_dir, &default_manifest)?;
    if let Err(e) = kernel.boot(&default_manifest).await {
        eprintln!("boot failed: {e}");
        std::process::exit(EXIT_BOOT_FAILURE);
    }
    Ok((kernel, default_manifest))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).init();

    match cli.command {
        Commands::Boot { boot } => {
            let settings = resolve_settings(&cli, boot)?;
            tracing::debug!(target: "fck.cli", log_level = %settings.log_level, "resolved settings");
            let (kernel, _) = boot_kernel(&settings).await?;
            print_json(&kernel.get_manifest().await)?;
        }
        Commands::Call { boot, operation, payload, risk_tier, trace_id } => {
            let settings = resolve_settings(&cli, boot)?;
            let (kernel, _) = boot_kernel(&settings).await?;
            let payload: serde_json::Value = serde_json::from_str(&payload).context("parse --payload as JSON")?;
            let result = kernel
                .governed_federation_call(GovernedCallRequest { trace_id, operation, payload, risk_tier: risk_tier.into() })
                .await;
            match result {
                Ok(success) => print_json(&success)?,
                Err(failure) => {
                    print_json(&failure)?;
                    std::process::exit(EXIT_GOVERNED_FAILURE);
                }
            }
        }
        Commands::Assist { boot, query, context, risk_tier, trace_id } => {
            let settings = resolve_settings(&cli, boot)?;
            let (kernel, _) = boot_kernel(&settings).await?;
            let context = context.map(|c| serde_json::from_str(&c)).transpose().context("parse --context as JSON")?;
            let result = kernel
                .request_assistance(AssistanceCallRequest { trace_id, query, context, risk_tier: risk_tier.into() })
                .await;
            match result {
                Ok(success) => print_json(&success)?,
                Err(failure) => {
                    print_json(&failure)?;
                    std::process::exit(EXIT_GOVERNED_FAILURE);
                }
            }
        }
        Commands::Apply { boot, package, risk_tier } => {
            let settings = resolve_settings(&cli, boot)?;
            let (kernel, _) = boot_kernel(&settings).await?;
            let package = load_package(&package)?;
            let verifier = AcceptAllSignatureVerifier;
            let applier = NoopBundleApplier;
            let result = kernel.apply_update_package(&package, risk_tier.into(), &verifier, &applier).await;
            match result {
                Ok(outcome) => print_json(&outcome)?,
                Err(failure) => {
                    print_json(&failure)?;
                    std::process::exit(EXIT_GOVERNED_FAILURE);
                }
            }
        }
        Commands::ShowManifest { boot } => {
            let settings = resolve_settings(&cli, boot)?;
            let (kernel, _) = boot_kernel(&settings).await?;
            print_json(&kernel.get_manifest().await)?;
        }
    }

    Ok(())
}
