//! Process entry point: CLI, config loading, module lifecycle, and the gRPC
//! server loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dutctl_core::lifecycle;
use dutctl_core::plugin::PluginRegistry;
use dutctl_transport_grpc::{AgentServer, AgentService};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:50061";

/// dutctl-agent: hardware test-bench control plane agent.
#[derive(Parser)]
#[command(name = "dutctl-agent", about = "Hardware test-bench control plane agent", version)]
struct Cli {
    /// Address the gRPC server listens on.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDRESS)]
    listen_address: String,

    /// Path to the YAML device-list configuration file.
    #[arg(long)]
    config_path: PathBuf,

    /// Validate configuration (load, init every module, deinit every
    /// module) and exit without serving.
    #[arg(long)]
    check_config: bool,

    /// Alias for `--check-config`, kept for operator familiarity.
    #[arg(long)]
    dry_run: bool,

    /// Upstream orchestrator URL. Accepted and logged; automatic
    /// re-registration after connectivity loss is not implemented.
    #[arg(long)]
    register_with_server: Option<String>,

    /// Increase log verbosity; repeatable (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dutctl_bootstrap::logging::init(cli.verbose);

    if let Some(url) = &cli.register_with_server {
        tracing::warn!(url, "--register-with-server is accepted but automatic re-registration is not implemented");
    }

    let plugins = PluginRegistry::discover();

    let registry = match dutctl_bootstrap::load_registry(&cli.config_path, &plugins) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if cli.check_config || cli.dry_run {
        std::process::exit(run_check_config(&registry).await);
    }

    let init_failures = lifecycle::init_all(&registry).await;
    if !init_failures.is_empty() {
        for failure in &init_failures {
            tracing::error!(
                device = %failure.device,
                command = %failure.command,
                module = %failure.module_id,
                error = %failure.error,
                "module Init failed"
            );
        }
        std::process::exit(1);
    }

    let listen_address: SocketAddr =
        cli.listen_address.parse().with_context(|| format!("invalid --listen-address '{}'", cli.listen_address))?;

    let service = AgentService::new(registry.clone());
    tracing::info!(%listen_address, "dutctl-agent listening");

    let serve_result = tonic::transport::Server::builder()
        .add_service(AgentServer::new(service))
        .serve_with_shutdown(listen_address, async {
            if let Err(e) = dutctl_bootstrap::signals::wait_for_shutdown().await {
                tracing::error!(error = %e, "error waiting for shutdown signal");
            }
        })
        .await;

    let deinit_failures = lifecycle::deinit_all(&registry).await;
    for failure in &deinit_failures {
        tracing::error!(
            device = %failure.device,
            command = %failure.command,
            module = %failure.module_id,
            error = %failure.error,
            "module Deinit failed"
        );
    }

    if let Err(e) = serve_result {
        tracing::error!(error = %e, "gRPC server terminated with an error");
        std::process::exit(1);
    }
    if !deinit_failures.is_empty() {
        // A Deinit error leaves the system in an undefined state, so
        // shutdown is reported as a failure even though the server itself
        // stopped cleanly.
        std::process::exit(1);
    }

    Ok(())
}

/// `--check-config`/`--dry-run`: load (already done by the caller), init
/// every module, deinit every module, report both, and exit without
/// serving. Returns the process exit code.
async fn run_check_config(registry: &dutctl_core::registry::DeviceRegistry) -> i32 {
    let init_failures = lifecycle::init_all(registry).await;
    for failure in &init_failures {
        tracing::error!(
            device = %failure.device,
            command = %failure.command,
            module = %failure.module_id,
            error = %failure.error,
            "module Init failed"
        );
    }

    let deinit_failures = lifecycle::deinit_all(registry).await;
    for failure in &deinit_failures {
        tracing::error!(
            device = %failure.device,
            command = %failure.command,
            module = %failure.module_id,
            error = %failure.error,
            "module Deinit failed"
        );
    }

    if init_failures.is_empty() && deinit_failures.is_empty() {
        tracing::info!("configuration OK");
        0
    } else {
        1
    }
}
