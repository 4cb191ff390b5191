//! Silk SDP reconciler CLI
//!
//! Declarative management of Silk SDP storage resources: a YAML manifest
//! declares volumes, volume groups, hosts, host groups and policies; `plan`
//! shows the drift against the array, `apply` converges it, `destroy` tears
//! everything down and `import` adopts resources created outside the
//! reconciler.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use silk_sdp_reconciler::{
    config::Settings,
    engine,
    error::{Error, Result},
    manifest::Manifest,
    resources::Kind,
    sdp::SdpClient,
    state::State,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Declarative reconciler for Silk SDP storage arrays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SDP server IP address or hostname
    #[arg(long, env = "SILK_SDP_SERVER", default_value = "")]
    server: String,

    /// SDP username
    #[arg(long, env = "SILK_SDP_USERNAME", default_value = "")]
    username: String,

    /// SDP password
    #[arg(long, env = "SILK_SDP_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "SILK_SDP_TIMEOUT", default_value = "15")]
    timeout: u64,

    /// Accept self-signed certificates on the management port
    #[arg(long, env = "SILK_SDP_INSECURE")]
    insecure: bool,

    /// Path to the YAML manifest
    #[arg(long, short = 'f', default_value = "silk.yaml")]
    manifest: PathBuf,

    /// Path to the JSON state file
    #[arg(long, default_value = "silk.state.json")]
    state: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what apply would change, without touching the array
    Plan,
    /// Converge the array to the manifest
    Apply,
    /// Delete every resource recorded in the state file
    Destroy,
    /// Bring an existing array resource under management
    Import {
        /// Resource kind (volume, volume_group, host, host_group,
        /// capacity_policy, retention_policy)
        kind: String,
        /// Resource name on the array
        name: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let settings = Settings {
        server: args.server.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        timeout_secs: args.timeout,
        accept_invalid_certs: args.insecure,
        manifest_path: args.manifest.clone(),
        state_path: args.state.clone(),
    };
    settings.validate()?;

    info!("Silk SDP reconciler {}", silk_sdp_reconciler::VERSION);
    info!("  Server: {}", settings.server);
    info!("  Manifest: {}", settings.manifest_path.display());
    info!("  State: {}", settings.state_path.display());

    let client = SdpClient::new(settings.client_config())?;
    let mut state = State::load(&settings.state_path)?;

    match &args.command {
        Command::Plan => {
            let manifest = Manifest::load(&settings.manifest_path)?;
            let plan = engine::plan(&client, &manifest, &state).await?;
            print!("{}", plan);
        }
        Command::Apply => {
            let manifest = Manifest::load(&settings.manifest_path)?;
            // Persist whatever was applied, even when the run stops early
            let result = engine::apply(&client, &manifest, &mut state).await;
            state.save(&settings.state_path)?;
            let report = result?;
            println!(
                "Apply complete: {} created, {} updated, {} deleted.",
                report.created, report.updated, report.deleted
            );
        }
        Command::Destroy => {
            let result = engine::destroy(&client, &mut state).await;
            state.save(&settings.state_path)?;
            let deleted = result?;
            println!("Destroy complete: {} resources deleted.", deleted);
        }
        Command::Import { kind, name } => {
            let kind = parse_kind(kind)?;
            let record = engine::import(&client, &mut state, kind, name).await?;
            state.save(&settings.state_path)?;
            println!("Imported {} as {}.", kind.key(name), record.id());
        }
    }

    Ok(())
}

fn parse_kind(s: &str) -> Result<Kind> {
    Kind::ORDERED
        .iter()
        .copied()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| {
            Error::Configuration(format!(
                "unknown resource kind {}, expected one of: {}",
                s,
                Kind::ORDERED
                    .iter()
                    .map(Kind::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
