//! MultiMind: per-access-key skill brains behind one listener.
//!
//! Every client authenticates with an access key; all clients presenting the
//! same key share one worker ("brain") running the skills that key is allowed.
//!
//! Usage:
//!   multimind start                                   # Default port 5678
//!   multimind start --port 8080 --require-crypto      # Custom port, refuse plaintext
//!   multimind allow-skill <skill> <access_key>        # Allow a skill for a key
//!   multimind remove-skill <skill> <access_key>       # Disallow a skill
//!   multimind list-skills <access_key>                # Show allowed skills

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use multimind_broker::admin::{self, AdminError};
use multimind_broker::{AccessKeyStore, BrokerConfig, MemoryAccessKeyStore, MultiMind};
use multimind_skills::{CapabilityRegistry, SkillCatalog};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "multimind", about = "MultiMind: one skill brain per access key")]
struct Cli {
    /// JSON config file (CLI flags override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skill allow-list database
    #[arg(long, global = true)]
    skills_db: Option<PathBuf>,

    /// Client (access key) database
    #[arg(long, global = true)]
    clients_db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Write logs to a file (defaults to <data dir>/hivemind/multimind.log if no path given)
    #[arg(long, global = true, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// launch MultiMind
    Start {
        /// Hostname to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (0 for OS-assigned)
        #[arg(long)]
        port: Option<u16>,

        /// Maximum concurrent connections
        #[arg(long)]
        max_connections: Option<usize>,

        /// Refuse clients that cannot end up with an encryption key
        #[arg(long)]
        require_crypto: bool,

        /// Disable the key-agreement handshake
        #[arg(long)]
        no_handshake: bool,
    },

    /// add a skill to an access key
    AllowSkill { skill: String, access_key: String },

    /// remove a skill from an access key
    RemoveSkill { skill: String, access_key: String },

    /// lists skills for an access key
    ListSkills { access_key: String },
}

fn init_tracing(verbose: bool, log_file: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(log_file_arg) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    };

    let log_path = if log_file_arg == "DEFAULT" {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("hivemind/multimind.log")
    } else {
        PathBuf::from(log_file_arg)
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging to {}", log_path.display());
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            error!("Failed to open log file {}: {e}", log_path.display());
        }
    }
}

/// Defaults, then the config file, then global path flags.
fn resolve_config(cli: &Cli) -> BrokerConfig {
    let mut config = match &cli.config {
        Some(path) => match BrokerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        },
        None => BrokerConfig::default(),
    };
    if let Some(path) = &cli.skills_db {
        config.skills_path = path.clone();
    }
    if let Some(path) = &cli.clients_db {
        config.clients_path = path.clone();
    }
    config
}

fn open_accounts(config: &BrokerConfig) -> MemoryAccessKeyStore {
    match MemoryAccessKeyStore::load_json(&config.clients_path) {
        Ok(store) => store,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

fn open_registry(config: &BrokerConfig) -> CapabilityRegistry {
    match CapabilityRegistry::open(&config.skills_path) {
        Ok(registry) => registry.with_defaults(config.default_skills.clone()),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

/// Print the resulting skill list, or exit non-zero with the error.
fn report(result: Result<Vec<String>, AdminError>, success: impl FnOnce(&[String]) -> String) {
    match result {
        Ok(skills) => println!("{}", success(&skills)),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_file.as_deref());

    let mut config = resolve_config(&cli);

    match cli.command {
        Command::Start {
            host,
            port,
            max_connections,
            require_crypto,
            no_handshake,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if max_connections.is_some() {
                config.max_connections = max_connections;
            }
            config.require_crypto |= require_crypto;
            config.handshake_enabled &= !no_handshake;
            run(config).await;
        }

        Command::AllowSkill { skill, access_key } => {
            let accounts = open_accounts(&config);
            let registry = open_registry(&config);
            report(
                admin::allow_skill(&accounts, &registry, &access_key, &skill),
                |skills| format!("Allowed skills: {skills:?}"),
            );
        }

        Command::RemoveSkill { skill, access_key } => {
            let accounts = open_accounts(&config);
            let registry = open_registry(&config);
            report(
                admin::remove_skill(&accounts, &registry, &access_key, &skill),
                |_| format!("Skill removed from {access_key}: {skill}"),
            );
        }

        Command::ListSkills { access_key } => {
            let registry = open_registry(&config);
            report(admin::list_skills(&registry, &access_key), |skills| {
                format!("Allowed skills: {skills:?}")
            });
        }
    }
}

async fn run(config: BrokerConfig) {
    let accounts: Arc<dyn AccessKeyStore> = Arc::new(open_accounts(&config));
    let registry = Arc::new(open_registry(&config));

    println!();
    println!("  MultiMind");
    println!("  Binding:    {}:{}", config.host, config.port);
    println!("  Clients:    {}", config.clients_path.display());
    println!("  Skills DB:  {}", config.skills_path.display());
    println!(
        "  Crypto:     {}",
        if config.require_crypto { "required" } else { "optional" }
    );
    println!();

    let mut service = MultiMind::new(config, accounts, registry, SkillCatalog::with_builtin());
    if let Err(e) = service.start().await {
        error!("Failed to start MultiMind: {e}");
        std::process::exit(1);
    }

    println!("  Press Ctrl+C to stop.");
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    println!();
    println!("  Shutting down...");
    service.stop().await;
    println!("  Server stopped.");
}
