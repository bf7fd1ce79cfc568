//! # envsync
//!
//! Share a project's `.env` file between team members through an untrusted
//! relay. Everything leaves the machine encrypted with a per-project key;
//! the relay only stores opaque, versioned blobs.
//!
//! ## Commands
//!
//! - `init`: Create this machine's identity keypair
//! - `login`: Store a relay token and register the identity
//! - `create` / `link` / `join`: Tie a directory to a project
//! - `push` / `pull` / `diff` / `rollback` / `history`: Work with versions
//! - `invite` / `members`: Manage who can decrypt
//! - `watch`: Keep the env file and the relay in step
//!
//! ## Example
//!
//! ```bash
//! envsync init
//! envsync login --token "$ENVSYNC_TOKEN"
//! envsync create api
//! envsync push -m "add stripe keys"
//!
//! # On a teammate's machine
//! envsync join <invitation-id>
//! envsync pull
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

mod commands;
mod config;
mod prompt;

use commands::{
    create, diff, history, init, invite, join, link, login, members, pull, push, rollback,
    status, watch, whoami, Ctx,
};
use config::{set_dir_permissions_0700, Credentials, Settings};
use envsync_client::{HttpRelay, HttpRelayConfig};
use envsync_types::{ProjectId, Version};
use prompt::{read_token, TerminalConfirm};

/// Encrypted .env sharing through an untrusted relay.
#[derive(Parser, Debug)]
#[command(name = "envsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for identity, credentials and keys
    #[arg(long, global = true, env = "ENVSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Workspace directory (defaults to the current directory)
    #[arg(long = "dir", global = true)]
    workspace: Option<PathBuf>,

    /// Relay URL, overriding config.toml
    #[arg(long, global = true, env = "ENVSYNC_API_URL")]
    api_url: Option<String>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create this machine's identity keypair
    Init,

    /// Store a relay API token and register the identity
    Login {
        /// API token (prompted for when omitted)
        #[arg(long)]
        token: Option<String>,
    },

    /// Show the account and identity fingerprint
    Whoami,

    /// Create a project and link this directory to it
    Create {
        /// Project name
        name: String,

        /// Env file, relative to the workspace
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },

    /// Link this directory to an existing project
    Link {
        /// Project id
        project_id: String,

        /// Env file, relative to the workspace
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },

    /// Invite someone to the linked project
    Invite {
        /// Invitee's account email
        email: String,
    },

    /// Accept an invitation and link this directory
    Join {
        /// Invitation id
        invitation_id: String,

        /// Env file, relative to the workspace
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },

    /// List project members and whether they hold the key
    Members,

    /// Encrypt the env file and push it as a new version
    Push {
        /// Change message
        #[arg(long, short)]
        message: Option<String>,

        /// Push without checking whether the relay moved ahead
        #[arg(long)]
        force: bool,
    },

    /// Fetch the latest version into the env file
    Pull {
        /// Print to stdout instead of writing the env file
        #[arg(long)]
        stdout: bool,
    },

    /// Compare the env file with the latest version
    Diff {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Push an earlier version's content as the new head
    Rollback {
        /// Version to restore (`3` or `v3`)
        version: Version,

        /// Skip the conflict check
        #[arg(long)]
        force: bool,
    },

    /// Show the version history
    History {
        /// Fetch every page
        #[arg(long, conflicts_with = "page")]
        all: bool,

        /// Page number (1-based)
        #[arg(long)]
        page: Option<u32>,

        /// Entries per page
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show identity, link and sync state
    Status,

    /// Watch the env file and the relay until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    set_dir_permissions_0700(&data_dir).await?;

    let mut settings = Settings::load(&data_dir)?;
    if let Some(url) = cli.api_url {
        settings.api_url = url;
    }

    let workspace = cli.workspace.unwrap_or_else(|| PathBuf::from("."));
    let workspace = std::fs::canonicalize(&workspace)
        .with_context(|| format!("Workspace {} does not exist", workspace.display()))?;

    let ctx = Ctx {
        data_dir,
        workspace,
        settings,
    };
    let confirm = TerminalConfirm::new(cli.yes);

    match cli.command {
        Commands::Init => {
            init::run(&ctx.data_dir).await?;
        }
        Commands::Login { token } => {
            let token = read_token(token)?;
            let relay = http_relay(&ctx.settings, &token)?;
            login::run(&ctx.data_dir, relay, &token).await?;
        }
        Commands::Whoami => {
            whoami::run(&ctx.data_dir, relay(&ctx).await?).await?;
        }
        Commands::Create { name, env_file } => {
            create::run(&ctx, relay(&ctx).await?, &name, &env_file).await?;
        }
        Commands::Link {
            project_id,
            env_file,
        } => {
            let project = ProjectId::new(project_id);
            link::run(&ctx, relay(&ctx).await?, &project, &env_file).await?;
        }
        Commands::Invite { email } => {
            invite::run(&ctx, relay(&ctx).await?, &email).await?;
        }
        Commands::Join {
            invitation_id,
            env_file,
        } => {
            join::run(&ctx, relay(&ctx).await?, &invitation_id, &env_file).await?;
        }
        Commands::Members => {
            members::run(&ctx, relay(&ctx).await?).await?;
        }
        Commands::Push { message, force } => {
            let args = push::PushArgs { message, force };
            push::run(&ctx, relay(&ctx).await?, args, &confirm).await?;
        }
        Commands::Pull { stdout } => {
            pull::run(&ctx, relay(&ctx).await?, stdout).await?;
        }
        Commands::Diff { json } => {
            diff::run(&ctx, relay(&ctx).await?, json).await?;
        }
        Commands::Rollback { version, force } => {
            rollback::run(&ctx, relay(&ctx).await?, version, force, &confirm).await?;
        }
        Commands::History { all, page, limit } => {
            let args = history::HistoryArgs { all, page, limit };
            history::run(&ctx, relay(&ctx).await?, args).await?;
        }
        Commands::Status => {
            let relay = relay(&ctx).await.ok();
            status::run(&ctx, relay).await?;
        }
        Commands::Watch => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "could not listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };
            watch::run(&ctx, relay(&ctx).await?, &confirm, shutdown).await?;
        }
    }

    Ok(())
}

/// Log to stderr; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

/// Relay client for the logged-in account.
async fn relay(ctx: &Ctx) -> Result<HttpRelay> {
    let creds = Credentials::load(&ctx.data_dir)
        .await
        .context("Not logged in. Run 'envsync login' first.")?;
    http_relay(&ctx.settings, &creds.token)
}

fn http_relay(settings: &Settings, token: &str) -> Result<HttpRelay> {
    let config =
        HttpRelayConfig::new(&settings.api_url, token).with_timeout(settings.request_timeout());
    HttpRelay::new(config).context("Failed to build HTTP client")
}

/// Get the default data directory for envsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "envsync", "envsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
