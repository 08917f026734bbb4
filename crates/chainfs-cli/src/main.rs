//! chainfs: store files as encrypted reply chains in Discord
//!
//! Commands:
//!   init                 - verify the bot token and create missing channels
//!   send <path>          - encrypt and upload a file, print its locator
//!   fetch <locator> [-o] - download and decrypt a file by locator
//!   config show          - display current configuration

use anyhow::{Context, Result};
use chainfs_core::config::ChainfsConfig;
use chainfs_core::types::{ChannelTopology, Locator};
use chainfs_sync::bootstrap::discover_channels;
use chainfs_sync::{ProgressFn, Session, TransferSettings};
use chainfs_transport::DiscordTransport;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "chainfs",
    version,
    about = "Encrypted file storage on Discord",
    long_about = "chainfs: split files into encrypted chunks and store them as reply chains of Discord attachments"
)]
struct Cli {
    /// Path to chainfs.toml configuration file
    #[arg(long, short = 'c', env = "CHAINFS_CONFIG", default_value = "chainfs.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "CHAINFS_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "CHAINFS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the bot token and make sure the manifest and data channels exist
    Init,

    /// Encrypt and upload a file
    ///
    /// The passphrase comes from [crypto] passphrase, CHAINFS_PASSPHRASE, or
    /// an interactive prompt, in that order.
    Send {
        /// Local file to upload
        path: PathBuf,
    },

    /// Download and decrypt a file
    Fetch {
        /// Locator printed by `send` (<channel>/<message>, or a bare message id
        /// in the first data channel)
        locator: String,
        /// Output path (default: <name>.dec in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (config, found) = match load_config(&cli.config).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("chainfs: {e:#}");
            std::process::exit(1);
        }
    };

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| parse_log_format(&config.log.format));
    init_logging(&level, &format);

    if !found {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    if let Err(e) = run(cli, config).await {
        eprintln!("chainfs: failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ChainfsConfig) -> Result<()> {
    match cli.command {
        Commands::Init => cmd_init(&config).await,
        Commands::Send { path } => cmd_send(&config, &path).await,
        Commands::Fetch { locator, output } => cmd_fetch(&config, &locator, output.as_deref()).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn parse_log_format(s: &str) -> LogFormat {
    if s.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Returns the config and whether the file existed.
async fn load_config(path: &Path) -> Result<(ChainfsConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((ChainfsConfig::default(), false))
    }
}

/// Bot token: DISCORD_TOKEN overrides [discord] token.
fn resolve_token(config: &ChainfsConfig) -> Result<String> {
    std::env::var("DISCORD_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .or_else(|| config.discord.token.clone().filter(|t| !t.is_empty()))
        .context(
            "Discord bot token not set\n\
             Set DISCORD_TOKEN or [discord] token in the config file.\n\
             Example:\n\
             \texport DISCORD_TOKEN=your-bot-token",
        )
}

/// Passphrase: [crypto] passphrase, then CHAINFS_PASSPHRASE, then prompt.
fn resolve_passphrase(config: &ChainfsConfig) -> Result<SecretString> {
    if let Some(p) = config.crypto.passphrase.clone().filter(|p| !p.is_empty()) {
        return Ok(SecretString::from(p));
    }
    if let Ok(p) = std::env::var("CHAINFS_PASSPHRASE") {
        if !p.is_empty() {
            return Ok(SecretString::from(p));
        }
    }
    let p = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    if p.is_empty() {
        anyhow::bail!("empty passphrase");
    }
    Ok(SecretString::from(p))
}

// ── Session setup ─────────────────────────────────────────────────────────────

async fn connect(config: &ChainfsConfig) -> Result<(Arc<DiscordTransport>, ChannelTopology)> {
    let token = resolve_token(config)?;
    let transport =
        DiscordTransport::new(&config.discord, &token).context("building Discord client")?;
    transport
        .verify_token()
        .await
        .context("authenticating with Discord")?;

    let topology = discover_channels(&transport, &config.channels)
        .await
        .context("discovering chainfs channels")?;
    Ok((Arc::new(transport), topology))
}

async fn open_session(config: &ChainfsConfig) -> Result<Session> {
    let passphrase = resolve_passphrase(config)?;
    let (transport, topology) = connect(config).await?;
    Session::new(
        transport,
        topology,
        passphrase,
        TransferSettings::from_config(&config.transfer),
    )
    .context("creating session")
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_callback(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, msg| {
        pb.set_length(total);
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

// ── `chainfs init` ────────────────────────────────────────────────────────────

async fn cmd_init(config: &ChainfsConfig) -> Result<()> {
    let (_transport, topology) = connect(config).await?;

    println!("Channels ready in server {}", config.discord.server_id);
    println!("  manifest: {}", topology.manifest);
    for (i, id) in topology.data.iter().enumerate() {
        println!("  data[{i}]:  {id}");
    }
    Ok(())
}

// ── `chainfs send` ────────────────────────────────────────────────────────────

async fn cmd_send(config: &ChainfsConfig, path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("not a file: {}", path.display());
    }
    let size = std::fs::metadata(path)
        .with_context(|| format!("reading metadata: {}", path.display()))?
        .len();
    let block = chainfs_chunks::block_size(config.transfer.max_blob_size)
        .context("checking [transfer] max_blob_size")?;
    let expected = size.div_ceil(block as u64).max(1);

    let session = open_session(config).await?;

    println!("Sending {} ({}, {} chunks)", path.display(), fmt_bytes(size), expected);

    let pb = make_progress_bar(expected, "send");
    let progress = progress_callback(&pb);

    let result = chainfs_sync::upload_file(&session, path, Some(&progress))
        .await
        .with_context(|| format!("uploading {}", path.display()));
    let result = match result {
        Ok(r) => r,
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            return Err(e);
        }
    };

    pb.finish_with_message("done".to_string());
    info!(name = %result.name, locator = %result.locator, "upload complete");

    println!();
    println!("Sent {}:", result.name);
    println!("  chunks:   {}", result.chunks);
    println!("  bytes:    {}", fmt_bytes(result.bytes));
    println!("  manifest: {}", result.manifest);
    println!("  locator:  {}", result.locator);
    Ok(())
}

// ── `chainfs fetch` ───────────────────────────────────────────────────────────

async fn cmd_fetch(config: &ChainfsConfig, locator: &str, output: Option<&Path>) -> Result<()> {
    let locator: Locator = locator
        .parse()
        .with_context(|| format!("invalid locator: {locator}"))?;

    let session = open_session(config).await?;

    println!("Fetching {locator}");

    let pb = make_progress_bar(0, "fetch");
    pb.set_message("walking chain...".to_string());
    let progress = progress_callback(&pb);

    let result = chainfs_sync::download_file(&session, &locator, output, Some(&progress))
        .await
        .with_context(|| format!("downloading {locator}"));
    let result = match result {
        Ok(r) => r,
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            return Err(e);
        }
    };

    pb.finish_with_message("done".to_string());

    println!();
    println!("Fetched {}:", result.name);
    println!("  chunks: {}", result.chunks);
    println!("  bytes:  {}", fmt_bytes(result.bytes));
    println!("  local:  {}", result.local_path.display());
    Ok(())
}

// ── `chainfs config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &ChainfsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();

    let mut shown = config.clone();
    if shown.discord.token.is_some() {
        shown.discord.token = Some("[REDACTED]".into());
    }
    if shown.crypto.passphrase.is_some() {
        shown.crypto.passphrase = Some("[REDACTED]".into());
    }
    let rendered = toml::to_string_pretty(&shown).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
