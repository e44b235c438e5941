//! Custody CLI: seal files into custody and recover them from a receipt.
//!
//! Usage:
//!   custody keygen
//!   custody bootstrap
//!   custody seal --in <FILE> [--receipt <FILE>]
//!   custody open --receipt <FILE> --out <FILE>
//!   custody inspect <CONTENT_ID>
//!   custody token verify <TOKEN>
//!
//! Configuration comes from `CUSTODY_*` environment variables, optionally
//! loaded from a `.env` file. See `custody_vault::config`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use custody_envelope::{inspect, Keypair, SystemClock, Token};
use custody_vault::config::{COLLECTION_ID, LOG_FORMAT};
use custody_vault::{
    ContentId, ContentStore, CustodyConfig, CustodyOrchestrator, CustodyReceipt, FileAuditSink,
    FileContentStore, FileShareBackend, LocalCustody, LogFormat, NamespaceStatus, ShareBackend,
};

/// Exit code when a namespace was just created and must be configured.
const EXIT_SETUP_REQUIRED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "custody")]
#[command(about = "Seal files under custody-held keys and recover them with capability tokens")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print a new builder private key and its DID
    Keygen,
    /// Create the builder namespace, or check the configured one
    Bootstrap,
    /// Encrypt a file and put its key into custody
    Seal {
        #[arg(long = "in")]
        input: PathBuf,
        /// Write the receipt here instead of stdout
        #[arg(long)]
        receipt: Option<PathBuf>,
    },
    /// Recover a sealed file from its receipt
    Open {
        #[arg(long)]
        receipt: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Show the layout of a stored envelope
    Inspect { content_id: String },
    /// Capability token tools
    Token {
        #[command(subcommand)]
        command: TokenCmd,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCmd {
    /// Verify an encoded token against the builder root
    Verify { token: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Args::parse();
    match args.command {
        Cmd::Keygen => keygen(),
        Cmd::Bootstrap => bootstrap().await,
        Cmd::Seal { input, receipt } => seal(&input, receipt.as_deref()).await,
        Cmd::Open { receipt, out } => open(&receipt, &out).await,
        Cmd::Inspect { content_id } => inspect_content(&content_id).await,
        Cmd::Token {
            command: TokenCmd::Verify { token },
        } => verify_token(&token).await,
    }
}

fn init_tracing() {
    let format = std::env::var(LOG_FORMAT)
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn keygen() -> Result<ExitCode> {
    let keypair = Keypair::generate();
    println!("CUSTODY_BUILDER_PRIVATE_KEY={}", keypair.to_hex().as_str());
    eprintln!("builder DID: {}", keypair.did());
    Ok(ExitCode::SUCCESS)
}

async fn orchestrator(config: &CustodyConfig) -> Result<CustodyOrchestrator> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    let mut nodes: Vec<Arc<dyn ShareBackend>> = Vec::with_capacity(config.nodes);
    for i in 0..config.nodes {
        nodes.push(Arc::new(FileShareBackend::new(config.node_dir(i))?));
    }
    let content: Arc<dyn ContentStore> = Arc::new(FileContentStore::new(config.content_dir()).await?);
    let audit = Arc::new(FileAuditSink::new(config.audit_log_path()));
    let clock = Arc::new(SystemClock);

    let ctx = config.context()?;
    let custody = LocalCustody::new(nodes, vec![ctx.builder.did()], clock.clone(), audit.clone())?;
    let vault = CustodyOrchestrator::new(ctx, Arc::new(custody), content, clock, audit)?;
    tracing::info!(builder = %vault.builder_did(), nodes = config.nodes, data_dir = %config.data_dir.display(), "custody ready");
    Ok(vault)
}

/// Prints the one-time setup instruction for a freshly created namespace.
fn setup_required(status: NamespaceStatus) -> Option<ExitCode> {
    match status {
        NamespaceStatus::Ready(_) => None,
        NamespaceStatus::Created(id) => {
            eprintln!("Created namespace {id}.");
            eprintln!("Set {COLLECTION_ID}={id} in your environment or .env file and run again.");
            Some(ExitCode::from(EXIT_SETUP_REQUIRED))
        }
    }
}

async fn bootstrap() -> Result<ExitCode> {
    let config = CustodyConfig::from_env()?;
    let vault = orchestrator(&config).await?;
    let status = vault.ensure_namespace().await?;
    if let Some(code) = setup_required(status) {
        return Ok(code);
    }
    println!("namespace {} is registered to {}", status.id(), vault.builder_did());
    Ok(ExitCode::SUCCESS)
}

async fn seal(input: &Path, receipt_path: Option<&Path>) -> Result<ExitCode> {
    let config = CustodyConfig::from_env()?;
    let vault = orchestrator(&config).await?;
    if let Some(code) = setup_required(vault.ensure_namespace().await?) {
        return Ok(code);
    }

    let receipt = vault
        .encrypt_and_store(input)
        .await
        .with_context(|| format!("sealing {}", input.display()))?;
    let json = serde_json::to_string_pretty(&receipt)?;
    match receipt_path {
        Some(path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("receipt written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn open(receipt_path: &Path, out: &Path) -> Result<ExitCode> {
    let config = CustodyConfig::from_env()?;
    let text = tokio::fs::read_to_string(receipt_path)
        .await
        .with_context(|| format!("reading {}", receipt_path.display()))?;
    let receipt: CustodyReceipt = serde_json::from_str(&text).context("parsing receipt")?;

    let vault = orchestrator(&config).await?;
    let written = vault
        .fetch_and_decrypt_to(&receipt.content_id, &receipt.token, out)
        .await?;
    eprintln!("recovered {written} bytes to {}", out.display());
    Ok(ExitCode::SUCCESS)
}

async fn inspect_content(content_id: &str) -> Result<ExitCode> {
    let config = CustodyConfig::from_env()?;
    let id = ContentId::parse(content_id).map_err(anyhow::Error::msg)?;
    let store = FileContentStore::new(config.content_dir()).await?;
    let envelope = store.get(&id).await?;
    println!("{}", inspect(&envelope)?);
    Ok(ExitCode::SUCCESS)
}

async fn verify_token(text: &str) -> Result<ExitCode> {
    let config = CustodyConfig::from_env()?;
    let token = Token::decode(text.trim())?;
    let vault = orchestrator(&config).await?;
    let chain = vault.verify_token(&token)?;
    println!("root:       {}", chain.root);
    println!("holder:     {}", chain.holder);
    println!("command:    {}", chain.command);
    println!("expires_at: {}", chain.expires_at);
    println!("depth:      {}", chain.depth);
    for (key, value) in &chain.constraints {
        println!("{key}: {value}");
    }
    Ok(ExitCode::SUCCESS)
}
