//! CLI binary for edgequake-ipaper.
//!
//! A thin shim over the library crate: each subcommand builds a
//! `ConversionLifecycle` over a throwaway record and prints the result.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use edgequake_ipaper::adapter::{BoxError, Record, SingleAttachment};
use edgequake_ipaper::path::{is_url, StorageDescriptor};
use edgequake_ipaper::remote::http::HttpService;
use edgequake_ipaper::{
    build_embed_code, AccessLevel, ConfigStore, ConversionLifecycle, EmbedOptions, EmbedValue,
    LifecycleObserver, PollConfig, RemoteDocumentRef, RemoteDocumentStatus, ServiceConfig,
    SessionManager, StorageMode, UploadOutcome,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

fn paint_status(status: RemoteDocumentStatus) -> String {
    match status {
        RemoteDocumentStatus::Done => green(status.as_str()),
        RemoteDocumentStatus::Error => red(status.as_str()),
        RemoteDocumentStatus::Unknown => dim(status.as_str()),
        RemoteDocumentStatus::Processing => bold(status.as_str()),
    }
}

// ── Throwaway record ─────────────────────────────────────────────────────────

/// A record that lives only for one CLI invocation.
struct CliDocument {
    source: String,
    content_type: Option<String>,
    access: Option<AccessLevel>,
    owner: Option<String>,
    remote: Option<RemoteDocumentRef>,
}

impl CliDocument {
    fn converted(doc_id: &str, access_key: &str) -> Self {
        Self {
            source: doc_id.to_string(),
            content_type: None,
            access: None,
            owner: None,
            remote: RemoteDocumentRef::new(doc_id, access_key),
        }
    }
}

#[async_trait]
impl Record for CliDocument {
    fn record_id(&self) -> String {
        self.source.clone()
    }

    fn access_override(&self) -> Option<AccessLevel> {
        self.access
    }

    fn owner_id(&self) -> Option<String> {
        self.owner.clone()
    }

    async fn persist(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl SingleAttachment for CliDocument {
    fn content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    fn storage(&self) -> StorageDescriptor {
        if is_url(&self.source) {
            // The service fetches any URL given on the command line.
            StorageDescriptor::hosted(&self.source).with_mode(StorageMode::S3)
        } else {
            StorageDescriptor::local(absolute(Path::new(&self.source)))
        }
    }

    fn remote_ref(&self) -> Option<RemoteDocumentRef> {
        self.remote.clone()
    }

    fn set_remote_ref(&mut self, value: Option<RemoteDocumentRef>) {
        self.remote = value;
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Content type from a file extension, for the common convertible formats.
fn guess_content_type(source: &str) -> Option<&'static str> {
    let name = source.split(['?', '#']).next().unwrap_or(source);
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "png" => "image/png",
        "doc" => "application/msword",
        "ppt" | "pps" => "application/vnd.ms-powerpoint",
        "xls" => "application/vnd.ms-excel",
        "ps" | "eps" => "application/postscript",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "odt" => "application/vnd.oasis.opendocument.text",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        "sxw" => "application/vnd.sun.xml.writer",
        "sxi" => "application/vnd.sun.xml.impress",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    })
}

// ── Wait spinner ─────────────────────────────────────────────────────────────

/// Spinner that redraws on every status read.
struct SpinnerObserver {
    bar: ProgressBar,
    reads: AtomicU32,
}

impl SpinnerObserver {
    fn new(doc_id: &str) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix(format!("Document {doc_id}"));
        bar.set_message("waiting for first status…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            reads: AtomicU32::new(0),
        })
    }
}

impl LifecycleObserver for SpinnerObserver {
    fn on_status(&self, _record: &str, _attachment: &str, status: RemoteDocumentStatus) {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_message(format!("{}  {}", paint_status(status), dim(&format!("read {n}"))));
    }
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a local file privately
  ipaper upload reports/q3.pdf

  # Let the service fetch a hosted file, and make it public
  ipaper upload https://bucket.s3.amazonaws.com/q3.pdf --access public

  # Check several documents at once
  ipaper status 1234 5678 9012

  # Block until conversion finishes
  ipaper wait 1234 --interval-ms 1000 --max-attempts 60

  # Viewer markup with display options
  ipaper embed 1234 key-abc --param height=600 --param auto_size=false

CONFIG (TOML, default ./config/ipaper.toml):
  key      = "api key"
  secret   = "api secret"
  user     = "account"
  password = "account password"
  access   = "private"        # or "public"
  storage  = "local"          # or "s3"

ENVIRONMENT VARIABLES:
  IPAPER_CONFIG   Path to the config file
  RUST_LOG        Log filter (overrides --verbose / --quiet)
"#;

/// Upload documents for iPaper conversion and manage their lifecycle.
#[derive(Parser, Debug)]
#[command(
    name = "ipaper",
    version,
    about = "Upload documents for iPaper conversion and manage their lifecycle",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the service config file.
    #[arg(long, global = true, env = "IPAPER_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long, global = true, env = "IPAPER_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IPAPER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IPAPER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a local file or URL for conversion.
    Upload {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Document visibility. Defaults to the configured access level.
        #[arg(long, value_enum)]
        access: Option<AccessArg>,

        /// Content type. Guessed from the file extension if omitted.
        #[arg(long)]
        content_type: Option<String>,

        /// Owner id forwarded to the service.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Print the conversion status of one or more documents.
    Status {
        #[arg(required = true)]
        doc_ids: Vec<String>,

        /// Concurrent lookups.
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Poll until a document's conversion completes.
    Wait {
        doc_id: String,

        /// Delay before the second status read.
        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,

        /// Maximum status reads.
        #[arg(long, default_value_t = 30)]
        max_attempts: u32,

        /// Poll at a fixed interval instead of backing off.
        #[arg(long)]
        no_backoff: bool,
    },

    /// Delete a converted document from the service.
    Destroy { doc_id: String },

    /// Print viewer markup for a converted document.
    Embed {
        doc_id: String,
        access_key: String,

        /// Display option as key=value. Unknown keys are ignored.
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Load the config and try to log in.
    CheckConfig {
        /// Only validate the config file; do not contact the service.
        #[arg(long)]
        offline: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AccessArg {
    Public,
    Private,
}

impl From<AccessArg> for AccessLevel {
    fn from(v: AccessArg) -> Self {
        match v {
            AccessArg::Public => AccessLevel::Public,
            AccessArg::Private => AccessLevel::Private,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        // Embedding is pure; no config or session needed.
        Command::Embed {
            doc_id,
            access_key,
            params,
        } => {
            let options = parse_params(&params)?;
            println!("{}", build_embed_code(&doc_id, &access_key, &options));
        }

        Command::Upload {
            input,
            access,
            content_type,
            owner,
        } => {
            let content_type = content_type
                .or_else(|| guess_content_type(&input).map(str::to_string))
                .with_context(|| {
                    format!("Cannot guess the content type of {input}; pass --content-type")
                })?;
            let mut record = CliDocument {
                source: input,
                content_type: Some(content_type),
                access: access.map(AccessLevel::from),
                owner,
                remote: None,
            };

            let conn = connect(cli.config.as_deref())?;
            let outcome = conn
                .lifecycle
                .upload(&mut record)
                .await
                .context("Upload failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            match outcome {
                UploadOutcome::Uploaded { doc } => {
                    if !cli.quiet {
                        eprintln!("{} uploaded {}", green("✔"), bold(&record.source));
                    }
                    println!("doc_id:     {}", doc.remote_id());
                    println!("access_key: {}", doc.access_key());
                }
                UploadOutcome::Skipped { reason } => {
                    bail!("{} not uploaded: {}", record.source, reason);
                }
            }
        }

        Command::Status {
            doc_ids,
            concurrency,
        } => {
            let lifecycle = connect(cli.config.as_deref())?.lifecycle;
            let results: Vec<(String, RemoteDocumentStatus)> = stream::iter(doc_ids)
                .map(|id| {
                    let lifecycle = lifecycle.clone();
                    async move {
                        let status = lifecycle.document_status(&id).await;
                        (id, status)
                    }
                })
                .buffered(concurrency.max(1))
                .collect()
                .await;

            if cli.json {
                let rows: Vec<_> = results
                    .iter()
                    .map(|(id, status)| {
                        serde_json::json!({
                            "doc_id": id,
                            "status": status,
                            "complete": status.is_complete(),
                            "successful": status.is_successful(),
                            "error": status.is_error(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (id, status) in &results {
                    println!("{:<16} {}", id, paint_status(*status));
                }
            }
        }

        Command::Wait {
            doc_id,
            interval_ms,
            max_attempts,
            no_backoff,
        } => {
            let poll = PollConfig {
                interval_ms,
                max_attempts,
                backoff: !no_backoff,
                ..PollConfig::default()
            };

            let lifecycle = connect(cli.config.as_deref())?.lifecycle;
            let spinner = (!cli.quiet && !cli.json).then(|| SpinnerObserver::new(&doc_id));
            let lifecycle = match &spinner {
                Some(s) => lifecycle.with_observer(Arc::clone(s) as Arc<dyn LifecycleObserver>),
                None => lifecycle,
            };
            let status = lifecycle.wait_for_document(&doc_id, &poll).await;
            if let Some(s) = &spinner {
                s.bar.finish_and_clear();
            }

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "doc_id": doc_id,
                        "status": status,
                    }))?
                );
            } else {
                println!("{:<16} {}", doc_id, paint_status(status));
            }
            if !status.is_successful() {
                bail!("document {doc_id} did not convert successfully ({status})");
            }
        }

        Command::Destroy { doc_id } => {
            // Any access key works here; deletion is by id.
            let lifecycle = connect(cli.config.as_deref())?.lifecycle;
            let mut record = CliDocument::converted(&doc_id, "-");
            let outcome = lifecycle.destroy_remote(&mut record).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if !cli.quiet {
                eprintln!("{} {}: {:?}", if outcome.is_gone() { green("✔") } else { red("✘") }, doc_id, outcome);
            }
            if !outcome.is_gone() {
                bail!("document {doc_id} was not deleted");
            }
        }

        Command::CheckConfig { offline } => {
            let Connection {
                store,
                config,
                sessions,
                ..
            } = connect(cli.config.as_deref())?;
            if !cli.quiet {
                eprintln!("{} config {}", green("✔"), store.path().display());
                eprintln!("   user:    {}", config.username);
                eprintln!("   access:  {}", config.default_access);
                eprintln!("   storage: {:?}", config.storage_mode);
            }
            if !offline {
                sessions.session().await.context("Login failed")?;
                if !cli.quiet {
                    eprintln!("{} logged in", green("✔"));
                }
            }
        }
    }

    Ok(())
}

/// Everything a remote subcommand needs.
struct Connection {
    store: Arc<ConfigStore>,
    config: Arc<ServiceConfig>,
    sessions: Arc<SessionManager>,
    lifecycle: ConversionLifecycle<CliDocument>,
}

fn connect(config_path: Option<&Path>) -> Result<Connection> {
    let store = Arc::new(match config_path {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::from_env(),
    });
    let config = store
        .load()
        .with_context(|| format!("Failed to load config from {}", store.path().display()))?;
    let service = HttpService::from_config(&config).context("Failed to build HTTP client")?;
    let sessions = Arc::new(SessionManager::new(Arc::clone(&store), Arc::new(service)));
    let lifecycle = ConversionLifecycle::single(Arc::clone(&sessions));
    Ok(Connection {
        store,
        config,
        sessions,
        lifecycle,
    })
}

/// Parse repeated `key=value` flags into embed options.
fn parse_params(params: &[String]) -> Result<EmbedOptions> {
    params
        .iter()
        .map(|p| {
            p.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), EmbedValue::parse(v)))
                .with_context(|| format!("Invalid --param '{p}', expected KEY=VALUE"))
        })
        .collect()
}
