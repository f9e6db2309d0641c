//! Chatstream CLI
//!
//! Terminal surface for a streaming conversation with the assistant server.
//!
//! # Usage
//!
//! ```bash
//! # Interactive conversation (default)
//! chatstream
//!
//! # One question, reply streamed to stdout
//! chatstream ask "What are the symptoms of influenza?"
//!
//! # Analyze a scanned document
//! chatstream analyze ./scan.png
//!
//! # Against another server, with verbose logging
//! chatstream --api-url http://10.0.0.5:8000 -vv
//! ```
//!
//! # Environment Variables
//!
//! - `CHATSTREAM_CONFIG`: Path of the TOML config file
//! - `CHATSTREAM_API_URL`: Server base URL (default: `http://localhost:8000`)
//! - `CHATSTREAM_CONNECT_TIMEOUT`: Connect timeout in milliseconds
//! - `CHATSTREAM_IDLE_TIMEOUT`: Longest silence between events in milliseconds (0 disables)
//! - `CHATSTREAM_MAX_HISTORY`: Turns of history sent per request (0 = all)
//! - `RUST_LOG`: Log filter, overrides `-v`
//!
//! # Signals
//!
//! - SIGINT while a reply streams: cancel the reply, keep the partial text
//! - SIGINT at the prompt: exit

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use chatstream_core::{
    load_config_from_path, AnalysisClient, ChatBackend, ChatSession, ClientConfig,
    ConfigOverrides, DocumentUpload, HttpBackend, IngestOutcome, IngestReport, SessionUpdate,
    TurnId, TurnRole,
};

#[derive(Debug, Parser)]
#[command(name = "chatstream", version, about = "Streaming chat client")]
struct Cli {
    /// Config file (default: ~/.config/chatstream/client.toml)
    #[arg(long, global = true, env = "CHATSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Server base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, global = true)]
    connect_timeout_ms: Option<u64>,

    /// Longest wait between events in milliseconds (0 disables)
    #[arg(long, global = true)]
    idle_timeout_ms: Option<u64>,

    /// Turns of history sent with each message (0 = all)
    #[arg(long, global = true)]
    max_history: Option<usize>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive conversation
    Chat,
    /// Send one message and print the reply
    Ask {
        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Upload an image document for analysis and print the result as JSON
    Analyze {
        /// Image file
        file: PathBuf,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.api_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            overrides = overrides.with_connect_timeout_ms(ms);
        }
        if let Some(ms) = self.idle_timeout_ms {
            overrides = overrides.with_idle_timeout_ms(ms);
        }
        if let Some(turns) = self.max_history {
            overrides = overrides.with_max_history_turns(turns);
        }
        overrides
    }
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new(format!(
            "chatstream={level},chatstream_core={level}"
        )),
    };

    // Logs go to stderr so stdout carries only conversation text
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

fn load(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let path = cli
        .config
        .clone()
        .or_else(chatstream_core::default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    cli.overrides()
        .apply(&mut config)
        .context("Invalid command-line option")?;

    info!(
        source = %config.source(),
        base_url = %config.base_url,
        idle_timeout = ?config.idle_timeout,
        max_history = config.max_history_turns,
        "Configuration loaded"
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let config = load(&cli)?;

    match cli.command {
        None | Some(Command::Chat) => chat(&config).await,
        Some(Command::Ask { ref message }) => ask(&config, message.join(" ")).await,
        Some(Command::Analyze { ref file }) => analyze(&config, file).await,
    }
}

async fn chat(config: &ClientConfig) -> anyhow::Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let mut session = ChatSession::with_config(backend, config);
    let mut updates = session.subscribe(config.update_buffer);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!(session = %session.id(), url = %config.base_url, "Chat started");
    stdout
        .write_all(b"Type a message. /clear resets the conversation, /quit exits.\n")
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear()?;
                drain(&mut updates);
                stdout.write_all(b"Conversation cleared.\n").await?;
                continue;
            }
            "/stats" => {
                let stats = session.stats();
                let text = format!(
                    "requests={} completed={} failed={} cancelled={} dropped_records={}\n",
                    stats.requests,
                    stats.completed,
                    stats.failed,
                    stats.cancelled,
                    stats.records_dropped
                );
                stdout.write_all(text.as_bytes()).await?;
                continue;
            }
            _ => {}
        }

        let report = run_turn(&mut session, &mut updates, line).await?;
        if report.outcome == IngestOutcome::Cancelled {
            stdout.write_all(b"[cancelled]\n").await?;
        }
    }

    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    debug!(stats = ?session.stats(), "Chat finished");
    Ok(())
}

async fn ask(config: &ClientConfig, message: String) -> anyhow::Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let mut session = ChatSession::with_config(backend, config);
    let mut updates = session.subscribe(config.update_buffer);

    let report = run_turn(&mut session, &mut updates, message).await?;
    match report.outcome {
        IngestOutcome::Completed => Ok(()),
        IngestOutcome::Cancelled => anyhow::bail!("Cancelled"),
        IngestOutcome::Failed(kind) => anyhow::bail!("Request failed: {kind:?}"),
    }
}

async fn analyze(config: &ClientConfig, file: &Path) -> anyhow::Result<()> {
    let client = AnalysisClient::from_config(config)?;
    let upload = DocumentUpload::from_path(file).await?;

    info!(url = %client.url(), file = %file.display(), "Analyzing document");
    let result = client.analyze(upload).await?;

    let mut stdout = tokio::io::stdout();
    let json = serde_json::to_string_pretty(&result)?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

/// Submit one message, render the reply as it streams, cancel on Ctrl-C
async fn run_turn<B: ChatBackend>(
    session: &mut ChatSession<B>,
    updates: &mut mpsc::Receiver<SessionUpdate>,
    text: String,
) -> anyhow::Result<IngestReport> {
    let cancel = session.cancel_handle();
    let mut renderer = Renderer::default();
    let mut stdout = tokio::io::stdout();

    let report = {
        let submit = session.submit(text);
        tokio::pin!(submit);

        loop {
            tokio::select! {
                report = &mut submit => break report,
                Some(update) = updates.recv() => {
                    write_text(&mut stdout, &renderer.render(&update)).await?;
                }
                _ = signal::ctrl_c() => {
                    debug!("Interrupt received, cancelling reply");
                    cancel.cancel();
                }
            }
        }
    };

    // The final snapshot may still be queued
    while let Ok(update) = updates.try_recv() {
        write_text(&mut stdout, &renderer.render(&update)).await?;
    }
    Ok(report?)
}

async fn write_text(stdout: &mut tokio::io::Stdout, text: &str) -> anyhow::Result<()> {
    if !text.is_empty() {
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn drain(updates: &mut mpsc::Receiver<SessionUpdate>) {
    while updates.try_recv().is_ok() {}
}

/// Turns snapshots of the transcript into terminal output
///
/// Prints only what was appended since the last snapshot. When the text was
/// replaced instead (a failed reply), the new text goes on a fresh line.
#[derive(Debug, Default)]
struct Renderer {
    turn: Option<TurnId>,
    shown: String,
    done: bool,
}

impl Renderer {
    fn render(&mut self, update: &SessionUpdate) -> String {
        let mut out = String::new();
        let Some(turn) = update.snapshot.last() else {
            return out;
        };
        if turn.role() != TurnRole::Assistant {
            return out;
        }

        if self.turn.as_ref() != Some(turn.id()) {
            self.turn = Some(turn.id().clone());
            self.shown.clear();
            self.done = false;
        }
        if self.done {
            return out;
        }

        let content = turn.content();
        if let Some(suffix) = content.strip_prefix(self.shown.as_str()) {
            out.push_str(suffix);
        } else {
            out.push('\n');
            out.push_str(content);
        }
        self.shown.clear();
        self.shown.push_str(content);

        if !turn.is_open() {
            out.push('\n');
            self.done = true;
        }
        out
    }
}
