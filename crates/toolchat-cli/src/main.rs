//! Toolchat CLI - terminal REPL for tool-augmented LLM chat.
//!
//! This is the entry point for the `toolchat` binary.

mod commands;
mod render;

use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use toolchat_control::openapi::{
    build_api_request_tool, build_schema_context, endpoints_needing_llm_headers,
};
use toolchat_control::{
    Canceller, ChatConfig, ChatSession, HttpModelClient, HttpToolExecutor, SessionEvent,
    ToolEdit,
};
use toolchat_core::{CoreError, SessionId};
use toolchat_store::{MemoryStore, RocksStore, TranscriptStore};

use commands::{Command, HELP};
use render::{format_pending, format_request, Renderer};

/// Toolchat - chat with a model that can call your HTTP API.
#[derive(Parser, Debug)]
#[command(name = "toolchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file; flags override its fields.
    #[arg(long, env = "TOOLCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Streaming chat endpoint.
    #[arg(long, env = "TOOLCHAT_CHAT_URL")]
    chat_url: Option<String>,

    /// Model provider base URL.
    #[arg(long, env = "TOOLCHAT_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Model provider API key.
    #[arg(long, env = "TOOLCHAT_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Model identifier.
    #[arg(long, env = "TOOLCHAT_MODEL")]
    model: Option<String>,

    /// Completion token limit.
    #[arg(long, env = "TOOLCHAT_MAX_TOKENS")]
    max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arg(long, env = "TOOLCHAT_TEMPERATURE")]
    temperature: Option<f32>,

    /// Origin that tool call paths are resolved against.
    #[arg(long, env = "TOOLCHAT_TOOL_BASE_URL")]
    tool_base_url: Option<String>,

    /// Bearer token sent with tool calls.
    #[arg(long, env = "TOOLCHAT_TOOL_API_KEY", hide_env_values = true)]
    tool_api_key: Option<String>,

    /// `OpenAPI` document of the tool target (file path or URL).
    #[arg(long, env = "TOOLCHAT_SCHEMA")]
    schema: Option<String>,

    /// Offer the API tool to the model.
    #[arg(long, default_value = "false")]
    enable_tools: bool,

    /// Run proposed tool calls without confirmation.
    #[arg(long, default_value = "false")]
    auto_execute: bool,

    /// Stored session to resume.
    #[arg(long)]
    session: Option<String>,

    /// Directory of the transcript database.
    #[arg(long, env = "TOOLCHAT_DATA_DIR", default_value = ".toolchat")]
    data_dir: PathBuf,

    /// Keep the transcript in memory only.
    #[arg(long, default_value = "false")]
    ephemeral: bool,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

impl Args {
    /// Override configuration fields given on the command line.
    fn apply(&self, config: &mut ChatConfig) {
        if let Some(url) = &self.chat_url {
            config.chat_url.clone_from(url);
        }
        if let Some(url) = &self.llm_base_url {
            config.llm.base_url.clone_from(url);
        }
        if let Some(key) = &self.llm_api_key {
            config.llm.api_key.clone_from(key);
        }
        if let Some(model) = &self.model {
            config.llm.model_id.clone_from(model);
        }
        if self.max_tokens.is_some() {
            config.llm.max_tokens = self.max_tokens;
        }
        if self.temperature.is_some() {
            config.llm.temperature = self.temperature;
        }
        if let Some(url) = &self.tool_base_url {
            config.tools.base_url.clone_from(url);
        }
        if self.tool_api_key.is_some() {
            config.tools.api_key.clone_from(&self.tool_api_key);
        }
        if self.enable_tools {
            config.tools.enable_tools = true;
        }
        if self.auto_execute {
            config.tools.auto_execute = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ChatConfig::default(),
    };
    args.apply(&mut config);

    let schema = match &args.schema {
        Some(source) => Some(load_schema(source, &config).await?),
        None => None,
    };

    let session_id = match &args.session {
        Some(raw) => raw
            .parse::<SessionId>()
            .map_err(CoreError::from)
            .context("invalid --session")?,
        None => SessionId::generate(),
    };

    let resume = args.session.is_some();
    if args.ephemeral {
        run(Arc::new(MemoryStore::new()), session_id, resume, config, schema).await
    } else {
        let store = RocksStore::open(&args.data_dir)
            .with_context(|| format!("opening {}", args.data_dir.display()))?;
        run(Arc::new(store), session_id, resume, config, schema).await
    }
}

/// Log to stderr when `--debug` or `RUST_LOG` asks for it.
fn init_tracing(debug: bool) {
    let filter = if debug {
        Some(tracing_subscriber::EnvFilter::new(
            "toolchat=debug,toolchat_control=debug,toolchat_store=debug,warn",
        ))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().ok()
    };

    if let Some(filter) = filter {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<ChatConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

async fn load_schema(source: &str, config: &ChatConfig) -> anyhow::Result<Value> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        let schema = client
            .get(source)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("fetching schema {source}"))?
            .json::<Value>()
            .await
            .with_context(|| format!("parsing schema {source}"))?;
        return Ok(schema);
    }

    let text =
        std::fs::read_to_string(source).with_context(|| format!("reading schema {source}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing schema {source}"))
}

async fn run<S: TranscriptStore + 'static>(
    store: Arc<S>,
    session_id: SessionId,
    resume: bool,
    config: ChatConfig,
    schema: Option<Value>,
) -> anyhow::Result<()> {
    if resume && !store.list_sessions()?.contains(&session_id) {
        return Err(CoreError::UnknownSession(session_id).into());
    }

    let model = Arc::new(HttpModelClient::new(&config)?);
    let tools = Arc::new(HttpToolExecutor::new(&config)?);
    let (events_tx, mut events_rx) = mpsc::channel(config.event_buffer);

    let mut session = ChatSession::open(store, session_id, model, tools, config, Some(events_tx))?;
    session.set_schema(schema);

    let mut renderer = Renderer::new(io::stdout());
    renderer.line(&format!("session {} (/help for commands)", session.session_id()))?;
    if !session.messages().is_empty() {
        renderer.history(session.messages())?;
    }

    let canceller = session.canceller();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !interrupt(&canceller) {
                std::process::exit(130);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                renderer.line(&e.to_string())?;
                continue;
            }
        };

        match command {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => renderer.line(HELP)?,
            Command::Chat(text) => {
                let result = drive(session.send_message(&text), &mut events_rx, &mut renderer).await?;
                if let Err(e) = result {
                    renderer.line(&format!("error: {e}"))?;
                }
            }
            Command::Exec => {
                let result = drive(session.execute_pending(), &mut events_rx, &mut renderer).await?;
                if let Err(e) = result {
                    renderer.line(&format!("error: {e}"))?;
                }
            }
            Command::Dismiss => {
                match drive(session.dismiss_pending(), &mut events_rx, &mut renderer).await? {
                    Ok(()) => renderer.line("dismissed")?,
                    Err(e) => renderer.line(&format!("error: {e}"))?,
                }
            }
            Command::Edit { field, value } => {
                let edited = ToolEdit::parse(&field, &value).and_then(|edit| session.edit_pending(edit));
                match (edited, session.pending_tool_call()) {
                    (Ok(()), Some(pending)) => renderer.line(&format_pending(pending))?,
                    (Ok(()), None) => {}
                    (Err(e), _) => renderer.line(&format!("error: {e}"))?,
                }
            }
            Command::Show => match session.pending_tool_call() {
                Some(pending) => {
                    renderer.line(&format_pending(pending))?;
                    let config = session.config();
                    match pending.to_request(&config.tools, &config.llm, session.schema()) {
                        Ok(request) => renderer.line(&format!("\n{}", format_request(&request)))?,
                        Err(e) => renderer.line(&format!("error: {e}"))?,
                    }
                }
                None => renderer.line("no pending tool call")?,
            },
            Command::History => renderer.history(session.messages())?,
            Command::Clear => {
                match drive(session.clear_history(), &mut events_rx, &mut renderer).await? {
                    Ok(()) => renderer.line("history cleared")?,
                    Err(e) => renderer.line(&format!("error: {e}"))?,
                }
            }
            Command::Schema => match session.schema() {
                Some(schema) => {
                    renderer.line(&build_schema_context(schema))?;
                    let gated = endpoints_needing_llm_headers(schema);
                    if !gated.is_empty() {
                        renderer.line(&format!("Endpoints receiving model settings: {}", gated.join(", ")))?;
                    }
                }
                None => renderer.line("no schema loaded (use --schema)")?,
            },
            Command::Tools => {
                let tool = build_api_request_tool(session.schema().unwrap_or(&Value::Null));
                renderer.line(&serde_json::to_string_pretty(&tool)?)?;
            }
        }
    }

    tracing::debug!(session_id = %session.session_id(), "Leaving REPL");
    Ok(())
}

/// Handle Ctrl-C: cancel the in-flight request if there is one.
///
/// Returns false when nothing was in flight and the program should exit.
fn interrupt(canceller: &Canceller) -> bool {
    if !canceller.is_active() {
        return false;
    }
    canceller.cancel();
    tracing::debug!("Interrupted in-flight request");
    true
}

/// Run a session operation while rendering the events it emits.
///
/// The session waits on the bounded event channel, so events must be drained
/// while the operation runs.
async fn drive<F, W>(
    operation: F,
    events: &mut mpsc::Receiver<SessionEvent>,
    renderer: &mut Renderer<W>,
) -> anyhow::Result<F::Output>
where
    F: Future,
    W: Write,
{
    tokio::pin!(operation);
    let output = loop {
        tokio::select! {
            output = &mut operation => break output,
            Some(event) = events.recv() => renderer.event(&event)?,
        }
    };
    while let Ok(event) = events.try_recv() {
        renderer.event(&event)?;
    }
    Ok(output)
}
