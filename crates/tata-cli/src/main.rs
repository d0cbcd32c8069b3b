//! tata - command-line client for the TATA travel-planning assistant

mod commands;
mod config;
mod http;
mod render;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tata_engine::{ChatSession, EngineConfig, ReplayTransport, Transport, TurnEnd};
use tokio::sync::broadcast::error::RecvError;

use crate::http::HttpTransport;
use crate::render::UpdatePrinter;

/// Characters of a streaming status line shown before truncating
const STATUS_PREVIEW_CHARS: usize = 200;

/// tata - plan trips with the TATA agent from your terminal
#[derive(Parser, Debug)]
#[command(name = "tata")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Streaming chat endpoint (default: http://localhost:8000/api/chat)
    #[arg(short, long)]
    api_url: Option<String>,

    /// User id sent with every request
    #[arg(short, long)]
    user_id: Option<String>,

    /// Reuse an existing session id instead of generating one
    #[arg(long)]
    session_id: Option<String>,

    /// Run in non-interactive mode with a single message
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Replay a captured response body instead of calling the agent
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Bytes per chunk when replaying
    #[arg(long, default_value_t = 64)]
    chunk_size: usize,

    /// Print session updates as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("tata=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Load config file; CLI args take precedence
    let cfg = config::Config::load();
    let engine = cfg.engine_config();
    let user_id = args.user_id.clone().unwrap_or_else(|| cfg.user_id.clone());

    let transport: Arc<dyn Transport> = match &args.replay {
        Some(path) => {
            let body = std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            Arc::new(ReplayTransport::new(body, args.chunk_size))
        }
        None => {
            let url = args.api_url.clone().unwrap_or_else(|| cfg.api_url.clone());
            Arc::new(HttpTransport::new(
                url,
                Duration::from_secs(cfg.request_timeout_secs),
            )?)
        }
    };

    let mut session = build_session(&engine, &transport, &user_id)?;
    if let Some(id) = args.session_id.clone() {
        session = session.with_session_id(id);
    }

    if args.replay.is_some() {
        let message = args.command.as_deref().unwrap_or("(replay)");
        let end = run_turn(&mut session, message, args.json).await?;
        tracing::debug!("Replay finished: {:?}", end);
        return Ok(());
    }

    if let Some(ref message) = args.command {
        run_turn(&mut session, message, args.json).await?;
        return Ok(());
    }

    run_interactive(session, &engine, &transport, &user_id, args.json).await
}

fn build_session(
    engine: &EngineConfig,
    transport: &Arc<dyn Transport>,
    user_id: &str,
) -> anyhow::Result<ChatSession> {
    Ok(ChatSession::new(engine.clone(), Arc::clone(transport))?.with_user_id(user_id))
}

/// Send one message and print updates until the turn ends.
///
/// Ctrl+C aborts the turn. Turn-ending failures have already been shown as an
/// error message when this returns `Err`.
async fn run_turn(session: &mut ChatSession, text: &str, json: bool) -> anyhow::Result<TurnEnd> {
    let mut receiver = session.subscribe();

    // Spawn update printer
    let printer = tokio::spawn(async move {
        let mut lines = UpdatePrinter::new(STATUS_PREVIEW_CHARS);
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    if json {
                        match serde_json::to_string(&update) {
                            Ok(line) => println!("{}", line),
                            Err(e) => tracing::warn!("Failed to serialize update: {}", e),
                        }
                    } else if let Some(text) = lines.lines(&update) {
                        println!("{}", text.trim_end());
                    }
                    if update.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Printer lagged, skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Abort the turn on Ctrl+C
    let handle = session.handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && handle.is_processing() {
            tracing::debug!("Interrupted; aborting turn");
            handle.abort();
        }
    });

    let result = session.send(text).await;
    interrupt.abort();

    match result {
        Ok(end) => {
            let _ = printer.await;
            Ok(end)
        }
        Err(e) if e.ends_turn() => {
            let _ = printer.await;
            Err(e.into())
        }
        Err(e) => {
            // Refused before anything was published
            printer.abort();
            Err(e.into())
        }
    }
}

async fn run_interactive(
    mut session: ChatSession,
    engine: &EngineConfig,
    transport: &Arc<dyn Transport>,
    user_id: &str,
    json: bool,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("tata session: {}", session.session_id());
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(input, session.conversation()) {
            match result {
                commands::CommandResult::Exit => break,
                commands::CommandResult::Message(msg) => println!("{}", msg.trim_end()),
                commands::CommandResult::NewSession => {
                    session = build_session(engine, transport, user_id)?;
                    println!("Started session {}", session.session_id());
                }
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}. Type /help for available commands.", cmd);
                }
            }
            continue;
        }

        // Failures are already in the transcript; keep the loop alive
        if let Err(e) = run_turn(&mut session, input, json).await {
            tracing::debug!("Turn failed: {}", e);
        }
        println!();
    }

    Ok(())
}
