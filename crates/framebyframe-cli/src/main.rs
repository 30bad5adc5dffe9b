use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use framebyframe_contracts::chat::{parse_command, ShellCommand, SHELL_HELP_COMMANDS};
use framebyframe_contracts::events::EventWriter;
use framebyframe_contracts::runs::summary::write_summary;
use framebyframe_engine::{
    default_client_name, default_client_registry, CaptureMode, CaptureOutcome, CaptureSession,
    FileCapture, InferenceClient, InferenceClientRegistry, QueuedCapture, SessionState,
};
use serde_json::{Map, Value};

#[derive(Debug, Parser)]
#[command(
    name = "framebyframe",
    version,
    about = "Capture four frames, caption them and tell their story"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture four image files in order and finalize.
    Run(RunArgs),
    /// Interactive capture shell.
    Session(SessionArgs),
    /// List inference clients.
    Clients,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long, num_args = 4, required = true)]
    frames: Vec<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    client: Option<String>,
    #[arg(long)]
    incremental: bool,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    client: Option<String>,
    #[arg(long)]
    incremental: bool,
}

const NO_STORY_MESSAGE: &str = "Could not generate a story.";
const EXIT_NO_STORY: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("framebyframe error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let clients = default_client_registry();
    match cli.command {
        Command::Run(args) => run_frames(args, &clients),
        Command::Session(args) => {
            let stdin = io::stdin();
            run_session_shell(args, &clients, stdin.lock())?;
            Ok(0)
        }
        Command::Clients => {
            for name in clients.names() {
                println!("{name}");
            }
            Ok(0)
        }
    }
}

fn capture_mode(incremental: bool) -> CaptureMode {
    if incremental {
        CaptureMode::Incremental
    } else {
        CaptureMode::Batch
    }
}

fn resolve_client(
    clients: &InferenceClientRegistry,
    requested: Option<&str>,
) -> Result<Arc<dyn InferenceClient>> {
    let name = requested
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(default_client_name);
    clients.get(&name).ok_or_else(|| {
        anyhow!(
            "unknown client '{name}' (available: {})",
            clients.names().join(", ")
        )
    })
}

fn open_session(
    out: &Path,
    events: Option<PathBuf>,
    clients: &InferenceClientRegistry,
    client: Option<&str>,
    incremental: bool,
) -> Result<(CaptureSession, PathBuf)> {
    fs::create_dir_all(out).with_context(|| format!("failed creating {}", out.display()))?;
    let events_path = events.unwrap_or_else(|| out.join("events.jsonl"));
    let client = resolve_client(clients, client)?;
    let session = CaptureSession::new(client, capture_mode(incremental))
        .with_events(EventWriter::new(&events_path, ""));
    Ok((session, events_path))
}

fn run_frames(args: RunArgs, clients: &InferenceClientRegistry) -> Result<i32> {
    let (mut session, events_path) = open_session(
        &args.out,
        args.events.clone(),
        clients,
        args.client.as_deref(),
        args.incremental,
    )?;

    let mut source = QueuedCapture::new(args.frames.iter().cloned());
    for path in &args.frames {
        match session.on_capture_requested(&mut source)? {
            CaptureOutcome::Ignored => {
                eprintln!("Skipped unreadable frame: {}", path.display())
            }
            CaptureOutcome::Stored { position } | CaptureOutcome::Finalized { position } => {
                println!("Captured frame {position}: {}", path.display())
            }
            CaptureOutcome::Refused => break,
        }
    }

    if !session.is_finalized() {
        bail!(
            "only {} of {} frames were captured",
            session.slots().captured_count(),
            session.slots().len()
        );
    }

    print!("{}", render_report(&session));
    write_session_summary(&args.out, &session, &events_path)?;
    Ok(exit_code(&session))
}

fn exit_code(session: &CaptureSession) -> i32 {
    if session.narrative().is_some() {
        0
    } else {
        EXIT_NO_STORY
    }
}

fn write_session_summary(out: &Path, session: &CaptureSession, events_path: &Path) -> Result<()> {
    let mut extra = Map::new();
    extra.insert(
        "events_path".to_string(),
        Value::String(events_path.to_string_lossy().to_string()),
    );
    write_summary(&out.join("summary.json"), &session.summary(), Some(&extra))
}

fn render_status(session: &CaptureSession) -> String {
    let state = match session.state() {
        SessionState::Capturing { cursor } => format!("capturing frame {cursor}"),
        SessionState::AwaitingFinalization => "awaiting captions".to_string(),
        SessionState::Finalized => "finalized".to_string(),
    };
    let mut lines = vec![format!(
        "Session {} ({}, {}): {state}",
        session.session_id(),
        session.client_name(),
        session.mode().as_str()
    )];
    for position in 1..=session.slots().len() {
        let Some(view) = session.slot_view(position) else {
            continue;
        };
        let marker = if view.has_image { "x" } else { " " };
        let caption = view.caption.as_deref().unwrap_or("-");
        lines.push(format!("  [{marker}] {position}. {caption}"));
    }
    lines.join("\n") + "\n"
}

fn render_report(session: &CaptureSession) -> String {
    let mut report = render_status(session);
    match session.narrative() {
        Some(story) => {
            let source = session
                .narrative_source()
                .map(|source| source.as_str())
                .unwrap_or("unknown");
            report.push_str(&format!("Story ({source}): {story}\n"));
        }
        None => {
            report.push_str(NO_STORY_MESSAGE);
            report.push('\n');
        }
    }
    for warning in session.warnings() {
        report.push_str(&format!("Warning: {warning}\n"));
    }
    report
}

fn run_session_shell(
    args: SessionArgs,
    clients: &InferenceClientRegistry,
    mut input: impl BufRead,
) -> Result<()> {
    let (mut session, events_path) = open_session(
        &args.out,
        args.events.clone(),
        clients,
        args.client.as_deref(),
        args.incremental,
    )?;

    println!("Frame by Frame session started. Type /help for commands.");
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_command(&line) {
            ShellCommand::Noop => {}
            ShellCommand::Help => println!("Commands: {}", SHELL_HELP_COMMANDS.join(" ")),
            ShellCommand::Quit => break,
            ShellCommand::Clients => println!("Clients: {}", clients.names().join(", ")),
            ShellCommand::UseClient { name } => match resolve_client(clients, Some(&name)) {
                Ok(client) => {
                    session.set_client(client);
                    println!("Client set to {}", session.client_name());
                }
                Err(err) => println!("{err}"),
            },
            ShellCommand::Status => print!("{}", render_status(&session)),
            ShellCommand::Story => match session.narrative() {
                Some(story) => println!("{story}"),
                None if session.is_finalized() => println!("{NO_STORY_MESSAGE}"),
                None => println!("No story yet."),
            },
            ShellCommand::Reset => {
                session.reset();
                println!("Session reset ({}).", session.session_id());
            }
            ShellCommand::Capture { path } => {
                if path.is_empty() {
                    println!("/capture requires a path");
                    continue;
                }
                let mut source = FileCapture::new(&path);
                match session.on_capture_requested(&mut source) {
                    Ok(CaptureOutcome::Ignored) => println!("Could not read {path}; ignored."),
                    Ok(CaptureOutcome::Refused) => {
                        println!("All frames are captured. Use /reset to start over.")
                    }
                    Ok(CaptureOutcome::Stored { position }) => {
                        println!("Captured frame {position}.")
                    }
                    Ok(CaptureOutcome::Finalized { position }) => {
                        println!("Captured frame {position}.");
                        print!("{}", render_report(&session));
                        write_session_summary(&args.out, &session, &events_path)?;
                    }
                    Err(err) => println!("Capture failed: {err}"),
                }
            }
            ShellCommand::Unknown { command, .. } => {
                println!("Unknown command /{command}. Type /help for commands.")
            }
        }
    }
    Ok(())
}
