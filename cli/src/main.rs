//! Threadline CLI: a line-oriented chat client.
//!
//! ```text
//! stdin line ─> Command::parse ─> ThreadNavigator action ─> stop_active_stream
//!                    │
//!                    └─ message ─> ChatSession::send ─> reply printer (waits for idle)
//! ```
//!
//! Ctrl-C stops the active response without exiting.

mod commands;

use anyhow::{Context as _, Result};
use std::{
    env,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use threadline_engine::{
    ChatEndpoints, ChatSession, FileThreadStore, HttpChatTransport, HttpThreadApi, HttpThreadStore,
    NonEmptyString, Role, Route, StreamStatus, ThreadId, ThreadNavigator, ThreadlineConfig,
    wait_for_chat_idle,
};

use commands::{Command, help_text};

/// How long the reply printer waits for a response to finish.
const REPLY_WAIT: Duration = Duration::from_secs(600);

const LOG_FILE_NAME: &str = "threadline.log";

/// `~/.threadline`, or `./.threadline` without a home directory.
fn data_dir() -> PathBuf {
    ThreadlineConfig::data_dir().unwrap_or_else(|| PathBuf::from(".threadline"))
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Log to `<data dir>/logs`, falling back to the temp dir. Stdout carries the
/// conversation, so with neither writable nothing is logged.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let mut unavailable = Vec::new();
    let opened = [
        data_dir().join("logs").join(LOG_FILE_NAME),
        env::temp_dir().join(LOG_FILE_NAME),
    ]
    .into_iter()
    .find_map(|path| match open_append(&path) {
        Ok(file) => Some((path, file)),
        Err(error) => {
            unavailable.push((path, error));
            None
        }
    });

    let Some((path, file)) = opened else {
        tracing_subscriber::registry().with(filter).init();
        return;
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    tracing::info!(path = %path.display(), "Logging to file");
    for (path, error) in unavailable {
        tracing::warn!(path = %path.display(), %error, "Log file unavailable");
    }
}

/// `--base-url URL` or `--base-url=URL`; nothing else is accepted.
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Option<String>> {
    let mut args = args.into_iter();
    let mut base_url = None;
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--base-url=") {
            base_url = Some(value.to_string());
        } else if arg == "--base-url" {
            base_url = Some(args.next().context("--base-url needs a value")?);
        } else {
            anyhow::bail!("unknown argument: {arg}\nusage: threadline [--base-url URL]");
        }
    }
    Ok(base_url)
}

fn resolve_endpoints(base_url: Option<String>) -> Result<ChatEndpoints> {
    let config = match ThreadlineConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Ignoring config: {e}");
            ThreadlineConfig::default()
        }
    };

    let endpoints = match base_url {
        Some(url) => config
            .server
            .unwrap_or_default()
            .endpoints(Some(&url))?,
        None => config.endpoints()?,
    };
    Ok(endpoints)
}

/// Print the reply to the request just sent once the session goes idle.
fn spawn_reply_printer(session: ChatSession) {
    tokio::spawn(async move {
        wait_for_chat_idle(&session.status_getter(), Some(REPLY_WAIT)).await;
        match session.status() {
            Some(StreamStatus::Error) => {
                let error = session.last_error().unwrap_or_default();
                println!("! {error}");
            }
            _ => {
                if let Some(reply) = session
                    .messages()
                    .last()
                    .filter(|m| m.role == Role::Assistant)
                {
                    println!("< {}", reply.content);
                }
            }
        }
    });
}

fn parse_thread_id(raw: Option<&str>) -> Option<ThreadId> {
    let Some(raw) = raw else {
        println!("! missing thread id");
        return None;
    };
    match raw.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            println!("! {e}");
            None
        }
    }
}

fn print_threads(nav: &ThreadNavigator) {
    let active = nav.active_thread();
    for thread in nav.threads() {
        let marker = if thread.id == active { '*' } else { ' ' };
        println!("{marker} {}  {}", thread.id, thread.title);
    }
}

/// Returns false when the user asked to quit.
async fn handle_line(nav: &mut ThreadNavigator, line: &str) -> bool {
    match Command::parse(line) {
        Command::Empty => {}
        Command::Message(text) => {
            let Ok(text) = NonEmptyString::new(text) else {
                return true;
            };
            nav.send(text);
            spawn_reply_printer(nav.session().clone());
        }
        Command::New => {
            let id = nav.new_thread().await;
            println!("Started thread {id}");
        }
        Command::Threads => print_threads(nav),
        Command::Switch(raw) => {
            if let Some(id) = parse_thread_id(raw) {
                match nav.switch_thread(id).await {
                    Ok(()) => println!("Switched to {id}"),
                    Err(e) => println!("! {e}"),
                }
            }
        }
        Command::Delete(raw) => {
            if let Some(id) = parse_thread_id(raw) {
                match nav.delete_thread(id).await {
                    Ok(()) => println!("Deleted {id}"),
                    Err(e) => println!("! {e}"),
                }
            }
        }
        Command::Memories => {
            nav.navigate_away(Route::Memories).await;
            println!("(memories)");
        }
        Command::Home => {
            nav.navigate_away(Route::Home).await;
            println!("(home)");
        }
        Command::Stop => {
            let report = nav.stop().await;
            if !report.was_noop() {
                println!("Stopped");
            }
        }
        Command::Help => println!("{}", help_text()),
        Command::Unknown(cmd) => println!("! unknown command /{cmd}; try /help"),
        Command::Quit => return false,
    }
    true
}

async fn run(nav: &mut ThreadNavigator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(nav, &line).await {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                let report = nav.stop().await;
                tracing::info!(?report, "Interrupted");
                if !report.was_noop() {
                    println!("Stopped");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let endpoints = resolve_endpoints(parse_args(env::args().skip(1))?)?;
    tracing::info!(base_url = endpoints.base_url(), "Using chat server");

    let history = FileThreadStore::new(data_dir().join("threads"));
    let saved = history.saved_threads().unwrap_or_else(|e| {
        tracing::warn!(dir = %history.dir().display(), error = %e, "Failed to list saved threads");
        Vec::new()
    });
    let store = Arc::new(HttpThreadStore::new(endpoints.clone(), history));

    let session = ChatSession::with_store(
        Arc::new(HttpChatTransport::new(endpoints.clone())),
        ThreadId::new(),
        store.clone(),
    );
    let mut nav = ThreadNavigator::new(session, store).with_saved_threads(saved);
    if endpoints.supports_run_cancellation() {
        nav = nav.with_thread_api(Arc::new(HttpThreadApi::new(endpoints)));
    }

    println!("Thread {} (/help for commands)", nav.active_thread());
    let result = run(&mut nav).await;
    nav.stop_and_save().await;
    result
}
