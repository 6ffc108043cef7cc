use std::path::PathBuf;

use clap::Parser;
use gemini_notepad::{
    AiCapability, AiDispatcher, AiReply, AppConfig, FileStorage, GeminiClient, Handled,
    LocalProfileProvider, NoteStore, Notepad, NotepadSettings, Request, Response, SaveStatus,
    Session, User,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

type App = Notepad<FileStorage, LocalProfileProvider, GeminiClient>;

/// Line-oriented front end: one JSON request per stdin line, JSON responses
/// and autosave events on stdout.
#[derive(Clone, Debug, Eq, Parser, PartialEq)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `data_dir` from the configuration.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Sign in as this local profile right away.
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if cli.user.is_some() {
        config.profile_id = cli.user.clone();
    }
    info!("notes are kept in \"{}\"", config.data_dir.display());

    let storage = FileStorage::new(&config.data_dir)?;
    let session = Session::new(LocalProfileProvider::new(local_profile(&config)));
    let ai = AiDispatcher::new(AiCapability::from_config(&config), config.simulated_delay());
    let mut notepad = Notepad::new(
        session,
        NoteStore::new(storage),
        ai,
        NotepadSettings::from(&config),
    );

    notepad.resume().await;
    if cli.user.is_some() {
        notepad.sign_in(Instant::now()).await?;
    }
    run(notepad).await
}

fn local_profile(config: &AppConfig) -> User {
    let id = config.profile_id.clone().unwrap_or_else(|| "local".to_string());
    User {
        display_name: config.profile_name.clone(),
        ..User::new(id)
    }
}

async fn run(mut notepad: App) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut replies: JoinSet<AiReply> = JoinSet::new();
    let mut reported = status_of(&notepad);

    loop {
        let deadline = notepad.next_deadline();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let resp = handle_line(&mut notepad, &line, &mut replies).await;
                emit(&mut stdout, &resp).await?;
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(commit) = notepad.poll(Instant::now()) {
                    emit(&mut stdout, &Response::from(&commit)).await?;
                }
            }
            Some(joined) = replies.join_next(), if !replies.is_empty() => match joined {
                Ok(reply) => {
                    let outcome = notepad.apply_ai_reply(reply);
                    emit(&mut stdout, &Response::AiDone { outcome }).await?;
                }
                Err(e) => error!("AI task failed: {e}"),
            },
        }

        let status = status_of(&notepad);
        if status != reported {
            if let Some((note_id, status)) = status.clone() {
                emit(&mut stdout, &Response::Status { note_id, status }).await?;
            }
            reported = status;
        }
    }

    if !replies.is_empty() {
        warn!("exiting with {} AI requests in flight", replies.len());
    }
    if let Some(commit) = notepad.flush(Instant::now()) {
        info!("saved note {} on exit", commit.note_id);
    }
    Ok(())
}

async fn handle_line(notepad: &mut App, line: &str, replies: &mut JoinSet<AiReply>) -> Response {
    let req = match serde_json::from_str::<Request>(line) {
        Ok(req) => req,
        Err(e) => {
            warn!("ignoring malformed request: {e}");
            return Response::Error {
                message: format!("invalid request: {e}"),
            };
        }
    };
    match notepad.handle_request(req, Instant::now()).await {
        Ok(Handled::Reply(resp)) => resp,
        Ok(Handled::Ai(request)) => {
            let note_id = request.note_id.clone();
            let ai = notepad.ai();
            replies.spawn(async move { ai.run(request).await });
            Response::AiPending { note_id }
        }
        Err(e) => {
            error!("got error while handling request: {e:?}");
            Response::Error {
                message: e.to_string(),
            }
        }
    }
}

fn status_of(notepad: &App) -> Option<(String, SaveStatus)> {
    notepad
        .editor()
        .map(|editor| (editor.note_id().to_owned(), editor.status()))
}

async fn emit(stdout: &mut Stdout, resp: &Response) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(resp)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}
