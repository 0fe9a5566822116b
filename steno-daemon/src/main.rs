//! `stenod` — CLI entry point for the transcription daemon (component N).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use steno_core::engine::backends::FakeBackends;
use steno_core::engine::Engine;
use steno_core::repository::TranscriptRepository;
use steno_core::summarizer::StubSummarizer;
use steno_core::{Broadcaster, CliOverrides, DaemonConfig, Dispatcher, Paths, PidLock, Server};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::info;

#[derive(Parser)]
#[command(name = "stenod", about = "Local transcription daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground.
    Run {
        #[arg(long)]
        socket_path: Option<PathBuf>,
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Query a running daemon's status over its control socket.
    Status,
    /// Install a launch-agent descriptor for the given executable.
    Install {
        executable_path: PathBuf,
    },
    /// Remove a previously installed launch-agent descriptor.
    Uninstall,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { socket_path, db_path } => run(socket_path, db_path).await,
        Command::Status => status().await,
        Command::Install { executable_path } => install(&executable_path),
        Command::Uninstall => uninstall(),
    }
}

async fn run(socket_path: Option<PathBuf>, db_path: Option<PathBuf>) -> anyhow::Result<()> {
    let mut paths = Paths::resolve();
    paths.ensure_base_dir()?;
    if let Some(socket_path) = &socket_path {
        paths.socket_path = socket_path.clone();
    }
    if let Some(db_path) = &db_path {
        paths.db_path = db_path.clone();
    }

    let config_path = paths.base_dir.join("config.toml");
    let config = DaemonConfig::load(&config_path, CliOverrides { socket_path, db_path });

    let _log_guard = steno_core::logging::init(&paths.log_path, &config.log_level);
    info!(
        base_dir = %paths.base_dir.display(),
        socket = %paths.socket_path.display(),
        db = %paths.db_path.display(),
        "steno daemon starting"
    );

    let mut pid_lock = PidLock::new(paths.pid_path.clone());
    pid_lock.acquire()?;

    let repo = Arc::new(TranscriptRepository::open(&paths.db_path)?);
    let backends = Arc::new(FakeBackends::new());
    let summarizer = Arc::new(StubSummarizer);
    let broadcaster = Arc::new(Broadcaster::new());
    let engine = Arc::new(Engine::new(
        repo,
        backends,
        summarizer,
        broadcaster.clone(),
        config.coordinator_config(),
        config.engine_config(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(engine.clone(), broadcaster));
    let server = Server::bind(paths.socket_path.clone(), dispatcher).await?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    let _ = engine.stop().await;
    server.stop().await;
    pid_lock.release();
    info!("steno daemon stopped");
    Ok(())
}

async fn status() -> anyhow::Result<()> {
    let paths = Paths::resolve();
    let stream = match UnixStream::connect(&paths.socket_path).await {
        Ok(stream) => stream,
        Err(_) => {
            println!("{{\"ok\":false,\"error\":\"no daemon running\"}}");
            std::process::exit(1);
        }
    };
    let (reader, mut writer) = stream.into_split();
    writer.write_all(b"{\"cmd\":\"status\"}\n").await?;

    let mut lines = BufReader::new(reader).lines();
    let Some(line) = lines.next_line().await? else {
        println!("{{\"ok\":false,\"error\":\"daemon closed the connection\"}}");
        std::process::exit(1);
    };
    println!("{line}");

    let ok = serde_json::from_str::<serde_json::Value>(&line)
        .ok()
        .and_then(|v| v.get("ok").and_then(|o| o.as_bool()))
        .unwrap_or(false);
    std::process::exit(if ok { 0 } else { 1 });
}

fn launch_agent_path() -> PathBuf {
    Paths::resolve().base_dir.join("com.steno.daemon.plist")
}

fn install(executable_path: &PathBuf) -> anyhow::Result<()> {
    let paths = Paths::resolve();
    paths.ensure_base_dir()?;
    let descriptor = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n\
         <dict>\n\
         \t<key>Label</key>\n\
         \t<string>com.steno.daemon</string>\n\
         \t<key>ProgramArguments</key>\n\
         \t<array>\n\
         \t\t<string>{}</string>\n\
         \t\t<string>run</string>\n\
         \t</array>\n\
         \t<key>RunAtLoad</key>\n\
         \t<true/>\n\
         </dict>\n\
         </plist>\n",
        executable_path.display()
    );
    std::fs::write(launch_agent_path(), descriptor)?;
    println!("installed {}", launch_agent_path().display());
    Ok(())
}

fn uninstall() -> anyhow::Result<()> {
    let path = launch_agent_path();
    match std::fs::remove_file(&path) {
        Ok(()) => println!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("nothing installed at {}", path.display())
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
