use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_content::content;
use session_content::content::niche::identify_niche;
use session_content::session_log::claude_parser::parse_session_file;
use session_content::session_log::scan::find_recent_sessions;
use session_content::session_log::watcher::{
    SessionWatcher, WatcherConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_OUTPUT_DIR, MIN_SESSION_MESSAGES,
};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Parser, Debug)]
#[command(name = "session-content")]
#[command(about = "Turn Claude Code session transcripts into draft articles", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one article from a transcript
    Generate {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,
    },
    /// Generate articles for recently modified sessions (at most 10)
    Recent {
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,
        /// Age window in days
        #[arg(long, default_value_t = 7)]
        days: u64,
        #[arg(long)]
        projects_dir: Option<PathBuf>,
    },
    /// Watch the projects directory and generate articles as sessions settle
    Watch {
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output: PathBuf,
        /// Debounce window in milliseconds
        #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
        debounce: u64,
        #[arg(long)]
        projects_dir: Option<PathBuf>,
    },
    /// Print a parsed transcript as JSON, or list recent transcripts
    Parse {
        #[arg(required_unless_present = "recent")]
        file: Option<PathBuf>,
        #[arg(long)]
        recent: bool,
        #[arg(long, default_value_t = 1)]
        days: u64,
        #[arg(long)]
        projects_dir: Option<PathBuf>,
    },
    /// Identify the publishing niche of a transcript
    Niche {
        file: PathBuf,
        /// Repository to read README and manifests from (defaults to the session cwd)
        repo: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_content=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Generate { file, output } => {
            let Some(session) = parse_session_file(&file)? else {
                bail!("failed to parse session: {}", file.display());
            };
            let generated = content::generate_content(&session);
            let saved = content::save_content(&generated, &output)?;
            info!("Generated: {}", saved.display());
        }

        Command::Recent {
            output,
            days,
            projects_dir,
        } => {
            let projects_dir = projects_dir.unwrap_or_else(|| WatcherConfig::default().projects_dir);
            let sessions = find_recent_sessions(&projects_dir, DAY * days as u32);
            info!("Processing {} recent sessions...", sessions.len());

            let saved = content::generate_batch(&sessions, &output, MIN_SESSION_MESSAGES);
            info!("Generated {} articles in {}", saved.len(), output.display());
        }

        Command::Watch {
            output,
            debounce,
            projects_dir,
        } => {
            let mut config = WatcherConfig {
                output_dir: output,
                debounce: Duration::from_millis(debounce),
                ..WatcherConfig::default()
            };
            if let Some(dir) = projects_dir {
                config.projects_dir = dir;
            }

            let mut watcher = SessionWatcher::new(config);
            watcher.start();
            watcher.run(shutdown_signal()).await;
        }

        Command::Parse {
            file,
            recent,
            days,
            projects_dir,
        } => {
            if recent {
                let projects_dir =
                    projects_dir.unwrap_or_else(|| WatcherConfig::default().projects_dir);
                let sessions = find_recent_sessions(&projects_dir, DAY * days as u32);
                println!("Found {} recent sessions:", sessions.len());
                for session in sessions.iter().take(content::BATCH_LIMIT) {
                    println!("  {}", session.display());
                }
            } else if let Some(file) = file {
                let Some(session) = parse_session_file(&file)? else {
                    bail!("failed to parse session: {}", file.display());
                };
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
        }

        Command::Niche { file, repo } => {
            let Some(session) = parse_session_file(&file)? else {
                bail!("failed to parse session: {}", file.display());
            };
            let repo = repo.or_else(|| {
                (!session.project.is_empty()).then(|| PathBuf::from(&session.project))
            });
            let niche = identify_niche(&session, repo.as_deref());

            println!("Identified Niche:");
            println!("  Title: {}", niche.title);
            println!("  Platform: {}", niche.platform);
            println!("  App Type: {}", niche.app_type);
            println!("  Confidence: {:.0}%", niche.confidence * 100.0);
            println!("  Signals:");
            for signal in &niche.signals {
                println!("    - {signal}");
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down gracefully...");
        },
    }
}
