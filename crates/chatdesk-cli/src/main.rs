use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use chatdesk_cli::chat::{format_turn, run_repl, short_id, ChatSession};
use chatdesk_cli::client::StoreClient;
use chatdesk_cli::config::{config_path, load_config, ChatdeskConfig};
use chatdesk_provider::{LlmProvider, OpenAiProvider, StubProvider};
use chatdesk_schema::FileInfo;
use chatdesk_server::state::AppState;
use chatdesk_store::ChatStore;

#[derive(Parser)]
#[command(name = "chatdesk", version, about = "chatdesk session store and terminal chat")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.chatdesk",
        help = "Config root directory (contains config/ and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the session store HTTP server")]
    Serve {
        #[arg(long, help = "Bind address, overrides server.bind")]
        bind: Option<String>,
    },
    #[command(about = "Interactive chat backed by the session store")]
    Chat {
        #[arg(long, help = "Resume an existing session instead of creating one")]
        session: Option<String>,
        #[arg(long, help = "Use the offline echo provider instead of the LLM API")]
        offline: bool,
    },
    #[command(about = "List session ids")]
    Sessions,
    #[command(about = "Print the turns of a session")]
    History {
        #[arg(help = "Session id")]
        session_id: String,
    },
    #[command(about = "Dump every session as JSON")]
    Dump,
    #[command(subcommand, about = "Ingested-file registry")]
    Files(FilesCommands),
    #[command(about = "Validate config file")]
    Validate,
}

#[derive(Subcommand)]
enum FilesCommands {
    #[command(about = "List registered files")]
    List,
    #[command(about = "Register an ingested file")]
    Register {
        #[arg(help = "File name (registry key)")]
        file_name: String,
        #[arg(help = "File path")]
        file_path: String,
    },
    #[command(about = "Show which of the given files are not yet registered")]
    Pending {
        #[arg(required = true, help = "Candidate file paths")]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let mut cli = Cli::parse();

    // Expand ~ to home directory
    if cli.config_root.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.config_root = PathBuf::from(home).join(
                cli.config_root
                    .strip_prefix("~")
                    .unwrap_or(&cli.config_root),
            );
        }
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    // The REPL shares the terminal with logs, so keep stderr quiet by default there.
    let default_filter = if matches!(command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    let _guard = init_logging(&cli.config_root, default_filter)?;

    let mut config = load_config(&cli.config_root)?;

    match command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            run_server(&config).await?;
        }
        Commands::Chat { session, offline } => {
            let provider = build_provider(&config, offline)?;
            let store = StoreClient::new(config.client.base_url.clone());
            store.health().await?;
            if let Err(err) = provider.health().await {
                tracing::warn!("llm provider health check failed: {err:#}");
                eprintln!("Warning: LLM provider check failed: {err:#}");
            }
            let session = ChatSession::start(store, provider, config.llm.clone(), session).await?;
            run_repl(session).await?;
        }
        Commands::Sessions => {
            let store = StoreClient::new(config.client.base_url.clone());
            for id in store.sessions().await? {
                println!("Chat {}  {id}", short_id(&id));
            }
        }
        Commands::History { session_id } => {
            let store = StoreClient::new(config.client.base_url.clone());
            for message in store.history(&session_id).await? {
                println!("{}", format_turn(&message));
            }
        }
        Commands::Dump => {
            let store = StoreClient::new(config.client.base_url.clone());
            let chats = store.chats().await?;
            println!("{}", serde_json::to_string_pretty(&chats)?);
        }
        Commands::Files(cmd) => {
            let store = StoreClient::new(config.client.base_url.clone());
            handle_files_command(&store, cmd).await?;
        }
        Commands::Validate => {
            println!(
                "Config valid ({}). server.bind={}, client.base_url={}, llm.model={}",
                config_path(&cli.config_root).display(),
                config.server.bind,
                config.client.base_url,
                config.llm.model
            );
        }
    }

    Ok(())
}

fn init_logging(
    config_root: &Path,
    default_filter: &str,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = config_root.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "chatdesk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    Ok(guard)
}

async fn run_server(config: &ChatdeskConfig) -> Result<()> {
    let state = AppState::new(Arc::new(ChatStore::new()));
    chatdesk_server::serve_with_shutdown(state, &config.server.bind, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown signal received");
    })
    .await
}

fn build_provider(config: &ChatdeskConfig, offline: bool) -> Result<Arc<dyn LlmProvider>> {
    if offline {
        return Ok(Arc::new(StubProvider));
    }
    let provider = OpenAiProvider::from_env(&config.llm.api_key_env, config.llm.base_url.clone())?;
    Ok(Arc::new(provider))
}

async fn handle_files_command(store: &StoreClient, cmd: FilesCommands) -> Result<()> {
    match cmd {
        FilesCommands::List => {
            for info in store.files_info().await? {
                println!("{}\t{}", info.file_name, info.file_path);
            }
        }
        FilesCommands::Register {
            file_name,
            file_path,
        } => {
            let info = store
                .save_file_info(&FileInfo::new(file_name, file_path))
                .await?;
            println!("Registered {} -> {}", info.file_name, info.file_path);
        }
        FilesCommands::Pending { paths } => {
            let candidates = paths
                .iter()
                .map(|path| candidate_for(path))
                .collect::<Result<Vec<_>>>()?;
            for info in store.pending_files(candidates).await? {
                println!("{}\t{}", info.file_name, info.file_path);
            }
        }
    }
    Ok(())
}

fn candidate_for(path: &Path) -> Result<FileInfo> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("not a file path: {}", path.display()))?;
    Ok(FileInfo::new(file_name, path.to_string_lossy()))
}
