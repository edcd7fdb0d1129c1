//! obbywatch CLI entry point.
//!
//! Usage: obbywatch run --root <DIR> [--http-addr <HOST:PORT>] [--debounce-ms <N>]

mod cli;

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use obbywatch::agent::cancellation::CancellationRegistry;
use obbywatch::agent::tools::ToolRegistry;
use obbywatch::agent::AgentOrchestrator;
use obbywatch::http::{self, AppState};
use obbywatch::insights::InsightsRegistry;
use obbywatch::summarizer::llm::{HttpLlmProvider, LlmProvider, ProviderConfig};
use obbywatch::{
    BatchSummarizer, Config, LivingNote, LivingNoteMode, ObbySpawnResult, Pipeline, SseHub, Store,
};

use cli::Command;

const DEFAULT_LOCAL_LLM_URL: &str = "http://localhost:11434/v1";
const MAX_DB_CONNECTIONS: usize = 8;
const DEFAULT_OBBYWATCH_RULES: &str = "**/*.md\n**/*.txt\n";
const DEFAULT_OBBYIGNORE_RULES: &str = "notes/summaries/**\n";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h") {
        cli::print_usage();
        return ExitCode::SUCCESS;
    }

    if args.len() < 2 {
        cli::print_usage();
        return ExitCode::from(1);
    }

    match cli::parse_args() {
        Ok(Command::Init { root }) => match run_init(&root) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::from(1)
            }
        },
        Ok(Command::Status { root }) => match run_status(&root) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::from(1)
            }
        },
        Ok(Command::Run {
            root,
            http_addr,
            debounce_ms,
        }) => {
            init_tracing();
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("Error: failed to start tokio runtime: {}", e);
                    return ExitCode::from(1);
                }
            };
            match runtime.block_on(run_server(root, http_addr, debounce_ms)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::from(1)
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            cli::print_usage();
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "obbywatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Writes default rule files and creates the database, without starting
/// the pipeline. Safe to run more than once -- existing rule files are left
/// untouched.
fn run_init(root: &Path) -> Result<()> {
    fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;

    let config = Config::default_for_root(root.to_path_buf());
    if !config.obbywatch_file().exists() {
        fs::write(config.obbywatch_file(), DEFAULT_OBBYWATCH_RULES)?;
    }
    if !config.obbyignore_file().exists() {
        fs::write(config.obbyignore_file(), DEFAULT_OBBYIGNORE_RULES)?;
    }

    let _store = Store::open(&config.db_path, MAX_DB_CONNECTIONS)?;
    println!("Initialized obbywatch at {}", root.display());
    println!("  watch root: {}", root.display());
    println!("  database:   {}", config.db_path.display());
    Ok(())
}

fn run_status(root: &Path) -> Result<()> {
    let config = Config::default_for_root(root.to_path_buf());
    let store = Store::open(&config.db_path, 1)?;

    let last_update = store.config_get("living_note_last_update")?.unwrap_or_else(|| "never".to_string());
    let last_fingerprint = store.config_get("batch_last_fingerprint")?.unwrap_or_else(|| "none".to_string());

    println!("root:              {}", root.display());
    println!("database:           {}", config.db_path.display());
    println!("last batch run:     {}", last_update);
    println!("last fingerprint:   {}", last_fingerprint);
    Ok(())
}

async fn run_server(root: std::path::PathBuf, http_addr: Option<String>, debounce_ms: Option<u64>) -> Result<()> {
    let mut config = Config::default_for_root(root.clone());
    if let Some(addr) = http_addr {
        config.http_addr = addr;
    }
    if let Some(ms) = debounce_ms {
        config.debounce_ms = ms;
    }
    let config = Arc::new(config);

    if !root.is_dir() {
        anyhow::bail!("watch root {} is not a directory (run `obbywatch init --root {}` first)", root.display(), root.display());
    }

    let store = Store::open(&config.db_path, MAX_DB_CONNECTIONS).context("opening store")?;
    let hub = Arc::new(SseHub::new());
    let monitoring_enabled = Arc::new(AtomicBool::new(true));

    let pipeline = Pipeline::new(
        root.clone(),
        store.clone(),
        hub.clone(),
        Duration::from_millis(config.debounce_ms),
        monitoring_enabled.clone(),
    );
    let (watcher, pipeline_join, matcher) = match pipeline.spawn() {
        ObbySpawnResult::Running { watcher, join, matcher } => (watcher, join, matcher),
        ObbySpawnResult::Failed(e) => return Err(e.into()),
    };
    // Leaking the watcher handle here would be wrong for a library, but this
    // is the top-level binary: it must outlive the whole process, so it is
    // kept alive by never dropping the `main` future's local binding.
    let _watcher = watcher;

    let llm_provider: Arc<dyn LlmProvider> = Arc::new(HttpLlmProvider::new(
        ProviderConfig::new(
            config.llm_base_url.clone().unwrap_or_else(|| DEFAULT_LOCAL_LLM_URL.to_string()),
            config.llm_model.clone(),
        )
        .api_key(config.llm_api_key.clone()),
    ));

    let living_note_mode = if config.living_note_daily {
        LivingNoteMode::Daily
    } else {
        LivingNoteMode::Single
    };
    let living_note = Arc::new(LivingNote::new(root.clone(), living_note_mode));

    let summarizer = Arc::new(BatchSummarizer::new(
        store.clone(),
        llm_provider.clone(),
        LivingNote::new(root.clone(), living_note_mode),
        hub.clone(),
    ));
    let summarizer_handle = summarizer.clone();
    tokio::spawn(async move {
        summarizer_handle.run(config.batch_interval).await;
    });

    let tool_registry = ToolRegistry::with_defaults();
    let agent = Arc::new(AgentOrchestrator::new(llm_provider, tool_registry));

    let state = AppState {
        root: root.clone(),
        store,
        hub,
        summarizer,
        living_note,
        agent,
        cancellations: Arc::new(CancellationRegistry::new()),
        running_chats: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        insights: Arc::new(InsightsRegistry::with_defaults()),
        monitoring_enabled,
        config: config.clone(),
        matcher,
    };

    let addr: SocketAddr = config.http_addr.parse().with_context(|| format!("invalid --http-addr {}", config.http_addr))?;
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;

    tracing::info!(root = %root.display(), addr = %addr, "obbywatch serving");

    tokio::select! {
        result = axum::serve(listener, router.into_make_service()) => {
            result.context("http server")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    pipeline_join.abort();
    Ok(())
}
