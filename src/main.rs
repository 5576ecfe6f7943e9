use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use aegis_bridge::db::{ExpenseRepo, HealthRepo};
use aegis_bridge::metrics::LatencyTracker;
use aegis_bridge::server::{AppState, serve};
use aegis_bridge::tools::ToolRegistry;
use aegis_bridge::{AnthropicClient, Config, SessionDeps, SpeechToText, TextToSpeech, db};

/// Aegis - voice-assistant bridge for a wearable client
#[derive(Parser)]
#[command(name = "aegis", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "AEGIS_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aegis_bridge=info",
        1 => "info,aegis_bridge=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing::info!(
        port = config.server.port,
        fast_model = %config.llm.fast_model,
        deep_model = %config.llm.deep_model,
        "starting aegis bridge"
    );

    // Process-scoped resources, created once and injected
    let pool = db::init(config.db_path())?;
    let health = HealthRepo::new(pool.clone());
    let expenses = ExpenseRepo::new(pool);

    let tools = Arc::new(ToolRegistry::with_builtin_tools(
        health.clone(),
        expenses,
        config.llm.tool_timeout,
    ));
    let transcriber = Arc::new(SpeechToText::new(&config.stt)?);
    let synthesizer = Arc::new(TextToSpeech::new(&config.tts)?);
    let chat = Arc::new(AnthropicClient::new(&config.llm)?);

    let deps = SessionDeps {
        transcriber,
        synthesizer,
        chat,
        tools,
        health,
        metrics: Arc::new(LatencyTracker::new()),
        config: Arc::new(config.clone()),
    };

    let state = Arc::new(AppState::new(deps));

    tracing::info!(
        "aegis bridge ready - ws://{}:{}/ws/audio",
        config.server.host,
        config.server.port
    );

    serve(state, &config.server.host, config.server.port).await?;
    Ok(())
}
