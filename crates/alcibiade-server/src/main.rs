use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info, warn};

use alcibiade_server::config::{load_system_prompt, Settings};
use alcibiade_server::services::{LogStatusSink, RequestDispatcher};
use alcibiade_server::utils::SharedRng;
use alcibiade_server::{build_router, ipc, logging, AppState};

#[derive(Parser)]
#[command(name = "alcibiade-server")]
#[command(about = "Persona chat server (HTTP /ask + desktop IPC)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP and IPC servers - Default
    Serve,
    /// Send one prompt to the configured backend and report the outcome
    Check {
        #[arg(long, default_value = "Hello")]
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load()?;
    logging::init_tracing(&settings.logging);
    info!("✅ Configuration loaded");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(settings).await,
        Commands::Check { prompt } => check(settings, &prompt).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    info!("🚀 Starting Alcibiade server...");

    let system_prompt = load_system_prompt(settings.persona.system_prompt_path.as_deref());
    let state = AppState::from_settings(settings.clone(), system_prompt);

    if !state.ask_service.remote_configured() {
        warn!(
            "Backend {} has no credentials, every answer will come from the fallback engine",
            state.ask_service.backend()
        );
    }

    if let Some(_sweeper) = state
        .store
        .start_sweeper(Duration::from_secs(settings.conversation.sweep_interval_seconds.max(1)))
    {
        info!("Conversation TTL sweeper started");
    }

    if settings.ipc.enabled {
        let ipc_config = settings.ipc.clone();
        let ask_service = state.ask_service.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc::run(&ipc_config, ask_service).await {
                error!("IPC server stopped: {}", e);
            }
        });
    }

    let addr: SocketAddr = settings.bind_addr().parse()?;
    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if settings.ipc.enabled {
        std::fs::remove_file(&settings.ipc.socket_path).ok();
    }
    info!("Server stopped");
    Ok(())
}

/// One dispatch against the configured backend, no fallback
async fn check(settings: Settings, prompt: &str) -> Result<()> {
    let backend = settings.backend();
    let dispatcher = RequestDispatcher::from_settings(
        &settings,
        SharedRng::from_seed_option(settings.random_seed),
    );

    println!("Testing {} backend...", backend);
    match dispatcher.dispatch(prompt, backend, &LogStatusSink).await {
        Ok(generation) => {
            println!(
                "OK ({} attempt(s)): {}",
                generation.attempts, generation.text
            );
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Connection check failed: {}", e)),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
