use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use session_recorder::events::event_stream;
use session_recorder::storage::backend_from_config;
use session_recorder::{
    create_router, AppState, Config, LocalMediaAcquirer, LoopbackTransport, NatsClient,
    RealtimeMediaTransport, RecordingController, SessionContext, StopTrigger, SyntheticDevices,
    SyntheticPattern,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "session-recorder", version, about = "Dual-party session compositor and recorder")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/session-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,
    /// Record a synthetic loopback session and persist it
    Demo {
        /// Seconds to record
        #[arg(short, long, default_value_t = 5)]
        duration: u64,

        /// Owner stored with the recording
        #[arg(long, default_value = "demo")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).context("Failed to load configuration")?;

    info!("Session Recorder v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Demo { duration, owner } => demo(cfg, duration, owner).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let backend = backend_from_config(&cfg.storage)?;
    info!("Recordings persist via the {} backend", backend.name());

    let state = AppState::new(cfg.controller_config(), backend).with_nats(cfg.nats.url.clone());
    let app = create_router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn demo(cfg: Config, duration: u64, owner: String) -> Result<()> {
    let backend = backend_from_config(&cfg.storage)?;

    let acquirer = LocalMediaAcquirer::new(Box::new(SyntheticDevices::new(SyntheticPattern::default())));
    let mut transport = LoopbackTransport::connect(acquirer, SyntheticPattern::peer()).await?;

    let context = SessionContext::new(owner, "demo session");
    let session_id = context.session_id;
    let controller = RecordingController::new(context, cfg.controller_config());

    if let Some(url) = &cfg.nats.url {
        match NatsClient::connect(url, session_id.to_string()).await {
            Ok(client) => {
                let _ = Arc::new(client).forward_events(controller.subscribe());
            }
            Err(e) => warn!("Continuing without NATS: {:#}", e),
        }
    }

    let mut events = Box::pin(event_stream(controller.subscribe()));
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            info!("event: {}", serde_json::to_string(&event).unwrap_or_default());
        }
    });

    controller
        .arm(transport.local_stream().as_ref(), transport.remote_stream().as_ref())
        .await?;
    controller.start().await?;

    info!("Recording {} for {}s", session_id, duration);
    tokio::time::sleep(Duration::from_secs(duration)).await;

    controller.stop(StopTrigger::User).await;
    let stored = controller.save(backend.as_ref()).await?;
    info!("Saved recording: {}", stored.url);

    transport.hang_up(&controller).await;
    drop(controller);
    let _ = printer.await;

    Ok(())
}
