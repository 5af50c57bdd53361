use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notelink::config::DEFAULT_CONFIG_PATH;
use notelink::{
    create_router, App, AppState, Config, HttpSessionService, Intent, SessionRequest,
    SessionService,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "notelink", version, about = "Creative session client")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll telemetry and serve the local control API
    Serve,

    /// Open a session and stream a WAV file into it in real time
    Stream {
        #[arg(long)]
        user: String,

        /// creative_session, mix_feedback, performance_coaching or analytics_only
        #[arg(long, default_value = "creative_session")]
        intent: String,

        #[arg(long)]
        wav: PathBuf,

        /// Stop after this many seconds even if the file has not finished
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Fetch and print one telemetry snapshot
    Telemetry,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    info!("notelink v{}", env!("CARGO_PKG_VERSION"));
    info!("Remote service: {}", config.service.base_url);

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Stream {
            user,
            intent,
            wav,
            seconds,
        } => {
            config.capture.source = format!("file:{}", wav.display());
            let intent: Intent = intent.parse()?;
            stream(config, SessionRequest::new(user, intent), seconds.map(Duration::from_secs)).await
        }
        Command::Telemetry => telemetry(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.http.bind, config.http.port);
    let app = App::new(config)?;
    app.start().await;

    let router = create_router(AppState::new(&app));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    app.shutdown().await;
    Ok(())
}

async fn stream(config: Config, request: SessionRequest, limit: Option<Duration>) -> Result<()> {
    let app = App::new(config)?;
    let controller = app.controller().clone();

    let session = controller.ensure_session(request).await?;
    info!("Session {} active", session.session_id());

    app.capture().start_capture().await?;

    let deadline = limit.map(|d| tokio::time::Instant::now() + d);
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut printed = 0u64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        // Print events that arrived since the last tick, oldest first
        let received = controller.stream().events_received().await;
        if received > printed {
            let fresh = (received - printed) as usize;
            for event in controller.events().await.iter().take(fresh).rev() {
                println!("{} {}", event.label(), serde_json::Value::Object(event.payload.clone()));
            }
            printed = received;
        }

        if !app.capture().is_capturing().await {
            info!("Audio finished");
            break;
        }
        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            info!("Time limit reached");
            break;
        }
    }

    app.capture().stop_capture().await;

    match controller.close_session().await {
        Ok(Some(closed)) => info!("Session {} closed", closed.session_id()),
        Ok(None) => {}
        Err(e) => warn!("{}", e),
    }

    let stats = app.capture().stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    app.shutdown().await;
    Ok(())
}

async fn telemetry(config: Config) -> Result<()> {
    let service = HttpSessionService::new(&config.service.base_url, config.service.request_timeout())?;
    let snapshot = service.telemetry().await?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
