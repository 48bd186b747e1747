use std::sync::Arc;
use std::time::Duration;

use tenmin_core::identity::ServerIdentity;
use tenmin_db::PgStore;
use tenmin_events::{ApiNotifier, FeedFilter, PgChangeFeed};
use tenmin_pipeline::ScreenDriver;
use tenmin_vision::{CommandCapture, CommandInput, KeyboardRemoteSession, NccMatcher, TemplateStore};

use tenmin_worker::{telemetry, watcher, Collaborators, Orchestrator, ServerLifecycle, WorkerConfig};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration and tracing ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    let telemetry = telemetry::init(config.log_format);
    tracing::info!(
        service = %config.jobs.target_service,
        hold_secs = config.jobs.hold.hold.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = tenmin_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    tenmin_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    tenmin_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool.clone()));
    let notifier = Arc::new(ApiNotifier::new(config.api_url.clone()).expect("Failed to build API client"));

    // --- Server identity ---
    let lifecycle = ServerLifecycle::new(
        ServerIdentity::new(config.server_id_file.clone()),
        store.clone(),
        notifier.clone(),
        config.jobs.target_service.clone(),
    );
    if let Some(stale) = lifecycle
        .cleanup_stale()
        .await
        .expect("Failed to clean up previous server registration")
    {
        tracing::info!(server_id = stale, "Stale server registration removed");
    }
    let server_id = lifecycle.start().await.expect("Failed to register server");

    // --- Screen collaborators ---
    let templates = Arc::new(TemplateStore::new(config.templates.clone()));
    let glyphs = templates.load_otp_glyphs().await;
    tracing::info!(glyphs = glyphs.len(), "OTP glyph templates loaded");

    let input = Arc::new(CommandInput::new(&config.input_command));
    let driver = ScreenDriver::new(
        Arc::new(CommandCapture::new(&config.capture_command)),
        Arc::new(NccMatcher::new().with_glyphs(glyphs)),
        input.clone(),
    );
    let session = Arc::new(KeyboardRemoteSession::new(
        input,
        config.window_command.clone(),
        config.window_title.clone(),
    ));

    // --- Orchestrator ---
    let orchestrator = Orchestrator::new(
        server_id,
        config.jobs.clone(),
        Collaborators {
            store,
            notifier,
            driver,
            session,
            templates,
        },
    );

    // --- Change feed ---
    let filter = FeedFilter::new("public", &["remote_pcs", "job_requests"]);
    let mut feed = PgChangeFeed::connect(&pool, &config.feed_channel, filter)
        .await
        .expect("Failed to listen for row changes");
    tracing::info!(channel = %config.feed_channel, "Listening for row changes");

    let watcher_handle = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            watcher::run(&orchestrator, &mut feed).await;
        })
    };

    tracing::info!(server_id, "Worker running");
    shutdown_signal().await;

    // --- Post-shutdown cleanup ---
    tracing::info!("Stopping worker");

    if !orchestrator.shutdown_timeout(SHUTDOWN_TIMEOUT).await {
        tracing::warn!("Some job tasks were abandoned");
    }
    watcher::join(watcher_handle, SHUTDOWN_TIMEOUT).await;

    if let Err(e) = lifecycle.stop(server_id).await {
        tracing::error!(server_id, error = %e, "Failed to withdraw server registration");
    }

    tracing::info!("Graceful shutdown complete");
    telemetry.shutdown();
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
