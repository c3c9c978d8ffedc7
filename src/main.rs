use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use mystery_match::config::{Settings, StoreBackend};
use mystery_match::core::{LifecycleService, Matcher, Scheduler, SchedulerSettings};
use mystery_match::routes::{self, AppState};
use mystery_match::services::{
    InMemoryStore, LogNotifier, NotificationDispatcher, Notifier, PostgresStore, RetryPolicy, RetryingStore,
    StateStore, WebhookNotifier,
};
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str, format: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format {
        "pretty" => subscriber.pretty().init(),
        "compact" => subscriber.compact().init(),
        _ => subscriber.json().init(),
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

async fn build_store(settings: &Settings) -> io::Result<Arc<dyn StateStore>> {
    let retry = RetryPolicy::from_settings(&settings.retry);

    match settings.database.backend {
        StoreBackend::Postgres => {
            let db = &settings.database;
            let store = PostgresStore::from_settings(
                &db.url,
                db.max_connections,
                db.min_connections,
                db.acquire_timeout_secs,
                db.idle_timeout_secs,
            )
            .await
            .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;

            info!("PostgreSQL store initialized (max: {} connections)", db.max_connections.unwrap_or(10));
            Ok(Arc::new(RetryingStore::new(store, retry)))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; state is lost on restart");
            Ok(Arc::new(RetryingStore::new(InMemoryStore::new(), retry)))
        }
    }
}

fn build_notifier(settings: &Settings) -> io::Result<Arc<dyn Notifier>> {
    match &settings.notifier.webhook_url {
        Some(url) => {
            let notifier = WebhookNotifier::new(
                url.clone(),
                settings.notifier.auth_token.clone(),
                settings.notifier.timeout(),
            )
            .map_err(|e| startup_error("Failed to build webhook notifier", e))?;
            info!("Delivering notifications to {}", url);
            Ok(Arc::new(notifier))
        }
        None => {
            info!("No notifier webhook configured, notifications will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Configuration error: {}", e)))?;

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting Mystery Match engine...");

    let store = build_store(&settings).await?;
    let dispatcher = NotificationDispatcher::new(build_notifier(&settings)?, settings.notifier.timeout());

    let policy = settings.matching.policy();
    let matcher = Matcher::new(policy);
    info!("Matcher initialized with policy: {:?}", policy);

    let lifecycle = LifecycleService::new(store.clone(), dispatcher.clone(), *matcher.quota());
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        matcher,
        dispatcher,
        SchedulerSettings::from_config(&settings.scheduler),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = if settings.scheduler.enabled {
        Some(tokio::spawn(scheduler.clone().run(shutdown_rx)))
    } else {
        warn!("Periodic scheduler disabled; ticks only run via /api/v1/admin/tick");
        None
    };

    let app_state = AppState {
        store,
        lifecycle,
        scheduler,
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::configure_extractors)
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await;

    // Stop scheduling new ticks; a tick already running finishes on its own
    shutdown_tx.send(true).ok();
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }

    info!("Shutdown complete");
    server
}
