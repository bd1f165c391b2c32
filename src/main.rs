//! IncidentHub - Incident tracking API with a built-in audit trail
//!
//! This application serves an incident management REST API. Every API
//! request is correlated with a trace id, captured with sensitive fields
//! removed, and delivered asynchronously to the audit log channel and the
//! audit database trail.

use std::env;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use config::{LogFormat, LogTarget};
use incidenthub::audit::{spawn_retention_pruner, spawn_workers, AuditDispatcher, AuditLogChannel};
use incidenthub::{app_router, config, db, services, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("IncidentHub {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--create-admin") {
        return create_admin(&args).await;
    }
    if let Some(pos) = args.iter().position(|arg| arg == "--create-config") {
        let path = args
            .get(pos + 1)
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::path::PathBuf::from("config.yaml"));
        AppConfig::create_default_config(&path)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        println!("Wrote default configuration to {:?}", path);
        return Ok(());
    }

    // Configuration decides the log format, so it loads before logging.
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Dropping the guard would stop flushing file-backed logs.
    let _log_guard = init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "IncidentHub starting up"
    );

    ensure_sqlite_parent_dir(&config.database.url)?;

    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    let dispatcher = if config.audit.enabled {
        info!(
            workers = config.audit.workers,
            queue_capacity = config.audit.queue_capacity,
            store_in_database = config.audit.store_in_database,
            "Audit pipeline enabled"
        );
        let channel = AuditLogChannel::from_config(&config.audit);
        if config.audit.store_in_database && config.audit.retention_days > 0 {
            spawn_retention_pruner(db.clone(), config.audit.retention_days);
        }
        spawn_workers(&config.audit, db.clone(), channel)
    } else {
        info!("Audit pipeline disabled by configuration");
        AuditDispatcher::null()
    };

    let state = AppState::new(config.clone(), db, dispatcher);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server error")?;

    Ok(())
}

/// Global middleware around the application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    app_router(state)
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .layer(cors)
}

/// Set up the tracing subscriber from the logging section of the config.
///
/// Console, file, or both; the format applies to every target. Returns the
/// appender guard when a file target is active.
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{prelude::*, EnvFilter, Layer, Registry};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let log = &config.logging;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = None;

    if matches!(log.target, LogTarget::Console | LogTarget::Both) {
        layers.push(fmt_layer(&log.format, None));
    }
    if matches!(log.target, LogTarget::File | LogTarget::Both) {
        let (writer, g) = file_writer(log);
        layers.push(fmt_layer(&log.format, Some(writer)));
        guard = Some(g);
    }

    tracing_subscriber::registry().with(layers).with(filter).init();
    guard
}

/// One formatted output layer, to stdout or to the given file writer
fn fmt_layer(
    format: &LogFormat,
    writer: Option<tracing_appender::non_blocking::NonBlocking>,
) -> Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync> {
    use tracing_subscriber::{fmt, Layer};

    macro_rules! build {
        ($layer:expr) => {
            match writer {
                Some(w) => $layer.with_writer(w).boxed(),
                None => $layer.boxed(),
            }
        };
    }

    match format {
        LogFormat::Json => build!(fmt::layer().json().with_target(true)),
        LogFormat::Compact => build!(fmt::layer().compact().with_target(false)),
        LogFormat::Pretty => build!(fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)),
    }
}

fn file_writer(
    log: &config::LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log.log_dir) {
        eprintln!("Warning: could not create log directory {:?}: {}", log.log_dir, e);
    }
    let appender = if log.daily_rotation {
        tracing_appender::rolling::daily(&log.log_dir, &log.log_prefix)
    } else {
        tracing_appender::rolling::never(&log.log_dir, &log.log_prefix)
    };
    tracing_appender::non_blocking(appender)
}

/// Create the parent directory of a `sqlite://` database path if missing
fn ensure_sqlite_parent_dir(database_url: &str) -> Result<()> {
    if let Some(path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

/// Bootstrap an administrator account and exit
async fn create_admin(args: &[String]) -> Result<()> {
    const USAGE: &str = "Usage: incidenthub --create-admin <email> <password> [display-name]";

    println!("IncidentHub Admin Setup v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let flag_pos = args
        .iter()
        .position(|arg| arg == "--create-admin")
        .context(USAGE)?;
    let email = args.get(flag_pos + 1).context(USAGE)?;
    let password = args.get(flag_pos + 2).context(USAGE)?;
    let display_name = args
        .get(flag_pos + 3)
        .cloned()
        .unwrap_or_else(|| "Administrator".to_string());

    if password.chars().count() < config.auth.password_min_length {
        anyhow::bail!(
            "Password must be at least {} characters long",
            config.auth.password_min_length
        );
    }

    ensure_sqlite_parent_dir(&config.database.url)?;

    println!("Connecting to {}", config.database.url);
    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    let service = services::AuthService::new(db);
    let user = service
        .create_user(email, password, &display_name, true)
        .await
        .context("Failed to create admin user")?;

    println!();
    println!("Created admin user {} (id {})", user.email, user.id);

    Ok(())
}

fn print_help() {
    println!(
        r#"IncidentHub {}

USAGE:
    incidenthub [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --create-admin <email> <password> [display-name]
                            Create an administrator account and exit. Useful
                            for bootstrapping a fresh installation before the
                            first login.
    --create-config [path]  Write a configuration file with default values
                            (default path: config.yaml) and exit.

ENVIRONMENT:
    INCIDENTHUB_CONFIG  Path to configuration file (default: config.yaml)
    APP_ENV             Environment name recorded in audit metadata
    DATABASE_URL        SQLite database URL override
    JWT_SECRET          Token signing secret override
    AUDIT_ENABLED       Enable or disable the API audit pipeline
    RUST_LOG            Log level/filter override

CONFIGURATION:
    Configuration is loaded from the first existing file of:
    1. $INCIDENTHUB_CONFIG
    2. ./config.yaml
    3. ./config/config.yaml
    4. /etc/incidenthub/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
