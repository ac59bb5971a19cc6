use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use warden_core::permission::Permission;
use warden_core::resource::Resource;
use warden_server::admin;
use warden_server::cache::PermissionCache;
use warden_server::cli::{Cli, Command};
use warden_server::config::{AppConfig, LogFormat, StorageBackend};
use warden_server::metrics::Metrics;
use warden_server::service::AuthService;
use warden_storage::{InMemoryStore, PermissionStore, PostgresStore};

type BoxError = Box<dyn std::error::Error>;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty();
            registry.with(fmt_layer).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    let command = cli.command.unwrap_or(Command::Serve);
    if let Command::Migrate = command {
        return run_migrate(&config).await;
    }

    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("using in-memory permission store");
            run(Arc::new(InMemoryStore::new()), command, config).await
        }
        StorageBackend::Postgres => {
            let store =
                PostgresStore::connect(&config.database.url, config.database.max_connections)
                    .await?;
            tracing::info!(max_connections = config.database.max_connections, "connected to PostgreSQL");
            run(Arc::new(store), command, config).await
        }
    }
}

async fn run<S: PermissionStore + 'static>(
    store: Arc<S>,
    command: Command,
    config: AppConfig,
) -> Result<(), BoxError> {
    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(PermissionCache::new(Arc::clone(&store)).with_metrics(Arc::clone(&metrics)));
    let service = AuthService::new(store, cache, metrics);

    match command {
        Command::Serve => run_serve(service, config).await,
        Command::Bootstrap => run_bootstrap(&service, &config).await,
        Command::Check {
            role,
            permission,
            resource,
        } => run_check(&service, &role, &permission, &resource).await,
        Command::ListPermissions { role } => run_list_permissions(&service, role.as_deref()).await,
        Command::Migrate => Ok(()),
    }
}

async fn run_migrate(config: &AppConfig) -> Result<(), BoxError> {
    if config.storage.backend != StorageBackend::Postgres {
        tracing::warn!("storage backend is not postgres, nothing to migrate");
        return Ok(());
    }

    tracing::info!("running database migrations");
    let pool = sqlx::PgPool::connect(&config.database.url).await?;
    warden_storage::postgres::migrations::run_migrations(&pool).await?;
    tracing::info!("migrations completed successfully");
    Ok(())
}

async fn run_bootstrap<S: PermissionStore + 'static>(
    service: &AuthService<S>,
    config: &AppConfig,
) -> Result<(), BoxError> {
    let name = &config.bootstrap.superuser;
    let created = service
        .ensure_superuser(name, config.bootstrap.password.as_deref())
        .await?;

    if created {
        println!("Superuser '{name}' created");
    } else {
        println!("Superuser '{name}' already exists");
    }
    Ok(())
}

async fn run_check<S: PermissionStore + 'static>(
    service: &AuthService<S>,
    role: &str,
    permission: &str,
    resource: &str,
) -> Result<(), BoxError> {
    let permission: Permission = permission.parse()?;
    let resource: Resource = resource.parse()?;

    service.cache().refresh_once().await?;

    match service.check(role, permission, &resource) {
        Ok(()) => {
            println!("ALLOWED: {role} has {permission} on {}", resource.label());
            Ok(())
        }
        Err(e) => {
            println!("DENIED: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_list_permissions<S: PermissionStore + 'static>(
    service: &AuthService<S>,
    role: Option<&str>,
) -> Result<(), BoxError> {
    let grants = service.store().list_permissions(role).await?;

    if grants.is_empty() {
        println!("No permissions granted");
    }
    for grant in grants {
        println!(
            "{:<24} {:<32} {}",
            grant.role,
            grant.resource.to_string(),
            grant.permissions
        );
    }
    Ok(())
}

async fn run_serve<S: PermissionStore + 'static>(
    service: AuthService<S>,
    config: AppConfig,
) -> Result<(), BoxError> {
    tracing::info!(
        admin_addr = %config.admin_addr(),
        refresh_interval_ms = config.cache.refresh_interval_ms,
        "starting warden server"
    );

    service
        .ensure_superuser(
            &config.bootstrap.superuser,
            config.bootstrap.password.as_deref(),
        )
        .await?;

    let cache = Arc::clone(service.cache());
    cache.refresh().await;
    let refresher = Arc::clone(&cache).spawn_refresh_task(config.refresh_interval());

    let router = admin::create_router(Arc::clone(&cache), Arc::clone(service.metrics()));
    let listener = tokio::net::TcpListener::bind(config.admin_addr()).await?;
    tracing::info!(addr = %config.admin_addr(), "admin listener ready");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    refresher.abort();
    if let Err(e) = result {
        tracing::error!(error = %e, "admin server error");
        return Err(e.into());
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => { tracing::info!("received SIGINT"); }
                _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, using SIGINT only");
            let _ = ctrl_c.await;
            tracing::info!("received SIGINT");
        }
    }
}
