use anyhow::Context;
use clap::Parser;
use sqlx::{Connection, Postgres, Sqlite};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shortlink_api::config::{Cli, Command, DatabaseArgs, DbCommand, ServerArgs};
use shortlink_api::routes::build_routes;
use shortlink_api::services::db::{self, Backend, DatabaseKind};
use shortlink_api::services::tx::TransactionRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().is_ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Db(DbCommand::Check)) => check_database(&cli.database).await,
        None => {
            preflight(&cli.database).await?;
            serve(&cli.server).await
        }
    }
}

/// Check the configured database before serving. A bad database aborts startup.
async fn preflight(args: &DatabaseArgs) -> anyhow::Result<()> {
    if args.url.is_none() {
        info!("DATABASE_URL not set, skipping database check");
        return Ok(());
    }
    check_database(args).await
}

async fn serve(args: &ServerArgs) -> anyhow::Result<()> {
    let app = build_routes();

    let addr = args.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    info!("server stopped");
    Ok(())
}

async fn check_database(args: &DatabaseArgs) -> anyhow::Result<()> {
    let url = args
        .url
        .as_deref()
        .context("DATABASE_URL must be set for `db check`")?;

    match DatabaseKind::from_url(url)? {
        DatabaseKind::Sqlite => check::<Sqlite>(url, args).await,
        DatabaseKind::Postgres => check::<Postgres>(url, args).await,
    }
}

async fn check<DB: Backend>(url: &str, args: &DatabaseArgs) -> anyhow::Result<()> {
    let pool = db::connect::<DB>(url, args.auth_token.as_deref(), &args.pool_config()).await?;
    let runner = TransactionRunner::new(pool);

    let committed = runner
        .read_only(|conn| Box::pin(async move { conn.ping().await }))
        .await
        .context("read-only transaction failed")?;

    info!(backend = DB::NAME, at = %committed.committed_at, "database check passed");
    runner.pool().close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
