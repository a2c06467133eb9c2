use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hive_server::config::Config;
use hive_server::{stdio, telemetry};
use hive_database::{
    SqliteContextCacheRepository, SqliteContextRepository, SqliteDelegationRepository,
    SqliteProjectRepository, SqliteSubtaskRepository, SqliteTaskRepository,
};
use hive_protocol::{
    AgentFacade, ContextFacade, ContextService, ProjectFacade, SessionSweeper, SubtaskFacade,
    TaskFacade,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "taskhive", about = "Multi-tenant task orchestration server", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve JSON-line requests on stdin/stdout (default)
    Serve,
    /// Verify configuration and database connectivity, then exit
    HealthCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    telemetry::init(&config.logging)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::HealthCheck => health_check(config).await,
    }
}

async fn health_check(config: Config) -> Result<()> {
    let pool = hive_database::create_pool(&config.database_url(), config.database.pool_size)
        .await
        .context("connecting to the database")?;
    sqlx::query("SELECT 1").fetch_one(&pool).await.context("database ping")?;
    println!("ok");
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let scope = config.resolve_scope().context("resolving tenant scope")?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting taskhive");

    let pool = Arc::new(
        hive_database::create_pool(&config.database_url(), config.database.pool_size)
            .await
            .context("connecting to the database")?,
    );

    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone(), scope.clone()));
    let subtasks = Arc::new(SqliteSubtaskRepository::new(pool.clone(), scope.clone()));
    let projects = Arc::new(SqliteProjectRepository::new(pool.clone(), scope.clone()));
    let contexts = Arc::new(SqliteContextRepository::new(pool.clone(), scope.clone()));
    let cache = Arc::new(SqliteContextCacheRepository::new(pool.clone(), scope.clone()));
    let delegations = Arc::new(SqliteDelegationRepository::new(pool.clone(), scope.clone()));

    let context_service = Arc::new(ContextService::new(
        contexts,
        cache,
        delegations,
        scope.clone(),
        config.cache.ttl,
    ));

    let facades = stdio::Facades {
        tasks: Arc::new(TaskFacade::new(
            tasks.clone(),
            subtasks.clone(),
            context_service.clone(),
            scope.clone(),
        )),
        subtasks: Arc::new(SubtaskFacade::new(tasks, subtasks, scope.clone())),
        projects: Arc::new(ProjectFacade::new(projects.clone(), scope.clone())),
        agents: Arc::new(AgentFacade::new(projects.clone(), scope)),
        contexts: Arc::new(ContextFacade::new(context_service)),
    };

    let sweeper = SessionSweeper::new(projects, Duration::from_secs(config.server.sweep_interval));
    let sweep_handle = tokio::spawn(sweeper.run());
    info!(interval = config.server.sweep_interval, "session sweeper running");

    tokio::select! {
        result = stdio::serve(facades) => {
            info!("stdin closed, shutting down");
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    sweep_handle.abort();
    Ok(())
}
