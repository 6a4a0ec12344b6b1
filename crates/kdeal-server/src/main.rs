mod api;
mod middleware;
mod pipeline;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_admin_quota, AppState},
    middleware::AdminGate,
    pipeline::LiveRuns,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(kdeal_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = kdeal_db::connect_pool_from_app_config(&config).await?;
    let applied = kdeal_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let live_runs = LiveRuns::default();
    let _scheduler =
        scheduler::build_scheduler(pool.clone(), Arc::clone(&config), live_runs.clone()).await?;

    let gate = AdminGate::from_keys(&config.api_keys, &config.env)?;
    let bind_addr = config.bind_addr;
    let app = build_app(
        AppState {
            pool,
            config,
            live_runs,
        },
        gate,
        default_admin_quota(),
    );

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "kdeal-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
