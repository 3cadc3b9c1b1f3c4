use std::sync::Arc;

use kbchat_core::config::Config;
use kbchat_pipeline::{Collaborators, Pipeline};
use kbchat_server::{build_router, init_tracing};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load()?;
    let settings = config.settings()?;
    let (collaborators, telemetry) = Collaborators::from_settings(&settings)?;
    let pipeline = Pipeline::new(collaborators, &settings)?;
    let app = build_router(Arc::new(pipeline));

    let addr = settings.server.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, env = config.env_name(), "kbchat-server listening");

    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;
    telemetry.shutdown().await;
    served?;
    tracing::info!("kbchat-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
