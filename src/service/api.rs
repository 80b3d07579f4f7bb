use crate::{
    application::app::Application,
    infrastructure::shutdown::Shutdown,
    service::dispatcher::{self, Request, Response},
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Builds the GUI-facing router: one endpoint per message exchange.
pub fn router<A>(app: Arc<A>) -> Router
where
    A: Application + Send + Sync + 'static,
{
    Router::new()
        .route("/ipc", post(ipc::<A>))
        .route("/health", get(|| async { "ok" }))
        .with_state(app)
        .layer(CorsLayer::permissive())
}

pub async fn start_server<A, S>(shutdown: S, app: Arc<A>, port: u16) -> anyhow::Result<()>
where
    A: Application + Send + Sync + 'static,
    S: Shutdown,
{
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!("IPC server listening on {}", listener.local_addr()?);

    let mut shutdown_rx = shutdown.subscribe();
    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            tracing::warn!("IPC server received shutdown signal");
        })
        .await?;

    Ok(())
}

async fn ipc<A>(State(app): State<Arc<A>>, Json(request): Json<Request>) -> Json<Response>
where
    A: Application + Send + Sync + 'static,
{
    Json(dispatcher::dispatch(app, request).await)
}
