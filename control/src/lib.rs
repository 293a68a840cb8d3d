pub mod app_state;
pub mod control;
pub mod handlers;
pub mod routes;

use std::net::SocketAddr;

pub use app_state::AppState;

pub async fn run(addr: SocketAddr, app_state: app_state::SharedState) -> anyhow::Result<()> {
    let app = routes::create_router(app_state);

    tracing::info!("control surface listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
