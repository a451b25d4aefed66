mod extract;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;

use crate::server::handlers::{bids, push};
use crate::{api::API, error::Error, notify::Hub};

pub use extract::{USER_ID_HEADER, USER_ROLES_HEADER};

pub type DynAPI = Arc<dyn API + Send + Sync>;

pub fn router(api: DynAPI, hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/transport-bids", post(bids::create))
        .route("/transport-bids/mine", get(bids::list_mine))
        .route("/transport-bids/expire", post(bids::expire))
        .route("/transport-bids/:id", get(bids::find))
        .route("/transport-bids/:id/shipment", get(bids::find_shipment))
        .route("/transport-bids/:id/confirm", post(bids::confirm))
        .route("/ws", get(push::subscribe))
        .layer(Extension(api))
        .layer(Extension(hub))
}

pub async fn serve(api: DynAPI, hub: Arc<Hub>, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api, hub);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
