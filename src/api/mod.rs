use axum::{Extension, Router};
use std::sync::Arc;
use log::info;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
pub use error::{ApiError, OutcomeExt};
use crate::config::ApiConfiguration;
use crate::gallery::Gallery;

mod error;
mod controllers;

pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const APPLICATION_JSON: &str = "application/json";

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Clone)]
pub struct ApiContext {
    pub gallery: Arc<Gallery>,
}

pub fn app(ctx: ApiContext) -> Router {
    controllers::router()
        .layer(CorsLayer::new().allow_methods(Any).allow_headers(Any).allow_origin(Any))
        .layer(ServiceBuilder::new().layer(Extension(ctx)).layer(TraceLayer::new_for_http()))
}

pub async fn serve(gallery: Gallery, cfg: ApiConfiguration) -> anyhow::Result<()> {
    let addr = cfg.listen_addr;
    let ctx = ApiContext {
        gallery: Arc::new(gallery),
    };
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", &addr);
    axum::serve(listener, app(ctx)).await?;
    Ok(())
}
