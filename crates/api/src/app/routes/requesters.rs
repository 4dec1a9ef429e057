use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/requesters", get(list_requesters))
        .route("/requesters/:name", get(get_requester))
}

pub async fn list_requesters(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.run(|engine| engine.requesters()).await {
        Ok(profiles) => Json(profiles).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_requester(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
) -> Response {
    match services.run(move |engine| engine.requester(&name)).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
