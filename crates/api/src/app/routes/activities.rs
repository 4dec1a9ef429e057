use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/activities", get(list_activities))
}

/// Activity log, oldest first.
pub async fn list_activities(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ActivitiesQuery>,
) -> Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.activities(&filter)).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
