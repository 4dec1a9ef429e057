use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockroom_core::ItemId;
use stockroom_inventory::{
    ItemCondition, ItemKind, RegisterItem, RestockItem, SetItemCondition, UpdateItem,
};

use crate::app::dto::{self, ItemResponse};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/items", post(register_item).get(list_items))
        .route("/items/low-stock", get(low_stock_items))
        .route(
            "/items/:id",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/items/:id/restock", post(restock_item))
        .route("/items/:id/condition", post(set_item_condition))
}

pub async fn register_item(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterItemRequest>,
) -> Response {
    let kind: ItemKind = match errors::parse(&body.kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    let cmd = RegisterItem {
        name: body.name,
        kind,
        initial_stock: body.initial_stock,
        min_stock: body.min_stock,
        unit: body.unit,
        location: body.location,
        occurred_at: Utc::now(),
    };

    match services.run(move |engine| engine.register_item(&cmd)).await {
        Ok(item) => (StatusCode::CREATED, Json(ItemResponse::from(item))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ItemsQuery>,
) -> Response {
    let kind: Option<ItemKind> = match errors::parse_opt(query.kind.as_deref()) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.items(kind)).await {
        Ok(items) => Json(dto::items_response(items)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn low_stock_items(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.run(|engine| engine.low_stock_items()).await {
        Ok(items) => Json(dto::items_response(items)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let item_id: ItemId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.item(item_id)).await {
        Ok(item) => Json(ItemResponse::from(item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateItemRequest>,
) -> Response {
    let item_id: ItemId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = UpdateItem {
        item_id,
        name: body.name,
        min_stock: body.min_stock,
        unit: body.unit,
        location: body.location,
        occurred_at: Utc::now(),
    };

    match services.run(move |engine| engine.update_item(&cmd)).await {
        Ok(item) => Json(ItemResponse::from(item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let item_id: ItemId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.run(move |engine| engine.delete_item(item_id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn restock_item(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RestockRequest>,
) -> Response {
    let item_id: ItemId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = RestockItem {
        item_id,
        quantity: body.quantity,
        occurred_at: Utc::now(),
    };

    match services.run(move |engine| engine.restock_item(&cmd)).await {
        Ok(item) => Json(ItemResponse::from(item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn set_item_condition(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetConditionRequest>,
) -> Response {
    let item_id: ItemId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let condition: ItemCondition = match errors::parse(&body.condition) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let cmd = SetItemCondition {
        item_id,
        condition,
        occurred_at: Utc::now(),
    };

    match services.run(move |engine| engine.set_item_condition(&cmd)).await {
        Ok(item) => Json(ItemResponse::from(item)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
