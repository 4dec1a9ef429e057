use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockroom_core::TransactionId;
use stockroom_lending::{Checkout, ReturnItems, TransactionKind, TransactionView};

use crate::app::dto;
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/transactions", post(checkout).get(list_transactions))
        .route(
            "/transactions/:id",
            get(get_transaction).delete(delete_transaction),
        )
        .route("/transactions/:id/returns", post(return_items))
}

/// Check out stock: a borrowing or a material request.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CheckoutRequest>,
) -> Response {
    let kind: TransactionKind = match errors::parse(&body.kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let lines = match body
        .lines
        .iter()
        .map(dto::CheckoutLineRequest::to_line)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(lines) => lines,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let cmd = Checkout {
        requester_name: body.requester_name,
        purpose: body.purpose,
        kind,
        expected_return_date: body.expected_return_date,
        notes: body.notes,
        lines,
        occurred_at: now,
    };

    match services.run(move |engine| engine.checkout(&cmd)).await {
        Ok(txn) => (StatusCode::CREATED, Json(TransactionView::at(txn, now))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::TransactionsQuery>,
) -> Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services
        .run(move |engine| engine.transactions(&filter, Utc::now()))
        .await
    {
        Ok(views) => Json(views).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let transaction_id: TransactionId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .run(move |engine| engine.transaction(transaction_id, Utc::now()))
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let transaction_id: TransactionId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .run(move |engine| engine.delete_transaction(transaction_id))
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Record returned, damaged and lost units against a borrowing.
pub async fn return_items(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReturnRequest>,
) -> Response {
    let transaction_id: TransactionId = match errors::parse(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let lines = match body
        .lines
        .iter()
        .map(dto::ReturnLineRequest::to_line)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(lines) => lines,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let cmd = ReturnItems {
        transaction_id,
        lines,
        notes: body.notes,
        occurred_at: now,
    };

    match services.run(move |engine| engine.return_items(&cmd)).await {
        Ok(txn) => Json(TransactionView::at(txn, now)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
