use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use shared::{
    BatchOutcome, BatchRequest, CreateTransferRequest, LedgerEntry, RequestError,
    StockAdjustmentRequest, TransferFilter, TransferRecord,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::batch::BatchProcessor;
use crate::engine::TransferEngine;
use crate::error::TransferError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TransferEngine>,
    pub batch: Arc<BatchProcessor>,
}

pub struct ApiError(TransferError);

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn malformed(detail: String) -> Self {
        Self(RequestError::Malformed(detail).into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::malformed(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, body) = match &err {
            TransferError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, json!({})),
            TransferError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                json!({ "entity": entity, "id": id }),
            ),
            TransferError::InvalidState {
                transfer_id,
                current,
                requested,
            } => (
                StatusCode::CONFLICT,
                json!({ "transfer_id": transfer_id, "current": current, "requested": requested }),
            ),
            TransferError::InsufficientStock {
                product_id,
                shop_id,
                requested,
                available,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "product_id": product_id,
                    "shop_id": shop_id,
                    "requested": requested,
                    "available": available,
                }),
            ),
            TransferError::QuantityOverflow { product_id, shop_id } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "product_id": product_id, "shop_id": shop_id }),
            ),
            TransferError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, json!({})),
            TransferError::Database(_) | TransferError::Corrupt(_) => {
                tracing::error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({}))
            }
        };

        let mut body = body;
        body["error"] = json!(err.code());
        body["message"] = json!(err.public_message());
        (status, Json(body)).into_response()
    }
}

/// `Json` whose rejection is reported as an `invalid_request` body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/transfers", post(create_transfer).get(list_transfers))
        .route("/transfers/batch", post(batch_action))
        .route("/transfers/:id", get(get_transfer))
        .route("/transfers/:id/cancel", post(cancel_transfer))
        .route("/transfers/:id/complete", post(complete_transfer))
        .route("/inventory/adjustments", post(adjust_stock))
        .route("/inventory/:product_id/:shop_id", get(stock_level))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_transfer(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateTransferRequest>,
) -> Result<(StatusCode, Json<TransferRecord>), ApiError> {
    let transfer = request.validate().map_err(TransferError::from)?;
    let record = state.engine.create(transfer).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<TransferFilter>,
) -> Result<Json<Vec<TransferRecord>>, ApiError> {
    Ok(Json(state.engine.list(&filter).await?))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TransferRecord>, ApiError> {
    Ok(Json(state.engine.get(id).await?))
}

pub async fn cancel_transfer(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TransferRecord>, ApiError> {
    Ok(Json(state.engine.cancel(id).await?))
}

pub async fn complete_transfer(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<TransferRecord>, ApiError> {
    Ok(Json(state.engine.complete(id).await?))
}

pub async fn batch_action(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> Result<Json<BatchOutcome>, ApiError> {
    Ok(Json(state.batch.process(request).await?))
}

pub async fn stock_level(
    State(state): State<AppState>,
    ApiPath((product_id, shop_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<LedgerEntry>, ApiError> {
    Ok(Json(state.engine.stock_level(product_id, shop_id).await?))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StockAdjustmentRequest>,
) -> Result<Json<LedgerEntry>, ApiError> {
    let adjustment = request.validate().map_err(TransferError::from)?;
    Ok(Json(state.engine.adjust_stock(adjustment).await?))
}

pub async fn health_check() -> &'static str {
    "OK"
}
