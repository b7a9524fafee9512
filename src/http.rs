//! REST surface over the front desk.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{MatchedPath, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::desk::*;
use crate::engine::{EngineError, ErrorKind};
use crate::model::GuestId;
use crate::observability;

pub type AppState = Arc<FrontDesk>;

/// Any failure a handler can answer with. Renders `{ "error": message }`.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Engine(e) => {
                let status = match e.kind() {
                    ErrorKind::Validation | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::StorageUnavailable => {
                        error!("storage failure: {e}");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(desk: AppState) -> Router {
    Router::new()
        .route("/reservations", get(list_reservations).post(create_reservation))
        .route("/reservations/daily", get(daily_sheet))
        .route(
            "/reservations/{id}",
            get(get_reservation).put(update_reservation).delete(delete_reservation),
        )
        .route("/reservations/{id}/payment", put(record_payment))
        .route("/occupancy", get(occupancy))
        .route("/guests/{id}/reservations", get(guest_usage))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(desk)
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".into());
    let start = Instant::now();
    let response = next.run(request).await;
    let status = observability::status_label(response.status().as_u16());
    metrics::counter!(observability::REQUESTS_TOTAL, "route" => route.clone(), "status" => status)
        .increment(1);
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
    response
}

async fn create_reservation(
    State(desk): State<AppState>,
    body: Result<Json<ReservationInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ReservationView>)> {
    let Json(input) = body?;
    let view = desk.create(input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn list_reservations(
    State(desk): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ReservationView>>> {
    let Query(query) = query?;
    Ok(Json(desk.list(query).await?))
}

async fn get_reservation(
    State(desk): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationView>> {
    let id = parse_reservation_id(&id)?;
    Ok(Json(desk.get(id).await?))
}

async fn update_reservation(
    State(desk): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ReservationInput>, JsonRejection>,
) -> ApiResult<Json<ReservationView>> {
    let id = parse_reservation_id(&id)?;
    let Json(input) = body?;
    Ok(Json(desk.update(id, input).await?))
}

async fn delete_reservation(
    State(desk): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReservationView>> {
    let id = parse_reservation_id(&id)?;
    Ok(Json(desk.delete(id).await?))
}

async fn record_payment(
    State(desk): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<PaymentInput>, JsonRejection>,
) -> ApiResult<Json<ReservationView>> {
    let id = parse_reservation_id(&id)?;
    let Json(input) = body?;
    Ok(Json(desk.record_payment(id, input).await?))
}

async fn daily_sheet(
    State(desk): State<AppState>,
    query: Result<Query<DailyQuery>, QueryRejection>,
) -> ApiResult<Json<DailySheet>> {
    let Query(query) = query?;
    Ok(Json(desk.daily(query).await?))
}

async fn occupancy(
    State(desk): State<AppState>,
    query: Result<Query<OccupancyQuery>, QueryRejection>,
) -> ApiResult<Json<OccupancyView>> {
    let Query(query) = query?;
    Ok(Json(desk.occupancy(query).await?))
}

async fn guest_usage(
    State(desk): State<AppState>,
    Path(guest_id): Path<String>,
) -> ApiResult<Json<GuestUsage>> {
    let guest_id: GuestId = guest_id
        .trim()
        .parse()
        .map_err(|_| EngineError::validation(format!("invalid guest id: {guest_id:?}")))?;
    Ok(Json(desk.guest_usage(guest_id).await))
}
