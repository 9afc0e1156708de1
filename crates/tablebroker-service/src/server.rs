//! Open Service Broker v2 HTTP surface.

use crate::shared::types::{
    BindRequest, DeprovisionRequest, LastOperationRequest, Parameters, ProvisionRequest,
    UnbindRequest, UpdateRequest,
};
use crate::Broker;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tablebroker_core::ErrorResponse;
use tracing::debug;

pub const API_VERSION_HEADER: &str = "X-Broker-API-Version";
const SUPPORTED_API_MAJOR: &str = "2";

/// Error body in the shape brokers are expected to return.
#[derive(Debug)]
pub struct ApiError(ErrorResponse);

impl From<ErrorResponse> for ApiError {
    fn from(err: ErrorResponse) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self(ErrorResponse::new(status.as_u16(), code, message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.0.error_code,
            "description": self.0.message,
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
pub struct AsyncQuery {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LastOperationQuery {
    pub operation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProvisionBody {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub parameters: Option<Parameters>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBody {
    #[serde(default)]
    pub service_id: String,
    pub plan_id: Option<String>,
    pub parameters: Option<Parameters>,
}

pub fn router(broker: Broker) -> Router {
    let v2 = Router::new()
        .route("/v2/catalog", get(get_catalog))
        .route(
            "/v2/service_instances/:instance_id",
            put(provision).patch(update).delete(deprovision),
        )
        .route(
            "/v2/service_instances/:instance_id/last_operation",
            get(last_operation),
        )
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id",
            put(bind).delete(unbind),
        )
        .route_layer(middleware::from_fn(require_api_version));

    Router::new()
        .merge(v2)
        .route("/metrics", get(metrics))
        .with_state(broker)
}

async fn require_api_version(request: Request, next: Next) -> Response {
    match api_version_major(request.headers()) {
        Some(major) if major == SUPPORTED_API_MAJOR => next.run(request).await,
        other => {
            debug!(version = ?other, "Rejected request with unsupported API version");
            ApiError::new(
                StatusCode::PRECONDITION_FAILED,
                "PRECONDITION_FAILED",
                format!("{API_VERSION_HEADER} must be {SUPPORTED_API_MAJOR}.x"),
            )
            .into_response()
        }
    }
}

fn api_version_major(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(API_VERSION_HEADER)?.to_str().ok()?;
    raw.split('.').next().map(|major| major.trim().to_string())
}

fn json_body<T: Default>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    match body {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            rejection.body_text(),
        )),
    }
}

async fn get_catalog(State(broker): State<Broker>) -> impl IntoResponse {
    Json(broker.catalog().get_catalog())
}

async fn provision(
    State(broker): State<Broker>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    body: Result<Json<ProvisionBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = json_body(body)?;
    let result = broker
        .lifecycle()
        .provision(ProvisionRequest {
            instance_id,
            service_id: body.service_id,
            plan_id: body.plan_id,
            parameters: body.parameters.unwrap_or_default(),
            accepts_incomplete: query.accepts_incomplete,
        })
        .await?;

    let status = if result.already_exists {
        StatusCode::OK
    } else if result.is_async {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(json!({}))))
}

async fn update(
    State(broker): State<Broker>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = json_body(body)?;
    let result = broker
        .lifecycle()
        .update(UpdateRequest {
            instance_id,
            service_id: body.service_id,
            plan_id: body.plan_id,
            parameters: body.parameters,
            accepts_incomplete: query.accepts_incomplete,
        })
        .await?;

    Ok((accepted_or_ok(result.is_async), Json(json!({}))))
}

async fn deprovision(
    State(broker): State<Broker>,
    Path(instance_id): Path<String>,
    Query(query): Query<AsyncQuery>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let result = broker
        .lifecycle()
        .deprovision(DeprovisionRequest {
            instance_id,
            accepts_incomplete: query.accepts_incomplete,
        })
        .await?;

    Ok((accepted_or_ok(result.is_async), Json(json!({}))))
}

/// Polling is not supported; the only outcome is the 501 error body.
async fn last_operation(
    State(broker): State<Broker>,
    Path(instance_id): Path<String>,
    Query(query): Query<LastOperationQuery>,
) -> ApiError {
    let outcome = broker
        .lifecycle()
        .last_operation(LastOperationRequest {
            instance_id,
            operation: query.operation,
        })
        .await;

    match outcome {
        Ok(never) => match never {},
        Err(err) => err.into(),
    }
}

async fn bind(
    State(broker): State<Broker>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<AsyncQuery>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let result = broker
        .lifecycle()
        .bind(BindRequest {
            instance_id,
            binding_id,
            accepts_incomplete: query.accepts_incomplete,
        })
        .await?;

    let status = if result.is_async {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(json!({ "credentials": result.credentials }))))
}

async fn unbind(
    State(broker): State<Broker>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    broker
        .lifecycle()
        .unbind(UnbindRequest {
            instance_id,
            binding_id,
        })
        .await?;
    Ok(Json(json!({})))
}

async fn metrics(State(broker): State<Broker>) -> ApiResult<Response> {
    let body = broker.metrics().render_metrics().map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "METRICS_ERROR", e)
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

fn accepted_or_ok(is_async: bool) -> StatusCode {
    if is_async {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    }
}
