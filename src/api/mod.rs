//! HTTP API for the ramp service, health and readiness

use crate::chain::ChainManager;
use crate::config::ApiConfig;
use crate::error::{RampError, RampResult};
use crate::ramp::{ErrorLogEntry, Network};
use crate::service::{
    RampService, RampStatus, RegisterRampRequest, RegisterRampResponse, StartRampRequest,
};
use crate::state::RampStore;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RampService>,
    pub store: Arc<dyn RampStore>,
    pub chains: Arc<ChainManager>,
}

/// `RampError` rendered as an HTTP response
pub struct ApiError(RampError);

impl From<RampError> for ApiError {
    fn from(err: RampError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            RampError::Validation(_) | RampError::MissingMetadata { .. } => StatusCode::BAD_REQUEST,
            RampError::NotFound(_) => StatusCode::NOT_FOUND,
            RampError::PhaseMismatch { .. }
            | RampError::InvalidTransition { .. }
            | RampError::LeaseLost(_) => StatusCode::CONFLICT,
            RampError::Unrecoverable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/v1/ramp/register", post(register_ramp))
        .route("/v1/ramp/start", post(start_ramp))
        .route("/v1/ramp/:id", get(get_ramp_status))
        .route("/v1/ramp/:id/errors", get(get_error_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> RampResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RampError::Config(format!("cannot bind API server to {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| RampError::Internal(format!("API server: {}", e)))?;

    Ok(())
}

async fn register_ramp(
    State(state): State<AppState>,
    Json(request): Json<RegisterRampRequest>,
) -> ApiResult<RegisterRampResponse> {
    Ok(Json(state.service.register_ramp(request).await?))
}

async fn start_ramp(
    State(state): State<AppState>,
    Json(request): Json<StartRampRequest>,
) -> ApiResult<StartRampResponse> {
    let id = request.ramp_id;
    state.service.start_ramp(request).await?;
    Ok(Json(StartRampResponse {
        id,
        status: "processing",
    }))
}

async fn get_ramp_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RampStatus> {
    Ok(Json(state.service.get_ramp_status(id).await?))
}

async fn get_error_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<ErrorLogEntry>> {
    Ok(Json(state.service.get_error_logs(id).await?))
}

/// Liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness: store reachable and every configured network healthy
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.store.health_check().await.is_ok();
    let details: Vec<NetworkHealth> = state
        .chains
        .health_check()
        .await
        .into_iter()
        .map(|(network, healthy)| NetworkHealth { network, healthy })
        .collect();
    let networks = details.iter().all(|n| n.healthy);

    let ready = database && networks;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database,
            networks,
            details,
        }),
    )
}

// Response types

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct StartRampResponse {
    id: Uuid,
    status: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    database: bool,
    networks: bool,
    details: Vec<NetworkHealth>,
}

#[derive(Serialize)]
struct NetworkHealth {
    network: Network,
    healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::{offramp_fixture, test_processor, FakeLedger};
    use crate::ramp::RampState;
    use crate::service::{PreparedRamp, RampTransactionBuilder, SigningAccount};
    use crate::state::MemoryRampStore;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct ExpiredQuotes;

    #[async_trait]
    impl RampTransactionBuilder for ExpiredQuotes {
        async fn prepare(
            &self,
            quote_id: &str,
            _signing_accounts: &[SigningAccount],
            _additional_data: Option<&serde_json::Value>,
        ) -> RampResult<PreparedRamp> {
            Err(RampError::Unrecoverable(format!("quote {} expired", quote_id)))
        }
    }

    async fn app() -> (Router, Arc<MemoryRampStore>, RampState) {
        let ledger = FakeLedger::new();
        let (store, ramp) = offramp_fixture(&ledger).await;
        let processor = Arc::new(test_processor(&ledger, store.clone()));
        let service = Arc::new(RampService::new(
            store.clone(),
            Arc::new(ExpiredQuotes),
            processor,
        ));
        let state = AppState {
            service,
            store: store.clone(),
            chains: ledger.chains(),
        };
        (router(state), store, ramp)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_error_status_mapping() {
        use crate::ramp::RampPhase;

        let status = |e: RampError| ApiError(e).status();
        assert_eq!(status(RampError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(RampError::NotFound(Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(RampError::PhaseMismatch {
                expected: RampPhase::NablaSwap,
                actual: RampPhase::NablaApprove,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(RampError::LeaseLost(Uuid::nil())), StatusCode::CONFLICT);
        assert_eq!(
            status(RampError::Unrecoverable("quote expired".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(RampError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_status_endpoint_returns_current_phase() {
        let (app, _, ramp) = app().await;
        let request = Request::get(format!("/v1/ramp/{}", ramp.id))
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["currentPhase"], "initial");
        assert_eq!(body["phaseHistory"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ramp_errors_are_404() {
        let (app, _, _) = app().await;
        let request = Request::get(format!("/v1/ramp/{}/errors", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_expired_quote_is_422() {
        let (app, _, _) = app().await;
        let request = post_json(
            "/v1/ramp/register",
            serde_json::json!({
                "quoteId": "quote-old",
                "signingAccounts": [{ "network": "pendulum", "address": "5Eph" }]
            }),
        );

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_start_with_empty_presigned_is_400() {
        let (app, store, ramp) = app().await;
        let request = post_json(
            "/v1/ramp/start",
            serde_json::json!({ "rampId": ramp.id, "presignedTxs": [] }),
        );

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(store.get(ramp.id).await.unwrap().unwrap().presigned_txs.is_none());
    }

    #[tokio::test]
    async fn test_ready_reports_networks() {
        let (app, _, _) = app().await;
        let request = Request::get("/ready").body(Body::empty()).unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(
            body["details"].as_array().unwrap().len(),
            Network::ALL.len()
        );
    }
}
