use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use vpr_gate_core::{
    AuditRecorder, AuditSink, CorrelationId, Decision, ExecutionGate, FileControlPlane,
    GateError, GovernanceConfig, JsonlAuditSink, Record, RecordRegistry, SystemClock,
    TransitionRequest, Unverified,
    config::resolve_path,
    constants::{
        AUDIT_LOG_PATH_ENV, CONFIG_PATH_ENV, CONTROL_PATH_ENV, DEFAULT_AUDIT_LOG_FILENAME,
        DEFAULT_CONFIG_FILENAME, DEFAULT_CONTROL_FILENAME,
    },
};

/// Application state shared across REST API handlers
///
/// The gate is held unverified: every request re-asserts the subsystem, so a kill-switch or
/// audit outage takes effect on the next call.
#[derive(Clone)]
struct AppState {
    gate: ExecutionGate<Unverified>,
    registry: Arc<RecordRegistry>,
    recorder: Arc<AuditRecorder>,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct HealthRes {
    status: String,
    service: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct SubsystemRes {
    enabled: bool,
    reasons: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct ErrorRes {
    error: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct RegisterRecordReq {
    #[schema(value_type = Object)]
    record: Record,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct EvaluateReq {
    #[schema(value_type = Object)]
    request: TransitionRequest,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct DecisionRes {
    #[schema(value_type = Object)]
    decision: Decision,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct ApplyReq {
    #[schema(value_type = Object)]
    request: TransitionRequest,
    #[schema(value_type = Object)]
    decision: Decision,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct RecordRes {
    #[schema(value_type = Object)]
    record: Record,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct AuditTrailRes {
    #[schema(value_type = Vec<Object>)]
    entries: Vec<serde_json::Value>,
}

type ApiError = (StatusCode, Json<ErrorRes>);

fn error(status: StatusCode, message: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorRes {
            error: message.to_string(),
        }),
    )
}

fn gate_error(e: GateError) -> ApiError {
    let status = match &e {
        GateError::InvalidInput(_) | GateError::RecordInvariant(_) | GateError::Text(_) => {
            StatusCode::BAD_REQUEST
        }
        GateError::Id(_) => StatusCode::BAD_REQUEST,
        GateError::RecordExists { .. } | GateError::StaleFromState { .. } => StatusCode::CONFLICT,
        GateError::RecordNotFound { .. } => StatusCode::NOT_FOUND,
        GateError::ProofRejected(_) | GateError::Unauthorised(_) => StatusCode::FORBIDDEN,
        GateError::Audit(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("gate error: {e}");
    } else {
        tracing::warn!("gate error: {e}");
    }
    error(status, e)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        subsystem,
        register_record,
        evaluate_transition,
        apply_transition,
        audit_trail
    ),
    components(schemas(
        HealthRes,
        SubsystemRes,
        ErrorRes,
        RegisterRecordReq,
        EvaluateReq,
        DecisionRes,
        ApplyReq,
        RecordRes,
        AuditTrailRes
    ))
)]
struct ApiDoc;

/// Main entry point for the VPR gate service
///
/// # Environment Variables
/// - `VPR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `VPR_GATE_CONFIG`: governance configuration YAML (default: "gate.yaml")
/// - `VPR_GATE_CONTROL`: control-plane YAML (default: "control.yaml")
/// - `VPR_GATE_AUDIT_LOG`: JSON-lines audit log (default: "audit.jsonl")
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vpr_gate_core=info".parse()?)
                .add_directive("vpr_gate_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("VPR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let path_from_env = |env: &str, default: &str| {
        resolve_path(std::env::var_os(env).map(PathBuf::from), default)
    };
    let config_path = path_from_env(CONFIG_PATH_ENV, DEFAULT_CONFIG_FILENAME);
    let control_path = path_from_env(CONTROL_PATH_ENV, DEFAULT_CONTROL_FILENAME);
    let audit_path = path_from_env(AUDIT_LOG_PATH_ENV, DEFAULT_AUDIT_LOG_FILENAME);

    let config = if config_path.exists() {
        GovernanceConfig::load(&config_path)?
    } else {
        tracing::warn!(
            "No configuration at {}; execution subsystem stays disabled",
            config_path.display()
        );
        GovernanceConfig::default()
    };
    let sink = Arc::new(JsonlAuditSink::open(&audit_path)?);
    let recorder = Arc::new(AuditRecorder::new(sink, Arc::new(SystemClock)));
    let registry = Arc::new(RecordRegistry::new());
    let gate = ExecutionGate::new(
        Arc::new(config),
        Arc::new(FileControlPlane::new(control_path)),
        registry.clone(),
        recorder.clone(),
    );

    if let Err(block) = gate.assert_subsystem_enabled() {
        tracing::warn!("Starting with execution subsystem blocked: {block}");
    }

    tracing::info!("++ Starting VPR gate REST on {}", rest_addr);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(
        listener,
        app(AppState {
            gate,
            registry,
            recorder,
        }),
    )
    .await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/subsystem", get(subsystem))
        .route("/records", post(register_record))
        .route("/transitions/evaluate", post(evaluate_transition))
        .route("/transitions/apply", post(apply_transition))
        .route("/audit/:correlation_id", get(audit_trail))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Liveness only. Says nothing about whether transitions can be evaluated.
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        status: "ok".into(),
        service: "vpr-gate".into(),
    })
}

#[utoipa::path(
    get,
    path = "/subsystem",
    responses(
        (status = 200, description = "Execution subsystem enabled", body = SubsystemRes),
        (status = 503, description = "Execution subsystem blocked", body = SubsystemRes)
    )
)]
/// Asserts the execution subsystem and reports every block reason.
async fn subsystem(State(state): State<AppState>) -> (StatusCode, Json<SubsystemRes>) {
    match state.gate.assert_subsystem_enabled() {
        Ok(_) => (
            StatusCode::OK,
            Json(SubsystemRes {
                enabled: true,
                reasons: Vec::new(),
            }),
        ),
        Err(block) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SubsystemRes {
                enabled: false,
                reasons: block.reasons.iter().map(ToString::to_string).collect(),
            }),
        ),
    }
}

#[utoipa::path(
    post,
    path = "/records",
    request_body = RegisterRecordReq,
    responses(
        (status = 201, description = "Record registered", body = RecordRes),
        (status = 400, description = "Record rejected", body = ErrorRes),
        (status = 409, description = "Record already registered", body = ErrorRes)
    )
)]
/// Hands a newly authored record to the gate.
async fn register_record(
    State(state): State<AppState>,
    Json(req): Json<RegisterRecordReq>,
) -> Result<(StatusCode, Json<RecordRes>), ApiError> {
    state
        .registry
        .register(req.record.clone())
        .map_err(gate_error)?;
    Ok((StatusCode::CREATED, Json(RecordRes { record: req.record })))
}

#[utoipa::path(
    post,
    path = "/transitions/evaluate",
    request_body = EvaluateReq,
    responses(
        (status = 200, description = "Decision, allowed or denied", body = DecisionRes),
        (status = 503, description = "Execution subsystem blocked", body = ErrorRes)
    )
)]
/// Evaluates a proposed transition. A denial is a normal 200 response carrying its reasons.
async fn evaluate_transition(
    State(state): State<AppState>,
    Json(req): Json<EvaluateReq>,
) -> Result<Json<DecisionRes>, ApiError> {
    let gate = state
        .gate
        .assert_subsystem_enabled()
        .map_err(|block| error(StatusCode::SERVICE_UNAVAILABLE, block))?;
    let decision = gate.evaluate(&req.request);
    Ok(Json(DecisionRes { decision }))
}

#[utoipa::path(
    post,
    path = "/transitions/apply",
    request_body = ApplyReq,
    responses(
        (status = 200, description = "Transition applied", body = RecordRes),
        (status = 403, description = "Decision does not prove an allowed transition", body = ErrorRes),
        (status = 404, description = "Record not found", body = ErrorRes),
        (status = 409, description = "Record moved on since the decision", body = ErrorRes),
        (status = 503, description = "Audit unavailable", body = ErrorRes)
    )
)]
/// Applies an allowed decision to its record.
async fn apply_transition(
    State(state): State<AppState>,
    Json(req): Json<ApplyReq>,
) -> Result<Json<RecordRes>, ApiError> {
    let record = state
        .registry
        .apply(&req.decision, &req.request, &state.recorder)
        .map_err(gate_error)?;
    Ok(Json(RecordRes { record }))
}

#[utoipa::path(
    get,
    path = "/audit/{correlation_id}",
    params(
        ("correlation_id" = String, Path, description = "Canonical correlation id")
    ),
    responses(
        (status = 200, description = "Audit entries in append order", body = AuditTrailRes),
        (status = 400, description = "Invalid correlation id", body = ErrorRes),
        (status = 503, description = "Audit unavailable", body = ErrorRes)
    )
)]
/// Every audit entry for a correlation id.
async fn audit_trail(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> Result<Json<AuditTrailRes>, ApiError> {
    let correlation_id = CorrelationId::parse(&correlation_id)
        .map_err(|e| error(StatusCode::BAD_REQUEST, e))?;
    let entries = state
        .recorder
        .sink()
        .by_correlation(&correlation_id)
        .map_err(|e| gate_error(e.into()))?;
    let entries = entries
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(Json(AuditTrailRes { entries }))
}
