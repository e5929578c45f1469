//! The HTTP surface of the control plane.
//!
//! Every handler takes the shared [`AppState`] and returns either a JSON
//! body or a typed error that maps onto the status-code taxonomy.

use std::path::PathBuf;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use warden_core::{
    ApplyOptions, AuditExtras, Budget, BudgetModel, ChangeSpec, EventKind, PolicyAction,
    RiskLevel, Severity,
};

use crate::error::GatewayError;
use crate::state::{AppState, DEFAULT_BUDGET_ID};

type HandlerResult<T> = std::result::Result<T, GatewayError>;

/// Build the full router with CORS and tracing layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/gateway/preflight", post(preflight))
        .route("/gateway/route", post(route_task))
        .route("/missions", post(create_mission))
        .route("/missions/:id", get(get_mission))
        .route(
            "/missions/:id/checkpoints/:name/approve",
            post(approve_checkpoint),
        )
        .route("/missions/:id/batches", post(create_batch))
        .route("/missions/:mission_id/rollback/:batch_id", post(rollback_batch))
        .route("/dte/apply", post(dte_apply))
        .route("/dte/verify", post(dte_verify))
        .route("/finops/forecast", post(finops_forecast))
        .route("/finops/budget", get(budget_status).post(budget_consume))
        .route(
            "/policies/models",
            get(list_model_policies).put(put_model_policies),
        )
        .route("/evidence/events", post(append_event))
        .route("/evidence/mission/:id", get(mission_provenance))
        .route("/evidence/export", post(export_audit_pack))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---- gateway -------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreflightRequest {
    content: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    metadata: Option<Value>,
}

async fn preflight(
    State(state): State<AppState>,
    Json(body): Json<PreflightRequest>,
) -> HandlerResult<impl IntoResponse> {
    let started = Instant::now();
    let result = state.redactor.scan(&body.content, None);

    let violations: Vec<_> = result
        .findings
        .iter()
        .filter(|f| f.action == PolicyAction::Block || f.severity == Severity::Critical)
        .cloned()
        .collect();
    let redactions: Vec<_> = result
        .findings
        .iter()
        .filter(|f| f.action == PolicyAction::Redact)
        .cloned()
        .collect();
    let ok = violations.is_empty();

    let latency_ms = started.elapsed().as_millis();
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-preflight-latency-ms",
        HeaderValue::from_str(&latency_ms.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    tracing::debug!(
        provider = body.provider.as_deref().unwrap_or("unspecified"),
        findings = result.findings.len(),
        latency_ms,
        "preflight scan complete"
    );

    Ok((
        headers,
        Json(json!({
            "ok": ok,
            "violations": violations,
            "redactions": redactions,
            "sanitizedContent": ok.then_some(result.redacted),
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteRequest {
    task: String,
    #[serde(default)]
    budget: Option<String>,
    #[serde(default)]
    preferred_provider: Option<String>,
}

async fn route_task(
    State(state): State<AppState>,
    Json(body): Json<RouteRequest>,
) -> HandlerResult<Json<Value>> {
    // Rough prompt-size estimate; four characters per token.
    let estimated_tokens = (body.task.len() as u64 / 4).max(1);

    let (provider, policy) = match body.preferred_provider {
        Some(preferred) => (preferred, "preferred"),
        None => {
            let budget_id = body.budget.as_deref().unwrap_or(DEFAULT_BUDGET_ID);
            let model = state.ledger.route_request(budget_id, estimated_tokens)?;
            (model, "budget-priority")
        }
    };

    let forecast = state
        .ledger
        .forecast_cost(&provider, estimated_tokens, estimated_tokens / 2)?;

    Ok(Json(json!({
        "provider": provider,
        "policyApplied": policy,
        "estimatedCost": forecast.estimated_cost,
    })))
}

// ---- missions ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateMissionRequest {
    title: String,
    #[serde(default)]
    risk: Option<RiskLevel>,
}

async fn create_mission(
    State(state): State<AppState>,
    Json(body): Json<CreateMissionRequest>,
) -> HandlerResult<Json<Value>> {
    if body.title.trim().is_empty() {
        return Err(GatewayError::BadRequest("title must not be empty".into()));
    }
    let mission = state
        .coordinator
        .create_mission(body.title, body.risk.unwrap_or_default());
    Ok(Json(serde_json::to_value(mission)?))
}

async fn get_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<Value>> {
    let mission = state.coordinator.get_mission(id)?;
    Ok(Json(serde_json::to_value(mission)?))
}

async fn approve_checkpoint(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
) -> HandlerResult<Json<Value>> {
    let mission = state.coordinator.approve_checkpoint(id, &name)?;
    Ok(Json(serde_json::to_value(mission)?))
}

async fn create_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<Value>> {
    let batch = state.coordinator.create_batch(id)?;
    Ok(Json(serde_json::to_value(batch)?))
}

async fn rollback_batch(
    State(state): State<AppState>,
    Path((mission_id, batch_id)): Path<(Uuid, Uuid)>,
) -> HandlerResult<Json<Value>> {
    state.coordinator.rollback_batch(mission_id, batch_id)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("batch {batch_id} rolled back"),
    })))
}

// ---- transform engine ----------------------------------------------------

async fn dte_apply(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> HandlerResult<Json<Value>> {
    let spec = ChangeSpec::from_json(&body)?;
    let result = state
        .engine
        .apply(&spec, &state.config.workdir, ApplyOptions::default())
        .await?;
    Ok(Json(serde_json::to_value(result)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    spec: Value,
    working_dir: String,
}

async fn dte_verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> HandlerResult<Json<Value>> {
    let spec = ChangeSpec::from_json(&body.spec)?;
    let result = state
        .engine
        .verify(&spec, &PathBuf::from(body.working_dir))
        .await?;
    Ok(Json(serde_json::to_value(result)?))
}

// ---- finops --------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastRequest {
    change_spec: Value,
    #[serde(default)]
    provider: Option<String>,
}

async fn finops_forecast(
    State(state): State<AppState>,
    Json(body): Json<ForecastRequest>,
) -> HandlerResult<Json<Value>> {
    let provider = body.provider.unwrap_or_else(|| "gpt-4o-mini".to_string());
    let serialized = serde_json::to_string(&body.change_spec)?;
    let input_tokens = (serialized.len() as u64 / 4).max(1);
    let output_tokens = input_tokens / 2;

    let forecast = state
        .ledger
        .forecast_cost(&provider, input_tokens, output_tokens)?;

    Ok(Json(json!({
        "usdEstimate": forecast.estimated_cost,
        "tokens": input_tokens + output_tokens,
        "p95Latency": 500 + (input_tokens + output_tokens) / 2,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BudgetStatus {
    id: String,
    max_cost: f64,
    current_cost: f64,
    remaining: f64,
    breached: bool,
    alert_threshold: f64,
    alert_fired: bool,
}

impl From<Budget> for BudgetStatus {
    fn from(budget: Budget) -> Self {
        Self {
            remaining: budget.remaining(),
            breached: budget.breached(),
            id: budget.id,
            max_cost: budget.max_cost,
            current_cost: budget.current_cost,
            alert_threshold: budget.alert_threshold,
            alert_fired: budget.alert_fired,
        }
    }
}

async fn budget_status(State(state): State<AppState>) -> HandlerResult<Json<BudgetStatus>> {
    let budget = state.ledger.get_budget(DEFAULT_BUDGET_ID)?;
    Ok(Json(budget.into()))
}

#[derive(Debug, Deserialize)]
struct ConsumeRequest {
    #[serde(default)]
    consumed: Option<f64>,
}

async fn budget_consume(
    State(state): State<AppState>,
    Json(body): Json<ConsumeRequest>,
) -> HandlerResult<Json<BudgetStatus>> {
    let budget = match body.consumed {
        Some(amount) if amount > 0.0 => state.ledger.add_consumption(DEFAULT_BUDGET_ID, amount)?,
        _ => state.ledger.get_budget(DEFAULT_BUDGET_ID)?,
    };
    Ok(Json(budget.into()))
}

// ---- model policies ------------------------------------------------------

async fn list_model_policies(
    State(state): State<AppState>,
) -> HandlerResult<Json<Vec<BudgetModel>>> {
    let budget = state.ledger.get_budget(DEFAULT_BUDGET_ID)?;
    Ok(Json(budget.models))
}

async fn put_model_policies(
    State(state): State<AppState>,
    Json(models): Json<Vec<BudgetModel>>,
) -> HandlerResult<Json<Vec<BudgetModel>>> {
    if models.is_empty() {
        return Err(GatewayError::BadRequest(
            "model policy list must not be empty".into(),
        ));
    }
    let budget = state.ledger.update_budget_models(DEFAULT_BUDGET_ID, models)?;
    Ok(Json(budget.models))
}

// ---- evidence ------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendEventRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    mission_id: Option<Uuid>,
    #[serde(default)]
    data: Option<Value>,
}

async fn append_event(
    State(state): State<AppState>,
    Json(body): Json<AppendEventRequest>,
) -> HandlerResult<Json<Value>> {
    let kind = EventKind::parse(&body.kind)
        .ok_or_else(|| GatewayError::BadRequest(format!("unknown event type {:?}", body.kind)))?;
    let event = state
        .evidence
        .append(kind, body.mission_id, body.data.unwrap_or(Value::Null));
    Ok(Json(serde_json::to_value(event)?))
}

async fn mission_provenance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<Value>> {
    let graph = state.evidence.provenance(id);
    Ok(Json(serde_json::to_value(graph)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRequest {
    mission_id: Uuid,
    change_spec: Value,
}

async fn export_audit_pack(
    State(state): State<AppState>,
    Json(body): Json<ExportRequest>,
) -> HandlerResult<impl IntoResponse> {
    let extras = AuditExtras {
        finops: Some(state.ledger.finops_summary()),
        ..Default::default()
    };
    let (record, bytes) =
        state
            .evidence
            .build_audit_pack(body.mission_id, &body.change_spec, &extras)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    let disposition = format!("attachment; filename=\"pack_{}.zip\"", record.id);
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((headers, bytes))
}

// ---- health --------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "warden-gateway",
    }))
}

async fn status(State(state): State<AppState>) -> HandlerResult<Json<Value>> {
    let models = state.ledger.known_models();
    Ok(Json(json!({
        "version": crate::VERSION,
        "missions": state.coordinator.mission_count(),
        "events": state.evidence.event_count(),
        "policies": state.redactor.policy_count(),
        "models": models,
    })))
}
