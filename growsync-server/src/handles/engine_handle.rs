use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use growsync_api::models::*;
use serde_json::Value;

use crate::errors::ApiError;
use crate::services::AutomationEngine;

#[derive(Clone)]
pub struct EngineState {
    pub engine: Arc<AutomationEngine>,
}

pub fn engine_router(engine_state: EngineState) -> Router {
    Router::new()
        .route("/engine/rules/process", post(process_rules))
        .route("/engine/rules/:rule_id/simulate", post(simulate_rule))
        .route("/engine/toggle", post(toggle_engine))
        .route("/engine/start", post(start_engine))
        .route("/engine/stop", post(stop_engine))
        .route("/engine/status", get(get_engine_status))
        .route("/engine/manual", post(notify_manual_action))
        .route(
            "/engine/config",
            get(get_automation_config).patch(update_automation_config),
        )
        .with_state(engine_state)
}

pub async fn process_rules(State(state): State<EngineState>) -> Result<Json<TickReport>, ApiError> {
    let report = state.engine.process_rules().await?;

    Ok(Json(report))
}

pub async fn simulate_rule(
    State(state): State<EngineState>,
    Path(rule_id): Path<Id>,
    body: Option<Json<SimulateRequest>>,
) -> Result<Json<SimulationResult>, ApiError> {
    let sample = body.and_then(|Json(request)| request.sample);
    let result = state.engine.simulate_rule(rule_id, sample).await?;

    Ok(Json(result))
}

pub async fn toggle_engine(State(state): State<EngineState>) -> Json<ToggleResponse> {
    Json(ToggleResponse { running: state.engine.toggle() })
}

pub async fn start_engine(State(state): State<EngineState>) -> Json<ToggleResponse> {
    state.engine.start();

    Json(ToggleResponse { running: state.engine.is_running() })
}

pub async fn stop_engine(State(state): State<EngineState>) -> Json<ToggleResponse> {
    state.engine.stop();

    Json(ToggleResponse { running: state.engine.is_running() })
}

pub async fn get_engine_status(State(state): State<EngineState>) -> Result<Json<EngineStatus>, ApiError> {
    let status = state.engine.status().await?;

    Ok(Json(status))
}

pub async fn notify_manual_action(
    State(state): State<EngineState>,
    body: Option<Json<ManualActionRequest>>,
) -> Result<Json<ManualActionResponse>, ApiError> {
    let command = body.and_then(|Json(request)| request.command);
    let response = state.engine.notify_manual_action(command).await?;

    Ok(Json(response))
}

pub async fn get_automation_config(State(state): State<EngineState>) -> Json<AutomationConfig> {
    Json(state.engine.automation_config().await)
}

pub async fn update_automation_config(
    State(state): State<EngineState>,
    Json(patch): Json<Value>,
) -> Result<Json<AutomationConfig>, ApiError> {
    if !patch.is_object() {
        return Err(ApiError::BadRequest("Configuration patch must be a JSON object".into()));
    }

    let config = state.engine.update_automation_config(patch).await?;

    Ok(Json(config))
}
