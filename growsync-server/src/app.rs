use std::sync::Arc;

use axum::Router;
use growsync_api::models::EngineEvent;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::configs::{SchemaManager, Settings, Storage};
use crate::handles::*;
use crate::repositories::{ConfigRepository, RuleRepository};
use crate::services::{
    ActuatorChannel, AlertService, AutomationEngine, ChannelActuator, EngineDeps, LogNotifier, Notifier,
    SensorService, SystemClock, WebhookNotifier,
};

pub fn create_router(engine: Arc<AutomationEngine>, events: broadcast::Sender<EngineEvent>) -> Router {
    Router::new()
        .merge(engine_router(EngineState { engine }))
        .merge(sse_router(SSEState { sender: events }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Wires storage, the gateway, alerting and the engine together. Without a
/// gateway, commands are only logged.
pub async fn create_app(settings: &Arc<Settings>) -> anyhow::Result<(Router, Arc<AutomationEngine>)> {
    let (events, _receiver) = broadcast::channel(256);
    let storage = Arc::new(Storage::new(settings.database.clone(), SchemaManager::default()).await?);

    let rule_repository = Arc::new(RuleRepository::new(storage.clone()));
    let config_repository = Arc::new(ConfigRepository::new(storage.clone()));

    let notifier: Arc<dyn Notifier> = match &settings.notifier {
        Some(notifier) => Arc::new(WebhookNotifier::new(notifier)),
        None => Arc::new(LogNotifier),
    };
    let (alert_service, _alert_worker) =
        AlertService::spawn(settings.engine.alert_queue_capacity, notifier, events.clone());

    let sensor_service = settings.gateway.as_ref().map(SensorService::new);
    let actuator: Arc<dyn ActuatorChannel> = match &sensor_service {
        Some(sensor_service) => Arc::new(sensor_service.actuator()),
        None => {
            tracing::warn!("no gateway configured, actuator commands are only logged");
            let (sender, mut receiver) = mpsc::channel(64);
            tokio::spawn(async move {
                while let Some(command) = receiver.recv().await {
                    tracing::info!("actuator command {:?}", command);
                }
            });
            Arc::new(ChannelActuator::new(sender))
        }
    };

    let engine = AutomationEngine::launch(
        EngineDeps {
            actuator,
            alerts: alert_service,
            rules: rule_repository,
            configs: config_repository,
            clock: Arc::new(SystemClock::new(settings.engine.utc_offset_hours)),
            events: events.clone(),
        },
        &settings.engine,
        &settings.actuators,
    )
    .await;

    if let Some(sensor_service) = sensor_service {
        sensor_service.spawn(engine.sample_sender());
    }

    Ok((create_router(engine.clone(), events), engine))
}
