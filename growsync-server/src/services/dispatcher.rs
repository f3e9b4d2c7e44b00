use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use growsync_api::models::{ActuatorCommand, Alert, EngineEvent};
use tokio::sync::broadcast::Sender;

use crate::errors::EngineError;
use crate::services::{ActuatorChannel, AlertSink};

/// Shared output path of every controller: actuator commands with a deadline,
/// fire-and-forget alerts and live events.
#[derive(Clone)]
pub struct Dispatcher {
    actuator: Arc<dyn ActuatorChannel>,
    alerts: Arc<dyn AlertSink>,
    events: Sender<EngineEvent>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        actuator: Arc<dyn ActuatorChannel>,
        alerts: Arc<dyn AlertSink>,
        events: Sender<EngineEvent>,
        timeout: Duration,
    ) -> Self {
        Self { actuator, alerts, events, timeout }
    }

    pub async fn send(&self, command: ActuatorCommand) -> Result<(), EngineError> {
        with_timeout("actuator dispatch", self.timeout, self.actuator.send(&command)).await?;

        tracing::debug!("dispatched {:?}", command);
        self.publish(EngineEvent::Command(command));

        Ok(())
    }

    pub fn alert(&self, alert: Alert) {
        self.alerts.send_alert(alert);
    }

    pub fn publish(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Runs a fallible future under a deadline, folding both failure modes into
/// an [`EngineError`].
pub async fn with_timeout<T, E, F>(operation: &'static str, limit: Duration, future: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, E>>,
    EngineError: From<E>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result.map_err(EngineError::from),
        Err(_) => Err(EngineError::Timeout { operation, limit }),
    }
}
