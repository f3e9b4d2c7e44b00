use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use growsync_api::ValidationError;
use growsync_api::models::{
    ActuatorCommand, AutomationConfig, EngineEvent, EngineStatus, Id, ManualActionResponse, SensorSample, SimulationResult,
    TickReport, VpdConfig,
};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::configs::{Actuators, Engine, Settings};
use crate::errors::{EngineError, StoreError};
use crate::services::{
    ActuatorChannel, AlertSink, Clock, ConfigStore, Dispatcher, LightScheduler, Orchestrator, OrchestratorMessage,
    RuleScheduler, RuleStore, SafetyInterlock, SchedulerLimits, VpdController, with_timeout,
};

/// Collaborators the engine is wired to.
pub struct EngineDeps {
    pub actuator: Arc<dyn ActuatorChannel>,
    pub alerts: Arc<dyn AlertSink>,
    pub rules: Arc<dyn RuleStore>,
    pub configs: Arc<dyn ConfigStore>,
    pub clock: Arc<dyn Clock>,
    pub events: broadcast::Sender<EngineEvent>,
}

struct SchedulerTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Facade over the orchestrator actor and the rule scheduler.
pub struct AutomationEngine {
    scheduler: Arc<RuleScheduler>,
    orchestrator: mpsc::Sender<OrchestratorMessage>,
    samples: mpsc::Sender<SensorSample>,
    configs: Arc<dyn ConfigStore>,
    automation: Mutex<AutomationConfig>,
    running: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
    scheduler_task: StdMutex<Option<SchedulerTask>>,
    orchestrator_task: StdMutex<Option<JoinHandle<()>>>,
    tick_period: Duration,
    persistence_timeout: Duration,
}

async fn load_or_default<T, F>(what: &'static str, limit: Duration, future: F) -> T
where
    T: Default,
    F: Future<Output = Result<Option<T>, StoreError>>,
{
    match with_timeout(what, limit, future).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            tracing::info!("no stored {}, using defaults", what);
            T::default()
        }
        Err(e) => {
            tracing::warn!("Failed to load {}, using defaults: {}", what, e);
            T::default()
        }
    }
}

fn valid_or_default<T: Default>(
    what: &'static str,
    config: T,
    validate: impl Fn(&T) -> Result<(), ValidationError>,
) -> T {
    match validate(&config) {
        Ok(()) => config,
        Err(e) => {
            tracing::warn!("Stored {} is invalid, using defaults: {}", what, e);
            T::default()
        }
    }
}

impl AutomationEngine {
    /// Loads the runtime configuration, spawns the orchestrator and starts
    /// the scheduler when `autostart` is set.
    pub async fn launch(deps: EngineDeps, engine: &Engine, actuators: &Actuators) -> Arc<Self> {
        let persistence_timeout = engine.persistence_timeout();
        let vpd_config: VpdConfig =
            load_or_default("vpd config", persistence_timeout, deps.configs.load_vpd_config()).await;
        let vpd_config = valid_or_default("vpd config", vpd_config, VpdConfig::validate);
        let automation: AutomationConfig =
            load_or_default("automation config", persistence_timeout, deps.configs.load_automation_config()).await;
        let automation = valid_or_default("automation config", automation, AutomationConfig::validate);

        let dispatcher = Dispatcher::new(deps.actuator, deps.alerts, deps.events, engine.dispatch_timeout());
        let (latest_tx, latest_rx) = watch::channel(None);
        let (running, running_rx) = watch::channel(false);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let scheduler = Arc::new(RuleScheduler::new(
            deps.rules,
            dispatcher.clone(),
            deps.clock.clone(),
            latest_rx,
            SchedulerLimits::from(engine),
            automation.conflict_window_seconds,
        ));

        let vpd = VpdController::new(vpd_config, actuators.vpd_fan.clone(), deps.configs.clone(), persistence_timeout);
        let orchestrator = Orchestrator::new(
            automation.clone(),
            SafetyInterlock::new(actuators),
            LightScheduler::new(actuators.light.clone(), engine.pwm_native_max),
            vpd,
            dispatcher,
            deps.clock,
            latest_tx,
            running_rx,
        );

        let (samples, samples_rx) = mpsc::channel(engine.sample_queue_capacity.max(1));
        let (messages, messages_rx) = mpsc::channel(16);
        let orchestrator_task = orchestrator.spawn(samples_rx, messages_rx, shutdown_rx);

        let engine_handle = Arc::new(Self {
            scheduler,
            orchestrator: messages,
            samples,
            configs: deps.configs,
            automation: Mutex::new(automation),
            running,
            shutdown,
            scheduler_task: StdMutex::new(None),
            orchestrator_task: StdMutex::new(Some(orchestrator_task)),
            tick_period: engine.rule_tick(),
            persistence_timeout,
        });

        if engine.autostart {
            engine_handle.start();
        }

        engine_handle
    }

    /// Sender feeding the orchestrator, handed to the sample source.
    pub fn sample_sender(&self) -> mpsc::Sender<SensorSample> {
        self.samples.clone()
    }

    pub async fn submit_sample(&self, sample: SensorSample) -> Result<(), EngineError> {
        self.samples.send(sample).await.map_err(|_| EngineError::Stopped)
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Starts the rule scheduler. Returns false when it was already running.
    pub fn start(&self) -> bool {
        let mut task = match self.scheduler_task.lock() {
            Ok(task) => task,
            Err(poisoned) => poisoned.into_inner(),
        };
        if task.is_some() {
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let handle = self.scheduler.clone().spawn(self.tick_period, stop_rx);
        *task = Some(SchedulerTask { stop, handle });
        self.running.send_replace(true);

        tracing::info!("automation engine started");
        true
    }

    fn take_scheduler(&self) -> Option<SchedulerTask> {
        let task = match self.scheduler_task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let task = task?;

        task.stop.send_replace(true);
        self.running.send_replace(false);
        tracing::info!("automation engine stopped");
        Some(task)
    }

    /// Stops scheduling new ticks. A tick in flight runs to completion.
    /// Returns false when it was not running.
    pub fn stop(&self) -> bool {
        self.take_scheduler().is_some()
    }

    /// Flips the running state, returning the new one.
    pub fn toggle(&self) -> bool {
        if self.is_running() {
            self.stop();
            false
        } else {
            self.start();
            true
        }
    }

    /// Out-of-cycle scheduler pass.
    pub async fn process_rules(&self) -> Result<TickReport, EngineError> {
        self.scheduler.process_rules().await
    }

    pub async fn simulate_rule(&self, id: Id, sample: Option<SensorSample>) -> Result<SimulationResult, EngineError> {
        self.scheduler.simulate(id, sample).await
    }

    async fn ask<T>(&self, message: OrchestratorMessage, response: oneshot::Receiver<T>) -> Result<T, EngineError> {
        self.orchestrator.send(message).await.map_err(|_| EngineError::Stopped)?;
        response.await.map_err(|_| EngineError::Stopped)
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply, response) = oneshot::channel();
        let orchestrator = self.ask(OrchestratorMessage::Status(reply), response).await?;
        let scheduler = self.scheduler.summary();

        Ok(EngineStatus {
            running: self.is_running(),
            tick_count: scheduler.tick_count,
            last_tick: scheduler.last_tick,
            last_outcomes: scheduler.last_outcomes,
            manual_override_until: orchestrator.manual_override_until,
            current_fan_speed: orchestrator.current_fan_speed,
            last_vpd: orchestrator.last_vpd,
            light_on: orchestrator.light_on,
            safety_trips: orchestrator.safety_trips,
            samples_processed: orchestrator.samples_processed,
        })
    }

    /// Arms the manual override window and forwards the human's command.
    pub async fn notify_manual_action(
        &self,
        command: Option<ActuatorCommand>,
    ) -> Result<ManualActionResponse, EngineError> {
        let (reply, response) = oneshot::channel();
        let override_until = self
            .ask(OrchestratorMessage::ManualAction { command, reply }, response)
            .await??;

        Ok(ManualActionResponse { override_until })
    }

    pub async fn automation_config(&self) -> AutomationConfig {
        self.automation.lock().await.clone()
    }

    /// Merges a partial JSON document into the automation configuration.
    /// A failed save is logged; the merged config still takes effect.
    pub async fn update_automation_config(&self, patch: serde_json::Value) -> Result<AutomationConfig, EngineError> {
        let mut current = self.automation.lock().await;

        let merged: AutomationConfig =
            Settings::merge(&*current, patch).map_err(|e| ValidationError::Config(e.to_string()))?;
        merged.validate()?;

        if let Err(e) = with_timeout(
            "automation config save",
            self.persistence_timeout,
            self.configs.save_automation_config(&merged),
        )
        .await
        {
            tracing::error!("Failed to persist automation config: {}", e);
        }

        self.scheduler.set_conflict_window(merged.conflict_window_seconds);
        self.orchestrator
            .send(OrchestratorMessage::UpdateConfig(merged.clone()))
            .await
            .map_err(|_| EngineError::Stopped)?;
        *current = merged.clone();

        tracing::info!("automation config updated");
        Ok(merged)
    }

    /// Stops the scheduler and the orchestrator, waiting for both to finish
    /// their current work.
    pub async fn shutdown(&self) {
        if let Some(task) = self.take_scheduler() {
            if let Err(e) = task.handle.await {
                tracing::error!("rule scheduler task failed: {}", e);
            }
        }

        self.shutdown.send_replace(true);
        let handle = match self.orchestrator_task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("orchestrator task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use growsync_api::models::SafetyLimits;
    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::tests::{ManualClock, MemoryConfigStore, MemoryRuleStore, TestHarness};

    async fn engine(autostart: bool) -> (TestHarness, Arc<MemoryConfigStore>, Arc<AutomationEngine>) {
        let harness = TestHarness::new();
        let configs = Arc::new(MemoryConfigStore::default());
        let deps = EngineDeps {
            actuator: harness.actuator.clone(),
            alerts: harness.alerts.clone(),
            rules: Arc::new(MemoryRuleStore::new(Vec::new())),
            configs: configs.clone(),
            clock: Arc::new(ManualClock::new(datetime!(2024-05-01 12:00 UTC))),
            events: harness.events.clone(),
        };
        let settings = Engine { autostart, ..Engine::default() };

        let engine = AutomationEngine::launch(deps, &settings, &Actuators::default()).await;
        (harness, configs, engine)
    }

    #[tokio::test]
    async fn test_start_stop_toggle() {
        let (_harness, _configs, engine) = engine(false).await;
        assert!(!engine.is_running());

        assert!(engine.start());
        assert!(!engine.start());
        assert!(engine.is_running());

        assert!(!engine.toggle());
        assert!(!engine.is_running());
        assert!(!engine.stop());

        assert!(engine.toggle());
        engine.shutdown().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_partial_config_update() {
        let (_harness, configs, engine) = engine(false).await;

        let updated = engine
            .update_automation_config(json!({
                "safety": { "max_temp_safe": 35.0, "max_gas_safe": 800.0 },
                "manual_pause_minutes": null
            }))
            .await
            .unwrap();

        assert_eq!(updated.safety, SafetyLimits { max_temp_safe: 35.0, max_gas_safe: 800.0 });
        assert_eq!(updated.manual_pause_minutes, 30);
        assert_eq!(configs.automation_config(), Some(updated.clone()));

        let rejected = engine.update_automation_config(json!({ "conflict_window_seconds": "soon" })).await;
        assert!(matches!(rejected, Err(EngineError::Validation(_))));
        assert_eq!(engine.automation_config().await, updated);
    }

    #[tokio::test]
    async fn test_manual_action_reported_in_status() {
        let (harness, _configs, engine) = engine(true).await;

        let response = engine
            .notify_manual_action(Some(ActuatorCommand::relay("light", false)))
            .await
            .unwrap();

        let status = engine.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.manual_override_until, Some(response.override_until));
        assert_eq!(harness.actuator.commands(), vec![ActuatorCommand::relay("light", false)]);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_launch_uses_stored_config() {
        let harness = TestHarness::new();
        let stored = AutomationConfig { manual_pause_minutes: 5, ..AutomationConfig::default() };
        let deps = EngineDeps {
            actuator: harness.actuator.clone(),
            alerts: harness.alerts.clone(),
            rules: Arc::new(MemoryRuleStore::new(Vec::new())),
            configs: Arc::new(MemoryConfigStore::with_automation(stored.clone())),
            clock: Arc::new(ManualClock::new(datetime!(2024-05-01 12:00 UTC))),
            events: harness.events.clone(),
        };
        let settings = Engine { autostart: false, ..Engine::default() };
        let engine = AutomationEngine::launch(deps, &settings, &Actuators::default()).await;

        assert_eq!(engine.automation_config().await, stored);
        let response = engine.notify_manual_action(None).await.unwrap();
        assert_eq!(response.override_until, datetime!(2024-05-01 12:05 UTC));
        assert!(harness.actuator.commands().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_pause_is_rejected() {
        let (harness, _configs, engine) = engine(false).await;

        let rejected = engine.update_automation_config(json!({ "manual_pause_minutes": 10_000_000_000u64 })).await;
        assert!(matches!(rejected, Err(EngineError::Validation(_))));

        let response = engine.notify_manual_action(None).await.unwrap();
        assert_eq!(response.override_until, datetime!(2024-05-01 12:30 UTC));

        let mut hot = SensorSample::new(datetime!(2024-05-01 12:00 UTC));
        hot.temp_top = Some(60.0);
        engine.submit_sample(hot).await.unwrap();

        let mut status = engine.status().await.unwrap();
        for _ in 0..200 {
            if status.samples_processed > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = engine.status().await.unwrap();
        }
        assert_eq!(status.safety_trips, 1);
        assert_eq!(harness.actuator.commands().len(), 7);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_stored_config_falls_back_to_defaults() {
        let harness = TestHarness::new();
        let stored = AutomationConfig { manual_pause_minutes: u64::MAX, ..AutomationConfig::default() };
        let deps = EngineDeps {
            actuator: harness.actuator.clone(),
            alerts: harness.alerts.clone(),
            rules: Arc::new(MemoryRuleStore::new(Vec::new())),
            configs: Arc::new(MemoryConfigStore::with_automation(stored)),
            clock: Arc::new(ManualClock::new(datetime!(2024-05-01 12:00 UTC))),
            events: harness.events.clone(),
        };
        let settings = Engine { autostart: false, ..Engine::default() };
        let engine = AutomationEngine::launch(deps, &settings, &Actuators::default()).await;

        assert_eq!(engine.automation_config().await, AutomationConfig::default());
    }
}
