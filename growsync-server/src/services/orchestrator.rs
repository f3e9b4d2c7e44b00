use std::sync::Arc;

use growsync_api::ValidationError;
use growsync_api::models::{
    ActuatorCommand, AutomationConfig, MAX_PAUSE_MINUTES, SensorSample, saturating_minutes,
};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::errors::EngineError;
use crate::services::{
    Clock, Dispatcher, LatestSample, LightScheduler, SafetyInterlock, SafetyViolation, VpdController, VpdTick,
    WateringPolicy,
};

pub enum OrchestratorMessage {
    /// A human acted directly; arm the pause window and forward the command
    ManualAction {
        command: Option<ActuatorCommand>,
        reply: oneshot::Sender<Result<OffsetDateTime, EngineError>>,
    },
    UpdateConfig(AutomationConfig),
    Status(oneshot::Sender<OrchestratorStatus>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorStatus {
    pub manual_override_until: Option<OffsetDateTime>,
    pub current_fan_speed: u8,
    pub last_vpd: Option<f64>,
    pub light_on: Option<bool>,
    pub safety_trips: u64,
    pub samples_processed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// The interlock fired; nothing else ran
    SafetyTrip(Vec<SafetyViolation>),
    /// Same sample as the previous one
    Duplicate,
    /// Inside the manual override window
    Paused { until: OffsetDateTime },
    /// Engine stopped; only the interlock ran
    Idle,
    Processed {
        light_on: Option<bool>,
        vpd: VpdTick,
        watered: Vec<String>,
    },
}

/// Per-sample policy pipeline. Owns every piece of controller state so the
/// only way in is a message.
pub struct Orchestrator {
    config: AutomationConfig,
    safety: SafetyInterlock,
    light: LightScheduler,
    vpd: VpdController,
    watering: WateringPolicy,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    latest: watch::Sender<Option<LatestSample>>,
    running: watch::Receiver<bool>,
    manual_override_until: Option<OffsetDateTime>,
    last_sample: Option<SensorSample>,
    safety_trips: u64,
    samples_processed: u64,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AutomationConfig,
        safety: SafetyInterlock,
        light: LightScheduler,
        vpd: VpdController,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        latest: watch::Sender<Option<LatestSample>>,
        running: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            safety,
            light,
            vpd,
            watering: WateringPolicy::new(),
            dispatcher,
            clock,
            latest,
            running,
            manual_override_until: None,
            last_sample: None,
            safety_trips: 0,
            samples_processed: 0,
        }
    }

    pub async fn process_sample(&mut self, sample: SensorSample) -> SampleOutcome {
        let now = self.clock.now();
        self.samples_processed += 1;

        let violations = self.safety.evaluate(&sample, &self.config.safety);
        if !violations.is_empty() {
            self.safety_trips += 1;
            self.light.invalidate();
            self.latest.send_replace(Some(LatestSample { sample: sample.clone(), safety_tripped: true }));
            self.last_sample = Some(sample);
            self.safety.trip(&violations, &self.dispatcher, now).await;
            return SampleOutcome::SafetyTrip(violations);
        }

        if self.last_sample.as_ref() == Some(&sample) {
            tracing::debug!("duplicate sample at {}", sample.timestamp);
            return SampleOutcome::Duplicate;
        }

        self.latest.send_replace(Some(LatestSample { sample: sample.clone(), safety_tripped: false }));
        self.last_sample = Some(sample.clone());

        if !*self.running.borrow() {
            return SampleOutcome::Idle;
        }

        if let Some(until) = self.manual_override_until.filter(|until| now < *until) {
            tracing::debug!("manual override active until {}", until);
            return SampleOutcome::Paused { until };
        }

        let light_on = self.light.tick(&self.config.light, now, &self.dispatcher).await;
        let vpd = self.vpd.tick(&sample, now, &self.dispatcher).await;
        let watered = self.watering.tick(&self.config.watering, &sample, now, &self.dispatcher).await;

        SampleOutcome::Processed { light_on, vpd, watered }
    }

    /// Arms the pause window, then forwards the human's own command. The
    /// forwarded command does not re-arm the window.
    pub async fn manual_action(&mut self, command: Option<ActuatorCommand>) -> Result<OffsetDateTime, EngineError> {
        let now = self.clock.now();
        let pause = saturating_minutes(self.config.manual_pause_minutes.min(MAX_PAUSE_MINUTES));
        let until = now
            .checked_add(pause)
            .ok_or_else(|| ValidationError::Config("manual pause runs past the supported calendar".into()))?;

        self.manual_override_until = Some(until);
        // the light may have been switched by hand
        self.light.invalidate();
        tracing::info!("manual override until {}", until);

        if let Some(command) = command {
            self.dispatcher.send(command).await?;
        }

        Ok(until)
    }

    pub fn update_config(&mut self, config: AutomationConfig) {
        if config.light != self.config.light {
            self.light.invalidate();
        }
        self.config = config;
    }

    pub fn status(&self) -> OrchestratorStatus {
        let vpd = self.vpd.config();
        OrchestratorStatus {
            manual_override_until: self.manual_override_until,
            current_fan_speed: vpd.current_fan_speed,
            last_vpd: vpd.last_vpd,
            light_on: self.light.state(),
            safety_trips: self.safety_trips,
            samples_processed: self.samples_processed,
        }
    }

    async fn handle_message(&mut self, message: OrchestratorMessage) {
        match message {
            OrchestratorMessage::ManualAction { command, reply } => {
                let result = self.manual_action(command).await;
                let _ = reply.send(result);
            }
            OrchestratorMessage::UpdateConfig(config) => self.update_config(config),
            OrchestratorMessage::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// Runs the actor until the stop signal fires or the sample source goes
    /// away. A sample being processed when stop fires is finished first.
    pub fn spawn(
        mut self,
        mut samples: mpsc::Receiver<SensorSample>,
        mut messages: mpsc::Receiver<OrchestratorMessage>,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                    Some(message) = messages.recv() => self.handle_message(message).await,
                    sample = samples.recv() => match sample {
                        Some(sample) => {
                            let outcome = self.process_sample(sample).await;
                            tracing::trace!("sample outcome {:?}", outcome);
                        }
                        None => {
                            tracing::info!("sample source closed");
                            break;
                        }
                    },
                }
            }

            tracing::info!("orchestrator stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use growsync_api::models::{Alert, Severity, VpdConfig};
    use time::Duration;
    use time::macros::datetime;

    use super::*;
    use crate::configs::Actuators;
    use crate::tests::{ManualClock, MemoryConfigStore, TestHarness};

    const START: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    struct Fixture {
        harness: TestHarness,
        clock: Arc<ManualClock>,
        latest: watch::Receiver<Option<LatestSample>>,
        running: watch::Sender<bool>,
        orchestrator: Orchestrator,
    }

    fn fixture() -> Fixture {
        let harness = TestHarness::new();
        let clock = Arc::new(ManualClock::new(START));
        let (latest_tx, latest) = watch::channel(None);
        let (running, running_rx) = watch::channel(true);
        let actuators = Actuators::default();

        let vpd = VpdController::new(
            VpdConfig::default(),
            actuators.vpd_fan.clone(),
            Arc::new(MemoryConfigStore::default()),
            StdDuration::from_secs(1),
        );
        let orchestrator = Orchestrator::new(
            AutomationConfig::default(),
            SafetyInterlock::new(&actuators),
            LightScheduler::new(actuators.light.clone(), 255),
            vpd,
            harness.dispatcher.clone(),
            clock.clone(),
            latest_tx,
            running_rx,
        );

        Fixture { harness, clock, latest, running, orchestrator }
    }

    fn sample(temp: f64, humidity: f64) -> SensorSample {
        let mut sample = SensorSample::new(START);
        sample.temp_bottom = Some(temp);
        sample.temp_middle = Some(temp);
        sample.temp_top = Some(temp);
        sample.humidity_bottom = Some(humidity);
        sample.humidity_middle = Some(humidity);
        sample.humidity_top = Some(humidity);
        sample.soil_moisture = vec![Some(55.0); 4];
        sample
    }

    #[tokio::test]
    async fn test_safety_trip_wins_over_manual_override() {
        let mut fixture = fixture();
        fixture.orchestrator.manual_action(None).await.unwrap();

        let mut hot = sample(25.0, 60.0);
        hot.temp_top = Some(42.0);
        let outcome = fixture.orchestrator.process_sample(hot).await;

        assert!(matches!(outcome, SampleOutcome::SafetyTrip(_)));
        let commands = fixture.harness.actuator.commands();
        assert_eq!(commands.len(), 7);
        assert!(commands.iter().all(|c| matches!(c, ActuatorCommand::SetRelay { state: false, .. })));

        let alerts: Vec<Alert> = fixture.harness.alerts.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(fixture.latest.borrow().as_ref().is_some_and(|latest| latest.safety_tripped));
        assert_eq!(fixture.orchestrator.status().safety_trips, 1);
    }

    #[tokio::test]
    async fn test_oversized_pause_keeps_interlock_alive() {
        let mut fixture = fixture();
        fixture.orchestrator.update_config(AutomationConfig {
            manual_pause_minutes: u64::MAX,
            ..AutomationConfig::default()
        });

        let until = fixture.orchestrator.manual_action(None).await.unwrap();
        assert_eq!(until, START + Duration::minutes(MAX_PAUSE_MINUTES as i64));

        let mut hot = sample(25.0, 60.0);
        hot.temp_top = Some(60.0);
        let outcome = fixture.orchestrator.process_sample(hot).await;

        assert!(matches!(outcome, SampleOutcome::SafetyTrip(_)));
        assert_eq!(fixture.harness.actuator.commands().len(), 7);
    }

    #[tokio::test]
    async fn test_manual_override_pauses_policies() {
        let mut fixture = fixture();
        let until = fixture
            .orchestrator
            .manual_action(Some(ActuatorCommand::relay("humidifier", true)))
            .await
            .unwrap();

        assert_eq!(until, START + Duration::minutes(30));
        assert_eq!(fixture.harness.actuator.commands(), vec![ActuatorCommand::relay("humidifier", true)]);

        let outcome = fixture.orchestrator.process_sample(sample(25.0, 68.0)).await;
        assert_eq!(outcome, SampleOutcome::Paused { until });
        assert_eq!(fixture.harness.actuator.commands().len(), 1);
        // the rule scheduler still sees the sample
        assert!(fixture.latest.borrow().as_ref().is_some_and(|latest| !latest.safety_tripped));

        fixture.clock.advance(Duration::minutes(30));
        let mut later = sample(25.0, 68.0);
        later.timestamp = START + Duration::minutes(30);
        assert!(matches!(fixture.orchestrator.process_sample(later).await, SampleOutcome::Processed { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_sample_only_runs_interlock() {
        let mut fixture = fixture();

        let first = fixture.orchestrator.process_sample(sample(25.0, 68.0)).await;
        assert!(matches!(first, SampleOutcome::Processed { .. }));
        let sent = fixture.harness.actuator.commands().len();

        let second = fixture.orchestrator.process_sample(sample(25.0, 68.0)).await;
        assert_eq!(second, SampleOutcome::Duplicate);
        assert_eq!(fixture.harness.actuator.commands().len(), sent);
    }

    #[tokio::test]
    async fn test_stopped_engine_still_guards_safety() {
        let mut fixture = fixture();
        fixture.running.send_replace(false);

        assert_eq!(fixture.orchestrator.process_sample(sample(25.0, 68.0)).await, SampleOutcome::Idle);
        assert!(fixture.harness.actuator.commands().is_empty());

        let mut hot = sample(25.0, 68.0);
        hot.gas = Some(1500.0);
        assert!(matches!(fixture.orchestrator.process_sample(hot).await, SampleOutcome::SafetyTrip(_)));
    }

    #[tokio::test]
    async fn test_actor_answers_status_and_stops() {
        let fixture = fixture();
        let (sample_tx, sample_rx) = mpsc::channel(4);
        let (message_tx, message_rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = fixture.orchestrator.spawn(sample_rx, message_rx, stop_rx);

        sample_tx.send(sample(25.0, 68.0)).await.unwrap();
        let (reply, response) = oneshot::channel();
        message_tx.send(OrchestratorMessage::Status(reply)).await.unwrap();
        let status = response.await.unwrap();
        assert!(status.samples_processed <= 1);

        stop_tx.send_replace(true);
        handle.await.unwrap();
    }
}
