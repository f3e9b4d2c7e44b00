use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use growsync_api::models::{EngineStatus, Rule, SensorSample};
use growsync_server::app::create_router;
use growsync_server::configs::{Actuators, Database, Engine, SchemaManager, Storage};
use growsync_server::repositories::{ConfigRepository, RuleRepository};
use growsync_server::services::{AutomationEngine, EngineDeps};
use growsync_server::tests::{ManualClock, TestHarness};
use time::OffsetDateTime;
use time::macros::datetime;

pub const START: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

pub struct MockApp {
    pub storage: Arc<Storage>,
    pub rule_repository: Arc<RuleRepository>,
    pub config_repository: Arc<ConfigRepository>,
    pub harness: TestHarness,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<AutomationEngine>,
    pub router: Router,
}

impl MockApp {
    pub async fn new() -> Self {
        Self::with_engine(Engine { autostart: false, ..Engine::default() }).await
    }

    pub async fn with_engine(engine: Engine) -> Self {
        let storage = Arc::new(Storage::new(Database {
            clean_start: true,
            url: String::from("sqlite::memory:"),
        }, SchemaManager::default()).await.unwrap());

        let rule_repository = Arc::new(RuleRepository::new(storage.clone()));
        let config_repository = Arc::new(ConfigRepository::new(storage.clone()));
        let harness = TestHarness::new();
        let clock = Arc::new(ManualClock::new(START));

        let automation_engine = AutomationEngine::launch(
            EngineDeps {
                actuator: harness.actuator.clone(),
                alerts: harness.alerts.clone(),
                rules: rule_repository.clone(),
                configs: config_repository.clone(),
                clock: clock.clone(),
                events: harness.events.clone(),
            },
            &engine,
            &Actuators::default(),
        )
        .await;

        let router = create_router(automation_engine.clone(), harness.events.clone());

        Self {
            storage,
            rule_repository,
            config_repository,
            harness,
            clock,
            engine: automation_engine,
            router,
        }
    }

    pub async fn create_test_rule(&self, rule: Rule) -> Rule {
        let id = self.rule_repository.create(&rule).await.unwrap();

        self.rule_repository.find_by_id(id).await.unwrap().unwrap()
    }

    pub async fn status(&self) -> EngineStatus {
        self.engine.status().await.unwrap()
    }

    /// Submits a sample and waits until the orchestrator has handled it.
    pub async fn process_sample(&self, sample: SensorSample) {
        let before = self.status().await.samples_processed;
        self.engine.submit_sample(sample).await.unwrap();

        for _ in 0..200 {
            if self.status().await.samples_processed > before {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        panic!("sample was not processed");
    }
}

pub fn zoned_sample(temps: [f64; 3], humidities: [f64; 3]) -> SensorSample {
    let mut sample = SensorSample::new(START);
    sample.temp_bottom = Some(temps[0]);
    sample.temp_middle = Some(temps[1]);
    sample.temp_top = Some(temps[2]);
    sample.humidity_bottom = Some(humidities[0]);
    sample.humidity_middle = Some(humidities[1]);
    sample.humidity_top = Some(humidities[2]);
    sample.gas = Some(100.0);
    sample
}
