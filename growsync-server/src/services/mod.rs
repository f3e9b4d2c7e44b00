pub mod actuator_service;
pub mod alert_service;
pub mod dispatcher;
pub mod engine;
pub mod light_service;
pub mod orchestrator;
pub mod ports;
pub mod rules;
pub mod safety;
pub mod sensor_service;
pub mod vpd_service;
pub mod watering_service;

pub use actuator_service::{ChannelActuator, MqttActuator};
pub use alert_service::{AlertService, LogNotifier, WebhookNotifier};
pub use dispatcher::{Dispatcher, with_timeout};
pub use engine::{AutomationEngine, EngineDeps};
pub use light_service::{LightScheduler, light_should_be_on};
pub use orchestrator::{Orchestrator, OrchestratorMessage, OrchestratorStatus, SampleOutcome};
pub use ports::{ActuatorChannel, AlertSink, Clock, ConfigStore, Notifier, RuleStore, SystemClock};
pub use rules::{LatestSample, RuleScheduler, SchedulerLimits, SchedulerSummary};
pub use safety::{SafetyInterlock, SafetyViolation};
pub use sensor_service::SensorService;
pub use vpd_service::{VpdController, VpdSkip, VpdTick};
pub use watering_service::WateringPolicy;
