#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("MQTT publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),

    #[error("Command could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Actuator channel closed")]
    ChannelClosed,

    #[error("Actuator rejected command: {0}")]
    Rejected(String),
}
