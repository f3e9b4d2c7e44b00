use async_trait::async_trait;
use growsync_api::models::ActuatorCommand;
use rumqttc::{AsyncClient, QoS};
use tokio::sync::mpsc;

use crate::errors::ActuatorError;
use crate::services::ActuatorChannel;

/// Publishes commands as JSON on the gateway's command topic.
#[derive(Clone)]
pub struct MqttActuator {
    client: AsyncClient,
    topic: String,
}

impl MqttActuator {
    pub fn new(client: AsyncClient, topic: String) -> Self {
        Self { client, topic }
    }
}

#[async_trait]
impl ActuatorChannel for MqttActuator {
    async fn send(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        let payload = serde_json::to_vec(command)?;

        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .await?;

        Ok(())
    }
}

/// Hands commands to an in-process consumer. Used when no gateway is configured.
#[derive(Clone)]
pub struct ChannelActuator {
    sender: mpsc::Sender<ActuatorCommand>,
}

impl ChannelActuator {
    pub fn new(sender: mpsc::Sender<ActuatorCommand>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl ActuatorChannel for ChannelActuator {
    async fn send(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        self.sender
            .send(command.clone())
            .await
            .map_err(|_| ActuatorError::ChannelClosed)
    }
}
