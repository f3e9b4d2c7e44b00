use std::time::Duration;

use growsync_api::models::SensorSample;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::configs::settings::Gateway;
use crate::services::MqttActuator;

/// MQTT link to the grow box: samples in on `{prefix}/sensors`, commands out
/// on `{prefix}/commands`.
pub struct SensorService {
    client: AsyncClient,
    event_loop: EventLoop,
    sensor_topic: String,
    command_topic: String,
}

impl SensorService {
    pub fn new(gateway: &Gateway) -> Self {
        let mut options = MqttOptions::new(&gateway.client_id, &gateway.host, gateway.port);
        options.set_keep_alive(Duration::from_secs(5));

        if let Some(auth) = &gateway.auth {
            options.set_credentials(&auth.username, &auth.password);
        }

        let (client, event_loop) = AsyncClient::new(options, 10);
        let prefix = gateway.topic_prefix.trim_end_matches('/');

        Self {
            client,
            event_loop,
            sensor_topic: format!("{prefix}/sensors"),
            command_topic: format!("{prefix}/commands"),
        }
    }

    pub fn actuator(&self) -> MqttActuator {
        MqttActuator::new(self.client.clone(), self.command_topic.clone())
    }

    /// Polls the connection forever, forwarding parsed samples. A full sample
    /// queue drops the newest sample rather than stalling the connection.
    pub fn spawn(self, samples: mpsc::Sender<SensorSample>) -> JoinHandle<()> {
        let Self { client, mut event_loop, sensor_topic, .. } = self;

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // clean sessions forget subscriptions on reconnect
                        if let Err(e) = client.try_subscribe(&sensor_topic, QoS::AtLeastOnce) {
                            tracing::error!("Failed to subscribe {}: {}", sensor_topic, e);
                        } else {
                            tracing::debug!("subscribe topic {}", sensor_topic);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == sensor_topic => {
                        match Self::handle_message(&publish.payload) {
                            Ok(sample) => match samples.try_send(sample) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => tracing::warn!("sample queue full, dropping sample"),
                                Err(TrySendError::Closed(_)) => {
                                    tracing::info!("sample consumer gone, stopping gateway");
                                    break;
                                }
                            },
                            Err(e) => tracing::warn!("Error handling message: {}", e),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }

    fn handle_message(payload: &[u8]) -> Result<SensorSample, serde_json::Error> {
        let sample = serde_json::from_slice::<SensorSample>(payload)?;
        tracing::debug!("Receive: {:?}", sample);
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_message() {
        let sample = SensorService::handle_message(
            br#"{"temp_top": 28.5, "humidity_top": 61, "soil_moisture": [42, null]}"#,
        )
        .unwrap();

        assert_eq!(sample.temp_top, Some(28.5));
        assert_eq!(sample.soil_moisture_slot(1), Some(42.0));
        assert_eq!(sample.soil_moisture_slot(2), None);

        assert!(SensorService::handle_message(b"not json").is_err());
    }
}
