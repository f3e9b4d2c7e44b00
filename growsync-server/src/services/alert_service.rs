use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use growsync_api::models::{Alert, EngineEvent, Severity};
use tokio::sync::broadcast::Sender;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::configs::settings::Notifier as NotifierSettings;
use crate::services::{AlertSink, Notifier};

/// Bounded alert queue drained by a background worker, so raising an alert
/// never waits on the network.
pub struct AlertService {
    sender: mpsc::Sender<Alert>,
}

impl AlertService {
    pub fn spawn(
        capacity: usize,
        notifier: Arc<dyn Notifier>,
        events: Sender<EngineEvent>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Alert>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(alert) = receiver.recv().await {
                match alert.severity {
                    Severity::Critical => tracing::error!("{}: {}", alert.title, alert.message),
                    Severity::Warning => tracing::warn!("{}: {}", alert.title, alert.message),
                    Severity::Info => tracing::info!("{}: {}", alert.title, alert.message),
                }

                let _ = events.send(EngineEvent::Alert(alert.clone()));

                if let Err(e) = notifier.notify(&alert).await {
                    tracing::warn!("Failed to deliver alert `{}`: {}", alert.title, e);
                }
            }

            tracing::debug!("alert worker stopped");
        });

        (Arc::new(Self { sender }), worker)
    }
}

impl AlertSink for AlertService {
    fn send_alert(&self, alert: Alert) {
        match self.sender.try_send(alert) {
            Ok(()) => {}
            Err(TrySendError::Full(alert)) => {
                tracing::warn!("alert queue full, dropping `{}`", alert.title);
            }
            Err(TrySendError::Closed(alert)) => {
                tracing::warn!("alert worker gone, dropping `{}`", alert.title);
            }
        }
    }
}

/// Posts alerts as JSON to a webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(settings: &NotifierSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: settings.webhook_url.clone(),
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.client
            .post(&self.url)
            .timeout(self.timeout)
            .json(alert)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Notifier for installations without a delivery target.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!("no notifier configured for `{}`", alert.title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::OffsetDateTime;
    use tokio::sync::broadcast;

    use super::*;

    struct FailingNotifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, alert: &Alert) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.seen.lock().unwrap().push(alert.title.clone());
            Err("webhook down".into())
        }
    }

    #[tokio::test]
    async fn test_alerts_reach_events_even_when_delivery_fails() {
        let (events, mut receiver) = broadcast::channel(8);
        let notifier = Arc::new(FailingNotifier { seen: Mutex::new(Vec::new()) });
        let (service, worker) = AlertService::spawn(4, notifier.clone(), events);

        service.send_alert(Alert::new("safety", "too hot", Severity::Critical, OffsetDateTime::now_utc()));

        match receiver.recv().await.unwrap() {
            EngineEvent::Alert(alert) => assert_eq!(alert.title, "safety"),
            other => panic!("unexpected event {other:?}"),
        }

        drop(service);
        worker.await.unwrap();
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["safety".to_string()]);
    }
}
