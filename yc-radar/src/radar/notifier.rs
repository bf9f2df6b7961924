/*!
Webhook delivery: one payload per new company, retried with backoff
*/

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use crate::radar::{
    config::DeliveryConfig,
    entity::{CompanyPayload, Entity, PayloadFormat},
    error::{DeliveryError, RadarError, TransportError},
    retry::RetryPolicy,
};

/// Where notifications go. One attempt per call; [`Notifier`] retries.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, payload: &serde_json::Value) -> Result<(), TransportError>;
}

/// Posts JSON to a webhook URL; any non-2xx answer is a failure
pub struct WebhookTransport {
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(url: String, config: &DeliveryConfig) -> Result<Self, RadarError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RadarError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            url,
            auth_token: config.auth_token.clone(),
            client,
        })
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn name(&self) -> &'static str {
        "Webhook"
    }

    async fn send(&self, payload: &serde_json::Value) -> Result<(), TransportError> {
        let mut request = self.client.post(&self.url);

        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        info!("Webhook delivered successfully (HTTP {})", status.as_u16());
        Ok(())
    }
}

/// Outcome of delivering a batch
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeliveryReport {
    pub sent: usize,
    /// Raw records that still failed after retries, in input order
    pub failed: Vec<Entity>,
}

impl DeliveryReport {
    pub fn all_sent(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Notifier {
    transport: Box<dyn NotificationTransport>,
    retry: RetryPolicy,
    config: DeliveryConfig,
    format: PayloadFormat,
}

impl Notifier {
    pub fn new(
        transport: Box<dyn NotificationTransport>,
        retry: RetryPolicy,
        config: DeliveryConfig,
        profile_base_url: String,
    ) -> Self {
        let format = PayloadFormat {
            profile_base_url,
            event: config.event.clone(),
        };
        Self {
            transport,
            retry,
            config,
            format,
        }
    }

    /// Payload for one entity, stamped with the current time
    pub fn build_payload(&self, entity: &Entity) -> CompanyPayload {
        self.format.build(entity, Utc::now())
    }

    /// Deliver one entity, retrying transient failures
    pub async fn deliver(&self, entity: &Entity) -> Result<(), DeliveryError> {
        let payload = serde_json::to_value(self.build_payload(entity))?;
        let transport = &self.transport;
        let payload = &payload;
        let what = format!("{} delivery", transport.name());
        self.retry.run(&what, move || transport.send(payload)).await?;
        Ok(())
    }

    /// Deliver each entity in turn with a short pause in between
    pub async fn deliver_all(&self, entities: &[Entity]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for (i, entity) in entities.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.item_pause()).await;
            }
            let name = display_name(entity);
            match self.deliver(entity).await {
                Ok(()) => {
                    report.sent += 1;
                    info!("Sent webhook for {}", name);
                }
                Err(e) => {
                    error!("Failed to send webhook for {}: {}", name, e);
                    report.failed.push(entity.clone());
                }
            }
        }
        report
    }
}

fn display_name(entity: &Entity) -> &str {
    match entity.name() {
        "" => "Unknown",
        name => name,
    }
}
