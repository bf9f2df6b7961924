/*!
Coordinator for one radar run: retry pending deliveries, detect, persist,
then notify
*/

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::radar::{
    catalog::{Catalog, CatalogClient},
    config::RadarConfig,
    delivery_queue::DeliveryQueue,
    detection_engine::{DetectionEngine, DetectionPath},
    entity::{CompanyPayload, Entity, PayloadFormat},
    error::RadarError,
    notifier::{DeliveryReport, Notifier, WebhookTransport},
    retry::RetryPolicy,
    state_manager::StateManager,
};
use crate::algolia::AlgoliaTransport;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Detect and persist, never deliver
    pub dry_run: bool,
    /// Rebuild the baseline from a full fetch, never deliver
    pub force_seed: bool,
    /// Skip the window query
    pub force_full: bool,
}

/// What happened to this run's notifications
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryStatus {
    /// Nothing new to deliver
    NothingToSend,
    /// Payloads that would have been sent
    DryRun(Vec<CompanyPayload>),
    /// No webhook configured
    NoSink,
    Delivered(DeliveryReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub path: DetectionPath,
    pub new_entities: Vec<Entity>,
    pub known_total: usize,
    /// Result of retrying deliveries queued by earlier runs
    pub drained: DeliveryReport,
    pub delivery: DeliveryStatus,
}

impl RunReport {
    /// Deliveries from this run (drain included) that are now queued for the next one
    pub fn still_failing(&self) -> usize {
        let fresh = match &self.delivery {
            DeliveryStatus::Delivered(report) => report.failed.len(),
            _ => 0,
        };
        self.drained.failed.len() + fresh
    }
}

pub struct Radar {
    engine: DetectionEngine,
    state: StateManager,
    queue: DeliveryQueue,
    notifier: Option<Notifier>,
    format: PayloadFormat,
}

impl Radar {
    pub fn new(
        engine: DetectionEngine,
        state: StateManager,
        queue: DeliveryQueue,
        notifier: Option<Notifier>,
    ) -> Self {
        Self {
            engine,
            state,
            queue,
            notifier,
            format: PayloadFormat::default(),
        }
    }

    /// Profile base URL and event name for payloads built without a sink
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Wire up the Algolia catalog and, if a URL is configured, the webhook
    pub fn from_config(config: &RadarConfig) -> Result<Self, RadarError> {
        let retry = RetryPolicy::from(config.retry);
        let transport = AlgoliaTransport::new(&config.catalog)?;
        let catalog: Box<dyn Catalog> = Box::new(CatalogClient::new(
            Box::new(transport),
            config.catalog.clone(),
            retry,
        ));

        let notifier = match config.webhook_url() {
            Some(url) => Some(Notifier::new(
                Box::new(WebhookTransport::new(url.to_string(), &config.delivery)?),
                retry,
                config.delivery.clone(),
                config.catalog.profile_base_url.clone(),
            )),
            None => None,
        };

        Ok(Self::new(
            DetectionEngine::new(catalog),
            StateManager::new(config.state.state_path()),
            DeliveryQueue::new(config.state.pending_path()),
            notifier,
        )
        .with_payload_format(PayloadFormat {
            profile_base_url: config.catalog.profile_base_url.clone(),
            event: config.delivery.event.clone(),
        }))
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunReport, RadarError> {
        // earlier obligations first, so a flaky sink cannot be outpaced by new discoveries
        let drained = match (&self.notifier, options.dry_run) {
            (Some(notifier), false) => self.queue.drain_pending(notifier).await?,
            _ => DeliveryReport::default(),
        };

        let detection = if options.force_seed {
            info!("Force re-seed requested");
            self.engine.seed().await?
        } else {
            let known = self.state.load()?;
            self.engine.detect_new(known.as_ref(), options.force_full).await?
        };

        // state moves forward before any delivery so a crash mid-delivery
        // cannot make the same companies look new again
        self.state
            .save(detection.known_ids.clone(), detection.current_count)?;

        let mut report = RunReport {
            path: detection.path,
            known_total: detection.known_ids.len(),
            new_entities: detection.new_entities,
            drained,
            delivery: DeliveryStatus::NothingToSend,
        };

        if report.new_entities.is_empty() {
            return Ok(report);
        }

        if options.dry_run {
            let detected_at = Utc::now();
            let payloads: Vec<CompanyPayload> = report
                .new_entities
                .iter()
                .map(|entity| self.format.build(entity, detected_at))
                .collect();
            for payload in &payloads {
                debug!(
                    "Payload: {}",
                    serde_json::to_string_pretty(payload).unwrap_or_default()
                );
            }
            report.delivery = DeliveryStatus::DryRun(payloads);
            return Ok(report);
        }

        let Some(notifier) = &self.notifier else {
            warn!("No WEBHOOK_URL configured - skipping webhook delivery");
            report.delivery = DeliveryStatus::NoSink;
            return Ok(report);
        };

        let delivered = notifier.deliver_all(&report.new_entities).await;

        // the queue is the union of what still fails from the drain and from this batch
        let mut pending = report.drained.failed.clone();
        pending.extend(delivered.failed.iter().cloned());
        self.queue.replace(&pending)?;

        report.delivery = DeliveryStatus::Delivered(delivered);
        Ok(report)
    }
}
