/*!
YC Radar: watch the YC company directory and post newly listed companies to a webhook
*/

pub mod algolia;
pub mod radar;

pub use radar::{
    catalog::{Catalog, CatalogClient, CatalogTransport, QueryRequest, QueryResponse},
    config::RadarConfig,
    delivery_queue::DeliveryQueue,
    detection_engine::{Detection, DetectionEngine, DetectionPath},
    entity::{CompanyPayload, Entity, PayloadFormat},
    error::{DeliveryError, RadarError, StateError, TransportError},
    notifier::{DeliveryReport, NotificationTransport, Notifier, WebhookTransport},
    retry::RetryPolicy,
    state_manager::{KnownState, StateManager},
    tracker::{DeliveryStatus, Radar, RunOptions, RunReport},
};
