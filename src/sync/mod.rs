//! Remote order fulfillment synchronization engine.

pub mod fulfillment;
pub mod guard;
pub mod orchestrator;
pub mod processor;
pub mod webhook;

pub use fulfillment::{FulfillmentEngine, FulfillmentOutcome};
pub use guard::SyncGuard;
pub use orchestrator::{CompletionOutcome, CompletionService};
pub use processor::{PassSummary, ProcessorConfig, TaskProcessor};
pub use webhook::{WebhookAck, WebhookEvent, WebhookIngestor};
