//! Handlers for the two halves of the pipeline.
//!
//! The ingest handler validates, stores and enqueues new orders; the
//! fulfillment handler processes deliveries from the fulfillment queue.

pub mod fulfillment;
pub mod ingest;

pub use fulfillment::{FulfillmentHandler, FulfillmentHandlerError};
pub use ingest::{IngestError, IngestHandler, IngestOutcome};
