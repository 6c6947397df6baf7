//! Lifecycle management for the order engine.
//!
//! Handles initialization and shutdown procedures for the engine.

use super::{EngineError, OrderEngine};

impl OrderEngine {
	/// Performs any initialization required before running
	pub async fn initialize(&self) -> Result<(), EngineError> {
		let stats = self
			.queue
			.stats()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		tracing::info!(
			service_id = %self.config.service.id,
			visible = stats.visible,
			in_flight = stats.in_flight,
			"Initializing order engine"
		);
		Ok(())
	}

	/// Performs cleanup operations
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down order engine");

		let stats = self
			.queue
			.stats()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		if stats.visible + stats.in_flight > 0 {
			tracing::warn!(
				visible = stats.visible,
				in_flight = stats.in_flight,
				"Unfinished deliveries remain on the queue"
			);
		}
		if stats.redriven > 0 {
			tracing::warn!(redriven = stats.redriven, "Queue holds redriven messages");
		}

		Ok(())
	}
}
