//! Main entry point for the order pipeline service.
//!
//! This binary accepts orders over HTTP, validates and stores them, and runs
//! the fulfillment worker loop against the work queue. Storage, queue and
//! fulfillment backends are pluggable and selected by configuration.

use clap::Parser;
use order_config::Config;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod factory_registry;
mod server;

use factory_registry::{build_engine_from_config, FactoryRegistry};

/// Command-line arguments for the order service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "ORDER_SERVICE_CONFIG", default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the order service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the engine from the registered implementations
/// 5. Runs the worker loop, and the API server when enabled, until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	// Create env filter with default from args
	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started order service");

	// Load configuration
	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	// Build engine with implementations
	let registry = FactoryRegistry::with_all_implementations();
	let engine = Arc::new(build_engine_from_config(&registry, config.clone()).await?);
	engine.initialize().await?;

	// Check if API server should be started
	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let api_engine = Arc::clone(&engine);

			// Start both the worker loop and the API server concurrently
			let engine_task = engine.run();
			let api_task = server::start_server(api_config, api_engine);

			tokio::select! {
				result = engine_task => {
					tracing::info!("Engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			// Run only the worker loop
			tracing::info!("Starting worker loop only");
			engine.run().await?;
		},
	}

	engine.shutdown().await?;
	tracing::info!("Stopped order service");
	Ok(())
}
