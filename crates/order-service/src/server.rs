//! HTTP server for the order API.
//!
//! Serves the order intake endpoint and the read endpoints under `/api`,
//! with CORS open to any origin. `Access-Control-Allow-Origin: *` is sent on
//! every response, including requests that carry no `Origin` header.

use axum::{
	body::Bytes,
	extract::{DefaultBodyLimit, Path, State},
	http::{
		header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
		HeaderValue, Method, StatusCode,
	},
	response::Json,
	routing::{get, post},
	Router,
};
use order_config::ApiConfig;
use order_core::OrderEngine;
use order_types::{APIError, ExecutionRecord, Order, QuarantinedOrder, SubmitOrderResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the engine processing orders.
	pub engine: Arc<OrderEngine>,
}

/// Builds the API router.
pub fn router(engine: Arc<OrderEngine>, api_config: &ApiConfig) -> Router {
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_headers([CONTENT_TYPE])
		.allow_methods([Method::POST, Method::OPTIONS, Method::GET]);

	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(handle_submit_order))
				.route("/orders/{id}", get(handle_get_order))
				.route("/orders/{id}/quarantine", get(handle_get_quarantine))
				.route("/executions/{reference}", get(handle_get_execution)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(SetResponseHeaderLayer::if_not_present(
					ACCESS_CONTROL_ALLOW_ORIGIN,
					HeaderValue::from_static("*"),
				))
				.layer(TimeoutLayer::new(Duration::from_secs(api_config.timeout_seconds)))
				.layer(cors)
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(AppState { engine })
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<OrderEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles POST /api/orders requests.
async fn handle_submit_order(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<(StatusCode, Json<SubmitOrderResponse>), APIError> {
	let response = crate::apis::order::submit_order(body, &state.engine).await?;
	Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Handles GET /api/orders/{id} requests.
async fn handle_get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Order>, APIError> {
	crate::apis::order::get_order_by_id(&id, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /api/orders/{id}/quarantine requests.
async fn handle_get_quarantine(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<QuarantinedOrder>, APIError> {
	crate::apis::order::get_quarantine_record(&id, &state.engine)
		.await
		.map(Json)
}

/// Handles GET /api/executions/{reference} requests.
async fn handle_get_execution(
	Path(reference): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<ExecutionRecord>, APIError> {
	crate::apis::order::get_execution(&reference, &state.engine)
		.await
		.map(Json)
}
