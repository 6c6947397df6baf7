//! API types for the order intake HTTP API.
//!
//! This module defines the request and response types for the order
//! endpoints together with the structured error type the handlers return.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message returned with every accepted order.
pub const ORDER_ACCEPTED_MESSAGE: &str = "Order received and processing started";

/// Response for an accepted order submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitOrderResponse {
	/// Fixed acknowledgement text.
	pub message: String,
	/// Identifier assigned to the order.
	pub order_id: String,
	/// Reference of the orchestration run processing the order.
	pub execution_reference: String,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Human-readable description
	pub error: String,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request (400)
	BadRequest { message: String },
	/// Requested resource does not exist (404)
	NotFound { message: String },
	/// Internal failure; the message is generic and never carries details (500)
	InternalServerError { message: String },
}

impl APIError {
	/// Generic 500 error without internal details.
	pub fn internal() -> Self {
		APIError::InternalServerError {
			message: "Internal server error".to_string(),
		}
	}

	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let message = match self {
			APIError::BadRequest { message }
			| APIError::NotFound { message }
			| APIError::InternalServerError { message } => message.clone(),
		};
		ErrorResponse { error: message }
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message } => write!(f, "Not Found: {}", message),
			APIError::InternalServerError { message } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = match self.status_code() {
			400 => StatusCode::BAD_REQUEST,
			404 => StatusCode::NOT_FOUND,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		};

		(status, Json(self.to_error_response())).into_response()
	}
}
