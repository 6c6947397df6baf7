//! Retry/quarantine decision for failed fulfillment attempts.

use order_types::RetryDecision;

/// Classifies a failed attempt by how often its message has been received.
///
/// Quarantines once `receive_count` reaches `max_receive_count`; a
/// `receive_count` of 0 (a transport that does not report counts) retries.
pub fn decide(receive_count: u32, max_receive_count: u32) -> RetryDecision {
	if receive_count >= max_receive_count {
		RetryDecision::Quarantine
	} else {
		RetryDecision::Retry
	}
}

/// Retry budget for failed fulfillment attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	max_receive_count: u32,
}

impl RetryPolicy {
	pub fn new(max_receive_count: u32) -> Self {
		Self { max_receive_count }
	}

	pub fn max_receive_count(&self) -> u32 {
		self.max_receive_count
	}

	/// See [`decide`].
	pub fn decide(&self, receive_count: u32) -> RetryDecision {
		decide(receive_count, self.max_receive_count)
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(3)
	}
}
