//! Optional observability helpers for session flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_broker.flow` with the `flow` and
//!   `stage` fields, plus `warn`/`error` events for every rejected or failed flow.
//! - Enable `metrics` to increment `session_broker_flow_total` for every attempt/success/failure
//!   (labeled by `flow` + `outcome`), `session_broker_refresh_rejections_total` (labeled by
//!   `kind`), and `session_broker_rate_guard_reclaimed_total`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Session flows observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Identity assertion exchanged for a new session.
	Exchange,
	/// Refresh token rotation.
	Refresh,
	/// Refresh token revocation.
	Logout,
	/// Access token verification on a protected request.
	Authenticate,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Exchange => "exchange",
			FlowKind::Refresh => "refresh",
			FlowKind::Logout => "logout",
			FlowKind::Authenticate => "authenticate",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the terminal outcome of a flow and logs failures with their precise kind.
pub fn record_flow_result<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(err) => {
			record_flow_outcome(kind, FlowOutcome::Failure);

			if let Error::Refresh(failure) = err {
				record_refresh_rejection(*failure);
			}

			log_flow_failure(kind, err);
		},
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::RefreshFailure;

	#[test]
	fn flow_labels_are_stable() {
		assert_eq!(FlowKind::Exchange.to_string(), "exchange");
		assert_eq!(FlowKind::Authenticate.as_str(), "authenticate");
		assert_eq!(FlowOutcome::Failure.to_string(), "failure");
	}

	#[test]
	fn recording_results_never_panics_without_recorders() {
		record_flow_result(FlowKind::Refresh, &Ok::<_, Error>(()));
		record_flow_result::<()>(
			FlowKind::Refresh,
			&Err(Error::Refresh(RefreshFailure::ReusedAfterRotation)),
		);
	}
}
