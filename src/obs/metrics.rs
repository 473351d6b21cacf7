// self
use crate::{
	obs::{FlowKind, FlowOutcome},
	store::RefreshFailure,
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"session_broker_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts a refused refresh credential by its precise failure kind.
pub fn record_refresh_rejection(failure: RefreshFailure) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("session_broker_refresh_rejections_total", "kind" => failure.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = failure;
	}
}

/// Counts rate guard entries dropped by the reclaimer.
pub fn record_reclaimed(count: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("session_broker_rate_guard_reclaimed_total")
			.increment(u64::try_from(count).unwrap_or(u64::MAX));
	}
	#[cfg(feature = "tracing")]
	{
		if count > 0 {
			tracing::debug!(count, "Reclaimed idle rate guard entries.");
		}
	}

	#[cfg(not(any(feature = "metrics", feature = "tracing")))]
	{
		let _ = count;
	}
}
