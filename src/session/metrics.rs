// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::FlowKind;

/// Thread-safe counters for one session flow.
#[derive(Debug, Default)]
pub struct FlowCounters {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl FlowCounters {
	/// Returns the total number of attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of successful calls.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed calls.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_result<T, E>(&self, result: &Result<T, E>) {
		match result {
			Ok(_) => self.success.fetch_add(1, Ordering::Relaxed),
			Err(_) => self.failure.fetch_add(1, Ordering::Relaxed),
		};
	}
}

/// In-process counters for every flow the broker runs.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	exchange: FlowCounters,
	refresh: FlowCounters,
	logout: FlowCounters,
	authenticate: FlowCounters,
	reuse_detected: AtomicU64,
}
impl SessionMetrics {
	/// Returns the counters for `kind`.
	pub fn flow(&self, kind: FlowKind) -> &FlowCounters {
		match kind {
			FlowKind::Exchange => &self.exchange,
			FlowKind::Refresh => &self.refresh,
			FlowKind::Logout => &self.logout,
			FlowKind::Authenticate => &self.authenticate,
		}
	}

	/// Returns how many rotated refresh secrets were presented again.
	pub fn reuse_detected(&self) -> u64 {
		self.reuse_detected.load(Ordering::Relaxed)
	}

	pub(crate) fn record_reuse(&self) {
		self.reuse_detected.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn counters_are_kept_per_flow() {
		let metrics = SessionMetrics::default();

		metrics.flow(FlowKind::Refresh).record_attempt();
		metrics.flow(FlowKind::Refresh).record_result::<(), ()>(&Err(()));
		metrics.flow(FlowKind::Exchange).record_result::<(), ()>(&Ok(()));

		assert_eq!(metrics.flow(FlowKind::Refresh).attempts(), 1);
		assert_eq!(metrics.flow(FlowKind::Refresh).failures(), 1);
		assert_eq!(metrics.flow(FlowKind::Exchange).successes(), 1);
		assert_eq!(metrics.flow(FlowKind::Logout).attempts(), 0);
	}
}
