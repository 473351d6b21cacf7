//! Per-client fixed-window request guard for the issuance endpoints.
//!
//! Each [`ClientKey`] owns a counter that resets once its window has elapsed. This is a
//! fixed window, not a sliding one: a client may land `limit` requests at the end of one
//! window and `limit` more at the start of the next, so bursts of up to `2 × limit` are
//! possible across a boundary. That approximation is accepted.
//!
//! Every read-modify-write of the counter map, including the periodic reclamation of idle
//! entries, happens under one exclusive lock.

// std
use std::net::{IpAddr, SocketAddr};
// crates.io
use tokio::{task::JoinHandle, time as tokio_time};
// self
use crate::{_prelude::*, config::RateGuardConfig};

/// Client identity derived from the network origin of a request.
///
/// This is not an authentication identity; it only partitions request budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientKey(IpAddr);
impl ClientKey {
	/// Derives the key from a connected peer address.
	pub fn from_peer(peer: SocketAddr) -> Self {
		Self(peer.ip())
	}

	/// Parses a textual peer address (`ip:port` or bare `ip`).
	///
	/// Callers must fail closed when this returns `None`.
	pub fn parse(peer: &str) -> Option<Self> {
		peer.parse::<SocketAddr>()
			.map(Self::from_peer)
			.or_else(|_| peer.parse::<IpAddr>().map(Self))
			.ok()
	}

	/// Returns the underlying address.
	pub fn ip(&self) -> IpAddr {
		self.0
	}
}
impl Display for ClientKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.0, f)
	}
}

/// Result emitted by [`RateGuard::admit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateDecision {
	/// The request may proceed immediately.
	Allow,
	/// The request exceeded the budget for the current window.
	Reject(RetryDirective),
}
impl RateDecision {
	/// Returns `true` for [`RateDecision::Allow`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

/// Advises callers when to retry after a [`RateDecision::Reject`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when the client's window resets.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff }
	}

	/// Whole seconds to advertise in a `Retry-After` header (at least one).
	pub fn retry_after_secs(&self) -> i64 {
		let secs = self.recommended_backoff.whole_seconds();
		let rounded =
			if self.recommended_backoff.subsec_nanoseconds() > 0 { secs + 1 } else { secs };

		rounded.max(1)
	}
}

#[derive(Clone, Copy, Debug)]
struct ClientWindow {
	request_count: u32,
	window_start: OffsetDateTime,
	last_seen: OffsetDateTime,
}

/// Fixed-window request counter keyed by client.
#[derive(Debug)]
pub struct RateGuard {
	config: RateGuardConfig,
	clients: Mutex<HashMap<ClientKey, ClientWindow>>,
}
impl RateGuard {
	/// Creates an empty guard.
	pub fn new(config: RateGuardConfig) -> Self {
		Self { config, clients: Mutex::new(HashMap::new()) }
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &RateGuardConfig {
		&self.config
	}

	/// Counts a request from `key` against the current clock.
	pub fn admit(&self, key: ClientKey) -> RateDecision {
		self.admit_at(key, OffsetDateTime::now_utc())
	}

	/// Counts a request from `key` observed at `now`.
	pub fn admit_at(&self, key: ClientKey, now: OffsetDateTime) -> RateDecision {
		let mut clients = self.clients.lock();
		let entry = clients.entry(key).or_insert(ClientWindow {
			request_count: 0,
			window_start: now,
			last_seen: now,
		});

		if now - entry.window_start > self.config.window {
			entry.request_count = 0;
			entry.window_start = now;
		}

		entry.request_count = entry.request_count.saturating_add(1);
		entry.last_seen = now;

		if entry.request_count <= self.config.limit {
			return RateDecision::Allow;
		}

		let reset_at = entry.window_start + self.config.window;

		RateDecision::Reject(RetryDirective::new(reset_at, reset_at - now))
	}

	/// Drops clients whose last request is older than one window; returns how many went.
	pub fn reclaim_at(&self, now: OffsetDateTime) -> usize {
		let mut clients = self.clients.lock();
		let before = clients.len();

		clients.retain(|_, window| now - window.last_seen <= self.config.window);

		before - clients.len()
	}

	/// Number of tracked clients.
	pub fn tracked_clients(&self) -> usize {
		self.clients.lock().len()
	}

	/// Spawns the periodic reclaimer on the current Tokio runtime.
	///
	/// The task holds a weak reference and exits once the guard is dropped.
	pub fn spawn_reclaimer(self: &Arc<Self>) -> JoinHandle<()> {
		let weak = Arc::downgrade(self);
		let period = std::time::Duration::try_from(self.config.reclaim_interval)
			.unwrap_or(std::time::Duration::from_secs(60));

		tokio::spawn(async move {
			let mut ticker = tokio_time::interval(period);

			ticker.set_missed_tick_behavior(tokio_time::MissedTickBehavior::Delay);
			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(guard) = weak.upgrade() else { break };
				let reclaimed = guard.reclaim_at(OffsetDateTime::now_utc());

				crate::obs::record_reclaimed(reclaimed);
			}
		})
	}
}
