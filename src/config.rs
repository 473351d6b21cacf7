//! Typed, validated configuration for the session broker, rate guard, and refresh cookie.
//!
//! Loading values from the environment or files is left to the embedding binary; these types
//! only guarantee that whatever was loaded is internally consistent.

// self
use crate::{_prelude::*, error::ConfigError};

/// Response to a refresh secret presented again after it was rotated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReusePolicy {
	/// Reject the request and record the signal.
	#[default]
	Reject,
	/// Reject the request and revoke every outstanding refresh token of the subject.
	RevokeSubject,
}

/// Lifetimes and dependency budgets for [`SessionBroker`](crate::session::SessionBroker).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
	/// Access token lifetime.
	pub access_ttl: Duration,
	/// Refresh token lifetime.
	pub refresh_ttl: Duration,
	/// Clock skew tolerated when checking access token expiry.
	pub leeway: Duration,
	/// Upper bound on every store and provider call.
	pub dependency_timeout: Duration,
	/// What to do when a rotated refresh secret is replayed.
	pub reuse_policy: ReusePolicy,
}
impl SessionConfig {
	/// Default access token lifetime.
	pub const DEFAULT_ACCESS_TTL: Duration = Duration::minutes(15);
	/// Default dependency timeout.
	pub const DEFAULT_DEPENDENCY_TIMEOUT: Duration = Duration::seconds(5);
	/// Default expiry leeway.
	pub const DEFAULT_LEEWAY: Duration = Duration::seconds(5);
	/// Default refresh token lifetime.
	pub const DEFAULT_REFRESH_TTL: Duration = Duration::days(7);

	/// Returns a builder seeded with the defaults.
	pub fn builder() -> SessionConfigBuilder {
		SessionConfigBuilder::default()
	}
}
impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			access_ttl: Self::DEFAULT_ACCESS_TTL,
			refresh_ttl: Self::DEFAULT_REFRESH_TTL,
			leeway: Self::DEFAULT_LEEWAY,
			dependency_timeout: Self::DEFAULT_DEPENDENCY_TIMEOUT,
			reuse_policy: ReusePolicy::default(),
		}
	}
}

/// Builder for [`SessionConfig`].
#[derive(Clone, Debug, Default)]
pub struct SessionConfigBuilder {
	config: SessionConfig,
}
impl SessionConfigBuilder {
	/// Overrides the access token lifetime.
	pub fn access_ttl(mut self, ttl: Duration) -> Self {
		self.config.access_ttl = ttl;

		self
	}

	/// Overrides the refresh token lifetime.
	pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
		self.config.refresh_ttl = ttl;

		self
	}

	/// Overrides the access token expiry leeway.
	pub fn leeway(mut self, leeway: Duration) -> Self {
		self.config.leeway = leeway;

		self
	}

	/// Overrides the per-call dependency timeout.
	pub fn dependency_timeout(mut self, timeout: Duration) -> Self {
		self.config.dependency_timeout = timeout;

		self
	}

	/// Overrides the reuse policy.
	pub fn reuse_policy(mut self, policy: ReusePolicy) -> Self {
		self.config.reuse_policy = policy;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<SessionConfig, ConfigError> {
		let config = self.config;

		ensure_positive("access_ttl", config.access_ttl)?;
		ensure_positive("refresh_ttl", config.refresh_ttl)?;
		ensure_positive("dependency_timeout", config.dependency_timeout)?;

		if config.leeway.is_negative() {
			return Err(ConfigError::NegativeLeeway);
		}

		Ok(config)
	}
}

/// Budget enforced by [`RateGuard`](crate::guard::RateGuard).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateGuardConfig {
	/// Requests admitted per client per window.
	pub limit: u32,
	/// Fixed window length.
	pub window: Duration,
	/// Cadence of the idle-entry reclaimer.
	pub reclaim_interval: Duration,
}
impl RateGuardConfig {
	/// Creates a validated configuration with the default reclaim cadence.
	pub fn new(limit: u32, window: Duration) -> Result<Self, ConfigError> {
		Self { limit, window, reclaim_interval: Duration::minutes(1) }.validated()
	}

	/// Overrides the reclaimer cadence.
	pub fn with_reclaim_interval(self, interval: Duration) -> Result<Self, ConfigError> {
		Self { reclaim_interval: interval, ..self }.validated()
	}

	fn validated(self) -> Result<Self, ConfigError> {
		if self.limit == 0 {
			return Err(ConfigError::ZeroLimit);
		}

		ensure_positive("window", self.window)?;
		ensure_positive("reclaim_interval", self.reclaim_interval)?;

		Ok(self)
	}
}
impl Default for RateGuardConfig {
	fn default() -> Self {
		Self { limit: 5, window: Duration::minutes(1), reclaim_interval: Duration::minutes(1) }
	}
}

/// Attributes of the cookie that carries the refresh credential.
///
/// The cookie is always `HttpOnly` and `SameSite=Lax`; only its name, path, and `Secure`
/// flag are configurable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookiePolicy {
	/// Cookie name.
	pub name: String,
	/// Path scope; the auth routes by default.
	pub path: String,
	/// Emit the `Secure` attribute.
	pub secure: bool,
}
impl CookiePolicy {
	/// Creates a validated policy.
	pub fn new(
		name: impl Into<String>,
		path: impl Into<String>,
		secure: bool,
	) -> Result<Self, ConfigError> {
		let name = name.into();
		let path = path.into();

		if name.is_empty() || !name.chars().all(is_cookie_name_char) {
			return Err(ConfigError::InvalidCookie { field: "name", value: name });
		}
		if !path.starts_with('/') || path.chars().any(|c| c == ';' || c.is_control()) {
			return Err(ConfigError::InvalidCookie { field: "path", value: path });
		}

		Ok(Self { name, path, secure })
	}

	/// Renders a `Set-Cookie` value delivering `value` for `max_age`.
	pub fn set_cookie(&self, value: &str, max_age: Duration) -> String {
		self.render(value, max_age.whole_seconds())
	}

	/// Renders a `Set-Cookie` value that makes the browser drop the credential.
	pub fn clear_cookie(&self) -> String {
		self.render("", -1)
	}

	fn render(&self, value: &str, max_age: i64) -> String {
		let mut cookie = format!(
			"{}={value}; Path={}; HttpOnly; SameSite=Lax; Max-Age={max_age}",
			self.name, self.path
		);

		if self.secure {
			cookie.push_str("; Secure");
		}

		cookie
	}
}
impl Default for CookiePolicy {
	fn default() -> Self {
		Self { name: "refresh_token".into(), path: "/auth".into(), secure: true }
	}
}

fn ensure_positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value.is_positive() { Ok(()) } else { Err(ConfigError::NonPositiveDuration { field }) }
}

fn is_cookie_name_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}
