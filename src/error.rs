//! Crate-level error types shared across the guard, codec, stores, and session flows.

// self
use crate::{
	_prelude::*,
	codec::CodecError,
	guard::RetryDirective,
	provider::ProviderError,
	store::{RefreshFailure, StoreError},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
///
/// Variants keep every internal distinction (expired vs. revoked vs. reused refresh tokens,
/// signature vs. expiry failures) so logs and metrics can tell them apart. The HTTP boundary
/// collapses them through [`Error::class`].
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A dependency call exceeded its time budget.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Identity provider could not be reached or answered nonsense.
	#[error(transparent)]
	Provider(ProviderError),

	/// Identity provider rejected the presented assertion.
	#[error("Identity assertion was rejected: {reason}.")]
	InvalidAssertion {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Refresh credential failed validation.
	#[error(transparent)]
	Refresh(#[from] RefreshFailure),
	/// Access token failed verification.
	#[error(transparent)]
	AccessDenied(#[from] CodecError),
	/// Client exceeded its request budget.
	#[error("Request budget exhausted; retry after {}.", .0.earliest_retry_at)]
	RateLimited(RetryDirective),
	/// Request was syntactically unusable.
	#[error("Bad request: {reason}.")]
	BadRequest {
		/// Human-readable reason string.
		reason: String,
	},
	/// Request carried no refresh cookie or bearer token.
	#[error("Request carried no credential.")]
	MissingCredential,
	/// Client identity could not be derived from the request origin.
	#[error("Client key could not be derived from the request origin.")]
	ClientKeyUnavailable,
}
impl Error {
	/// Classifies the error into the coarse buckets exposed to clients.
	pub fn class(&self) -> ErrorClass {
		match self {
			Self::BadRequest { .. } => ErrorClass::Client,
			Self::InvalidAssertion { .. } | Self::Refresh(_) | Self::MissingCredential =>
				ErrorClass::Unauthorized,
			Self::AccessDenied(CodecError::Signing { .. }) => ErrorClass::Dependency,
			Self::AccessDenied(_) => ErrorClass::Unauthorized,
			Self::RateLimited(_) => ErrorClass::RateLimited,
			Self::Storage(_)
			| Self::Config(_)
			| Self::Transient(_)
			| Self::Provider(_)
			| Self::ClientKeyUnavailable => ErrorClass::Dependency,
		}
	}

	/// Stable label identifying the precise failure kind for logs and metrics.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Storage(_) => "storage",
			Self::Config(_) => "config",
			Self::Transient(_) => "timeout",
			Self::Provider(_) => "provider_unavailable",
			Self::InvalidAssertion { .. } => "invalid_assertion",
			Self::Refresh(failure) => failure.as_str(),
			Self::AccessDenied(err) => err.as_str(),
			Self::RateLimited(_) => "rate_limited",
			Self::BadRequest { .. } => "bad_request",
			Self::MissingCredential => "missing_credential",
			Self::ClientKeyUnavailable => "client_key_unavailable",
		}
	}
}
impl From<ProviderError> for Error {
	fn from(e: ProviderError) -> Self {
		match e {
			ProviderError::Rejected { reason } => Self::InvalidAssertion { reason },
			other => Self::Provider(other),
		}
	}
}

/// Coarse error buckets surfaced at the protocol boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
	/// Malformed request or missing credential.
	Client,
	/// Credential or assertion rejected.
	Unauthorized,
	/// Request budget exhausted.
	RateLimited,
	/// Store, provider, or local failure; never a security verdict.
	Dependency,
}

/// Configuration and validation failures raised by builders.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// A lifetime or timeout must be strictly positive.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Offending field.
		field: &'static str,
	},
	/// Leeway cannot be negative.
	#[error("Clock leeway cannot be negative.")]
	NegativeLeeway,
	/// Rate guard limit must admit at least one request.
	#[error("Rate guard limit must be at least 1.")]
	ZeroLimit,
	/// Signing secret is too short to be safe.
	#[error("Signing key must be at least {min} bytes, got {actual}.")]
	WeakSigningKey {
		/// Minimum accepted length.
		min: usize,
		/// Supplied length.
		actual: usize,
	},
	/// Cookie name or path contains characters that cannot appear in a `Set-Cookie` header.
	#[error("Cookie {field} is invalid: {value}.")]
	InvalidCookie {
		/// Which attribute failed validation.
		field: &'static str,
		/// Supplied value.
		value: String,
	},
	/// Identity provider endpoint must use HTTPS.
	#[error("Identity provider endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed: {message}.")]
	HttpClientBuild {
		/// Transport builder failure.
		message: String,
	},
}

/// Temporary failure variants; callers may retry at the protocol level.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TransientError {
	/// A store or provider call did not complete within its budget.
	#[error("The {operation} call timed out after {after}.")]
	DependencyTimeout {
		/// Dependency operation label.
		operation: &'static str,
		/// Budget that elapsed.
		after: Duration,
	},
}
