//! Persisted refresh token rows and their lifecycle states.

// self
use crate::{
	_prelude::*,
	auth::{SubjectId, TokenId, token::secret::SecretDigest},
};

/// Lifecycle state of a refresh token row at a given instant.
///
/// Only [`RefreshTokenStatus::Active`] is a valid bearer state; every other state is
/// terminal. `Expired` is implied by the clock and never written to the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshTokenStatus {
	/// Token may be exchanged exactly once.
	Active,
	/// Token outlived its refresh TTL.
	Expired,
	/// Token was exchanged for a successor; presenting it again signals replay.
	Rotated,
	/// Token was revoked without a successor (logout or subject-wide revocation).
	LoggedOut,
}
impl RefreshTokenStatus {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Active => "active",
			Self::Expired => "expired",
			Self::Rotated => "rotated",
			Self::LoggedOut => "logged_out",
		}
	}
}

/// Persisted refresh token row.
///
/// The raw secret is never stored; rows are keyed by [`SecretDigest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
	/// Immutable row identifier.
	pub id: TokenId,
	/// Principal that owns the token.
	pub subject: SubjectId,
	/// Digest of the bearer secret.
	pub secret_digest: SecretDigest,
	/// Creation instant.
	pub issued_at: OffsetDateTime,
	/// `issued_at + refresh_ttl`, never changed after creation.
	pub expires_at: OffsetDateTime,
	/// Set exactly once when the token is rotated or logged out.
	pub revoked_at: Option<OffsetDateTime>,
	/// Successor created when this token was rotated.
	pub replaced_by: Option<TokenId>,
}
impl RefreshTokenRecord {
	/// Creates a fresh `Active` row.
	pub fn issue(
		subject: SubjectId,
		secret_digest: SecretDigest,
		issued_at: OffsetDateTime,
		ttl: Duration,
	) -> Self {
		Self {
			id: TokenId::generate(),
			subject,
			secret_digest,
			issued_at,
			expires_at: issued_at + ttl,
			revoked_at: None,
			replaced_by: None,
		}
	}

	/// Computes the lifecycle status at a given instant.
	///
	/// Expiry is checked first: once `expires_at` passes the row reads `Expired` whatever
	/// happened to it before.
	pub fn status_at(&self, instant: OffsetDateTime) -> RefreshTokenStatus {
		if self.is_expired_at(instant) {
			return RefreshTokenStatus::Expired;
		}

		match (self.revoked_at, &self.replaced_by) {
			(Some(_), Some(_)) => RefreshTokenStatus::Rotated,
			(Some(_), None) => RefreshTokenStatus::LoggedOut,
			(None, _) => RefreshTokenStatus::Active,
		}
	}

	/// Returns `true` if the row has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the row has been revoked for any reason.
	pub fn is_revoked(&self) -> bool {
		self.revoked_at.is_some()
	}

	/// Marks the row as rotated into `successor`. No-op unless the row is active at `instant`.
	pub fn rotate_into(&mut self, successor: TokenId, instant: OffsetDateTime) -> bool {
		if self.status_at(instant) != RefreshTokenStatus::Active {
			return false;
		}

		self.revoked_at = Some(instant);
		self.replaced_by = Some(successor);

		true
	}

	/// Marks the row as logged out. No-op unless the row is active at `instant`.
	///
	/// Expired rows are never written; expiry is a terminal state of its own.
	pub fn revoke(&mut self, instant: OffsetDateTime) -> bool {
		if self.status_at(instant) != RefreshTokenStatus::Active {
			return false;
		}

		self.revoked_at = Some(instant);

		true
	}
}
