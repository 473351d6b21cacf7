//! Storage contract and built-in backends for refresh token rows.
//!
//! Rotation is the one operation with cross-caller atomicity requirements: the presented row
//! is conditionally revoked and its successor inserted as a single unit, so two callers
//! presenting the same secret can never both win. Backends express this with their own
//! isolation primitive (a write lock, a file snapshot swap, a database transaction) rather
//! than relying on callers to serialize.

pub mod file;
pub mod memory;
#[cfg(feature = "postgres")] pub mod postgres;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")] pub use postgres::PgStore;

// self
use crate::{
	_prelude::*,
	auth::{RefreshTokenRecord, RefreshTokenStatus, SecretDigest, SubjectId, TokenId},
};

/// Boxed future returned by every [`RefreshTokenStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for refresh token rows.
pub trait RefreshTokenStore
where
	Self: Send + Sync,
{
	/// Inserts a freshly issued row.
	fn insert(&self, record: RefreshTokenRecord) -> StoreFuture<'_, ()>;

	/// Looks up the row keyed by `digest`, if any.
	fn find<'a>(&'a self, digest: &'a SecretDigest) -> StoreFuture<'a, Option<RefreshTokenRecord>>;

	/// Atomically revokes the active row keyed by `presented` and inserts its successor.
	///
	/// The successor inherits the subject of the presented row. Nothing is written unless the
	/// outcome is [`RotateOutcome::Rotated`].
	fn rotate<'a>(
		&'a self,
		presented: &'a SecretDigest,
		successor: Successor,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RotateOutcome>;

	/// Revokes the row keyed by `digest` if it is still unrevoked.
	fn revoke<'a>(
		&'a self,
		digest: &'a SecretDigest,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RevokeOutcome>;

	/// Revokes every unrevoked row of `subject`; returns how many changed.
	fn revoke_subject<'a>(
		&'a self,
		subject: &'a SubjectId,
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize>;

	/// Deletes rows that expired before `now`; returns how many went.
	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Identity and lifetime of the row that replaces a rotated token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Successor {
	/// Row identifier for the successor.
	pub id: TokenId,
	/// Digest of the successor's secret.
	pub secret_digest: SecretDigest,
	/// Expiry of the successor.
	pub expires_at: OffsetDateTime,
}
impl Successor {
	/// Materializes the successor row for `subject`, issued at `now`.
	pub fn into_record(self, subject: SubjectId, now: OffsetDateTime) -> RefreshTokenRecord {
		RefreshTokenRecord {
			id: self.id,
			subject,
			secret_digest: self.secret_digest,
			issued_at: now,
			expires_at: self.expires_at,
			revoked_at: None,
			replaced_by: None,
		}
	}
}

/// Result of a [`RefreshTokenStore::rotate`] attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RotateOutcome {
	/// The presented row was active; it is now revoked and the successor exists.
	Rotated {
		/// Subject carried over to the successor.
		subject: SubjectId,
	},
	/// No row matches the presented digest.
	Missing,
	/// The presented row outlived its TTL.
	Expired,
	/// The presented row was already revoked.
	AlreadyRevoked {
		/// Successor recorded on the row, set when the row was rotated rather than logged out.
		replaced_by: Option<TokenId>,
		/// Subject of the row.
		subject: SubjectId,
	},
}
impl RotateOutcome {
	/// Classifies a row found under the presented digest by its [`RefreshTokenStatus`].
	///
	/// Returns `None` for an active row, which is the only one rotation may claim.
	pub fn classify(record: &RefreshTokenRecord, now: OffsetDateTime) -> Option<Self> {
		match record.status_at(now) {
			RefreshTokenStatus::Active => None,
			RefreshTokenStatus::Expired => Some(Self::Expired),
			RefreshTokenStatus::Rotated | RefreshTokenStatus::LoggedOut =>
				Some(Self::AlreadyRevoked {
					replaced_by: record.replaced_by.clone(),
					subject: record.subject.clone(),
				}),
		}
	}
}

/// Result of a [`RefreshTokenStore::revoke`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevokeOutcome {
	/// The row was active and is now revoked.
	Revoked,
	/// The row was already revoked; nothing changed.
	AlreadyRevoked,
	/// The row had already expired; nothing changed.
	Expired,
	/// No row matched.
	Missing,
}

/// Why a refresh credential was refused.
///
/// All four collapse to the same unauthorized response at the protocol boundary; the
/// distinction only reaches logs and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ThisError)]
pub enum RefreshFailure {
	/// No row matches the presented secret.
	#[error("Refresh token was not found.")]
	NotFound,
	/// The row outlived its TTL.
	#[error("Refresh token has expired.")]
	Expired,
	/// The row was logged out.
	#[error("Refresh token has been revoked.")]
	Revoked,
	/// The row was already rotated; the secret is being replayed.
	#[error("Refresh token was reused after rotation.")]
	ReusedAfterRotation,
}
impl RefreshFailure {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NotFound => "refresh_not_found",
			Self::Expired => "refresh_expired",
			Self::Revoked => "refresh_revoked",
			Self::ReusedAfterRotation => "refresh_reused_after_rotation",
		}
	}
}

/// Error type produced by [`RefreshTokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend could not be reached.
	#[error("Store unavailable: {message}.")]
	Unavailable {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn record() -> RefreshTokenRecord {
		RefreshTokenRecord::issue(
			SubjectId::new("u1").expect("Subject fixture should be valid."),
			SecretDigest::of("refresh"),
			macros::datetime!(2025-01-01 00:00 UTC),
			Duration::days(7),
		)
	}

	#[test]
	fn classify_checks_expiry_before_revocation() {
		let mut record = record();
		let during = macros::datetime!(2025-01-02 00:00 UTC);

		assert_eq!(RotateOutcome::classify(&record, during), None);

		let successor = TokenId::generate();

		record.rotate_into(successor.clone(), during);

		assert_eq!(
			RotateOutcome::classify(&record, during),
			Some(RotateOutcome::AlreadyRevoked {
				replaced_by: Some(successor),
				subject: record.subject.clone(),
			})
		);
		assert_eq!(
			RotateOutcome::classify(&record, macros::datetime!(2025-01-08 00:00 UTC)),
			Some(RotateOutcome::Expired)
		);

		let long_after = macros::datetime!(2025-01-09 00:00 UTC);

		assert_eq!(record.status_at(long_after), RefreshTokenStatus::Expired);
		assert_eq!(RotateOutcome::classify(&record, long_after), Some(RotateOutcome::Expired));
	}

	#[test]
	fn successor_inherits_subject_and_starts_active() {
		let subject = SubjectId::new("u1").expect("Subject fixture should be valid.");
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let successor = Successor {
			id: TokenId::generate(),
			secret_digest: SecretDigest::of("next"),
			expires_at: now + Duration::days(7),
		};
		let record = successor.clone().into_record(subject.clone(), now);

		assert_eq!(record.id, successor.id);
		assert_eq!(record.subject, subject);
		assert!(!record.is_revoked());
	}

	#[test]
	fn refresh_failure_labels_are_distinct() {
		let labels = [
			RefreshFailure::NotFound,
			RefreshFailure::Expired,
			RefreshFailure::Revoked,
			RefreshFailure::ReusedAfterRotation,
		]
		.map(RefreshFailure::as_str);

		for (idx, label) in labels.iter().enumerate() {
			assert!(!labels[idx + 1..].contains(label));
		}
	}
}
