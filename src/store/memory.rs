//! Thread-safe in-memory [`RefreshTokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{RefreshTokenRecord, RefreshTokenStatus, SecretDigest, SubjectId},
	store::{
		RefreshTokenStore, RevokeOutcome, RotateOutcome, StoreError, StoreFuture, Successor,
	},
};

pub(crate) type RowMap = HashMap<SecretDigest, RefreshTokenRecord>;

type StoreMap = Arc<RwLock<RowMap>>;

/// Thread-safe storage backend that keeps rows in-process for tests and demos.
///
/// Rotation runs under a single write lock, which makes it atomic within one process only.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns a copy of every row, in no particular order.
	pub fn snapshot(&self) -> Vec<RefreshTokenRecord> {
		self.0.read().values().cloned().collect()
	}

	/// Counts rows that are neither revoked nor expired at `now`.
	pub fn active_count(&self, subject: &SubjectId, now: OffsetDateTime) -> usize {
		self.0
			.read()
			.values()
			.filter(|row| {
				&row.subject == subject && row.status_at(now) == RefreshTokenStatus::Active
			})
			.count()
	}
}
impl RefreshTokenStore for MemoryStore {
	fn insert(&self, record: RefreshTokenRecord) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { insert_row(&mut map.write(), record) })
	}

	fn find<'a>(&'a self, digest: &'a SecretDigest) -> StoreFuture<'a, Option<RefreshTokenRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(digest).cloned()) })
	}

	fn rotate<'a>(
		&'a self,
		presented: &'a SecretDigest,
		successor: Successor,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RotateOutcome> {
		let map = self.0.clone();

		Box::pin(async move { rotate_row(&mut map.write(), presented, successor, now) })
	}

	fn revoke<'a>(
		&'a self,
		digest: &'a SecretDigest,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RevokeOutcome> {
		let map = self.0.clone();

		Box::pin(async move { Ok(revoke_row(&mut map.write(), digest, now)) })
	}

	fn revoke_subject<'a>(
		&'a self,
		subject: &'a SubjectId,
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		let map = self.0.clone();

		Box::pin(async move { Ok(revoke_subject_rows(&mut map.write(), subject, now)) })
	}

	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		let map = self.0.clone();

		Box::pin(async move { Ok(purge_rows(&mut map.write(), now)) })
	}
}

pub(crate) fn insert_row(rows: &mut RowMap, record: RefreshTokenRecord) -> Result<(), StoreError> {
	if rows.contains_key(&record.secret_digest) {
		return Err(StoreError::Backend {
			message: format!("Duplicate refresh secret for token {}", record.id),
		});
	}

	rows.insert(record.secret_digest.clone(), record);

	Ok(())
}

pub(crate) fn rotate_row(
	rows: &mut RowMap,
	presented: &SecretDigest,
	successor: Successor,
	now: OffsetDateTime,
) -> Result<RotateOutcome, StoreError> {
	let Some(current) = rows.get(presented) else {
		return Ok(RotateOutcome::Missing);
	};

	if let Some(rejected) = RotateOutcome::classify(current, now) {
		return Ok(rejected);
	}

	let subject = current.subject.clone();
	let next = successor.into_record(subject.clone(), now);

	// Validate the insert before touching the presented row so a failure leaves no trace.
	if rows.contains_key(&next.secret_digest) {
		return Err(StoreError::Backend {
			message: format!("Duplicate refresh secret for token {}", next.id),
		});
	}
	if let Some(current) = rows.get_mut(presented) {
		current.rotate_into(next.id.clone(), now);
	}

	rows.insert(next.secret_digest.clone(), next);

	Ok(RotateOutcome::Rotated { subject })
}

pub(crate) fn revoke_row(
	rows: &mut RowMap,
	digest: &SecretDigest,
	now: OffsetDateTime,
) -> RevokeOutcome {
	let Some(record) = rows.get_mut(digest) else {
		return RevokeOutcome::Missing;
	};

	match record.status_at(now) {
		RefreshTokenStatus::Active => {
			record.revoke(now);

			RevokeOutcome::Revoked
		},
		RefreshTokenStatus::Expired => RevokeOutcome::Expired,
		RefreshTokenStatus::Rotated | RefreshTokenStatus::LoggedOut =>
			RevokeOutcome::AlreadyRevoked,
	}
}

pub(crate) fn revoke_subject_rows(
	rows: &mut RowMap,
	subject: &SubjectId,
	now: OffsetDateTime,
) -> usize {
	let mut revoked = 0;

	for row in rows.values_mut().filter(|row| &row.subject == subject) {
		if row.revoke(now) {
			revoked += 1;
		}
	}

	revoked
}

pub(crate) fn purge_rows(rows: &mut RowMap, now: OffsetDateTime) -> usize {
	let before = rows.len();

	rows.retain(|_, row| !row.is_expired_at(now));

	before - rows.len()
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::TokenId;

	fn successor(secret: &str, now: OffsetDateTime) -> Successor {
		Successor {
			id: TokenId::generate(),
			secret_digest: SecretDigest::of(secret),
			expires_at: now + Duration::days(7),
		}
	}

	#[test]
	fn failed_rotation_writes_nothing() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let subject = SubjectId::new("u1").expect("Subject fixture should be valid.");
		let mut rows = RowMap::new();

		insert_row(
			&mut rows,
			RefreshTokenRecord::issue(subject.clone(), SecretDigest::of("a"), now, Duration::days(7)),
		)
		.expect("First insert should succeed.");
		insert_row(
			&mut rows,
			RefreshTokenRecord::issue(subject, SecretDigest::of("b"), now, Duration::days(7)),
		)
		.expect("Second insert should succeed.");

		let err = rotate_row(&mut rows, &SecretDigest::of("a"), successor("b", now), now)
			.expect_err("Colliding successor secrets must be refused.");

		assert!(matches!(err, StoreError::Backend { .. }));
		assert!(rows.values().all(|row| !row.is_revoked()), "Presented row must stay active.");
		assert_eq!(rows.len(), 2);
	}

	#[test]
	fn purge_drops_only_expired_rows() {
		let now = macros::datetime!(2025-01-10 00:00 UTC);
		let subject = SubjectId::new("u1").expect("Subject fixture should be valid.");
		let mut rows = RowMap::new();

		for (secret, issued) in [
			("old", macros::datetime!(2025-01-01 00:00 UTC)),
			("new", macros::datetime!(2025-01-09 00:00 UTC)),
		] {
			insert_row(
				&mut rows,
				RefreshTokenRecord::issue(
					subject.clone(),
					SecretDigest::of(secret),
					issued,
					Duration::days(7),
				),
			)
			.expect("Fixture insert should succeed.");
		}

		assert_eq!(purge_rows(&mut rows, now), 1);
		assert!(rows.contains_key(&SecretDigest::of("new")));
	}

	#[test]
	fn expired_rows_are_left_untouched_by_revocation() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let after_expiry = macros::datetime!(2025-01-09 00:00 UTC);
		let subject = SubjectId::new("u1").expect("Subject fixture should be valid.");
		let mut rows = RowMap::new();

		insert_row(
			&mut rows,
			RefreshTokenRecord::issue(
				subject.clone(),
				SecretDigest::of("a"),
				issued,
				Duration::days(7),
			),
		)
		.expect("Fixture insert should succeed.");

		assert_eq!(
			revoke_row(&mut rows, &SecretDigest::of("a"), after_expiry),
			RevokeOutcome::Expired
		);
		assert_eq!(revoke_subject_rows(&mut rows, &subject, after_expiry), 0);
		assert_eq!(rows[&SecretDigest::of("a")].revoked_at, None);
	}
}
