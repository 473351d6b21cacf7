//! PostgreSQL-backed [`RefreshTokenStore`] for multi-process deployments.
//!
//! Rotation runs as one transaction: a conditional `UPDATE` that only matches an active row,
//! followed by the successor `INSERT`. Row-level locking makes concurrent presenters of the
//! same secret serialize on the `UPDATE`; exactly one of them sees a returned row.

// crates.io
use sqlx::{FromRow, PgPool};
// self
use crate::{
	_prelude::*,
	auth::{RefreshTokenRecord, RefreshTokenStatus, SecretDigest, SubjectId, TokenId},
	store::{
		RefreshTokenStore, RevokeOutcome, RotateOutcome, StoreError, StoreFuture, Successor,
	},
};

/// Schema applied by [`PgStore::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS refresh_tokens (
	id            TEXT PRIMARY KEY,
	subject       TEXT NOT NULL,
	secret_digest TEXT NOT NULL UNIQUE,
	issued_at     TIMESTAMPTZ NOT NULL,
	expires_at    TIMESTAMPTZ NOT NULL,
	revoked_at    TIMESTAMPTZ,
	replaced_by   TEXT
);
CREATE INDEX IF NOT EXISTS refresh_tokens_subject_idx ON refresh_tokens (subject);
"#;

const SELECT_BY_DIGEST: &str = "SELECT id, subject, secret_digest, issued_at, expires_at, \
	revoked_at, replaced_by FROM refresh_tokens WHERE secret_digest = $1";

/// Refresh token store over a shared [`PgPool`].
#[derive(Clone, Debug)]
pub struct PgStore {
	pool: PgPool,
}
impl PgStore {
	/// Wraps an existing pool.
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Creates the `refresh_tokens` table and its index when missing.
	pub async fn ensure_schema(&self) -> Result<(), StoreError> {
		sqlx::raw_sql(SCHEMA).execute(&self.pool).await.map_err(map_sqlx_error)?;

		Ok(())
	}
}
impl RefreshTokenStore for PgStore {
	fn insert(&self, record: RefreshTokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			sqlx::query(
				"INSERT INTO refresh_tokens \
				 (id, subject, secret_digest, issued_at, expires_at, revoked_at, replaced_by) \
				 VALUES ($1, $2, $3, $4, $5, $6, $7)",
			)
			.bind(record.id.as_ref())
			.bind(record.subject.as_ref())
			.bind(record.secret_digest.as_str())
			.bind(record.issued_at)
			.bind(record.expires_at)
			.bind(record.revoked_at)
			.bind(record.replaced_by.as_deref())
			.execute(&self.pool)
			.await
			.map_err(map_sqlx_error)?;

			Ok(())
		})
	}

	fn find<'a>(&'a self, digest: &'a SecretDigest) -> StoreFuture<'a, Option<RefreshTokenRecord>> {
		Box::pin(async move {
			let row = sqlx::query_as::<_, TokenRow>(SELECT_BY_DIGEST)
				.bind(digest.as_str())
				.fetch_optional(&self.pool)
				.await
				.map_err(map_sqlx_error)?;

			row.map(TokenRow::into_record).transpose()
		})
	}

	fn rotate<'a>(
		&'a self,
		presented: &'a SecretDigest,
		successor: Successor,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RotateOutcome> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
			let claimed: Option<String> = sqlx::query_scalar(
				"UPDATE refresh_tokens SET revoked_at = $2, replaced_by = $3 \
				 WHERE secret_digest = $1 AND revoked_at IS NULL AND expires_at > $2 \
				 RETURNING subject",
			)
			.bind(presented.as_str())
			.bind(now)
			.bind(successor.id.as_ref())
			.fetch_optional(&mut *tx)
			.await
			.map_err(map_sqlx_error)?;

			if let Some(subject) = claimed {
				let subject = SubjectId::new(&subject).map_err(|e| StoreError::Serialization {
					message: format!("Stored subject is invalid: {e}"),
				})?;

				sqlx::query(
					"INSERT INTO refresh_tokens \
					 (id, subject, secret_digest, issued_at, expires_at, revoked_at, replaced_by) \
					 VALUES ($1, $2, $3, $4, $5, NULL, NULL)",
				)
				.bind(successor.id.as_ref())
				.bind(subject.as_ref())
				.bind(successor.secret_digest.as_str())
				.bind(now)
				.bind(successor.expires_at)
				.execute(&mut *tx)
				.await
				.map_err(map_sqlx_error)?;
				tx.commit().await.map_err(map_sqlx_error)?;

				return Ok(RotateOutcome::Rotated { subject });
			}

			let row = sqlx::query_as::<_, TokenRow>(SELECT_BY_DIGEST)
				.bind(presented.as_str())
				.fetch_optional(&mut *tx)
				.await
				.map_err(map_sqlx_error)?;

			tx.rollback().await.map_err(map_sqlx_error)?;

			let Some(record) = row.map(TokenRow::into_record).transpose()? else {
				return Ok(RotateOutcome::Missing);
			};

			RotateOutcome::classify(&record, now).ok_or_else(|| StoreError::Backend {
				message: format!("Token {} is active but could not be claimed", record.id),
			})
		})
	}

	fn revoke<'a>(
		&'a self,
		digest: &'a SecretDigest,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RevokeOutcome> {
		Box::pin(async move {
			let updated = sqlx::query(
				"UPDATE refresh_tokens SET revoked_at = $2 \
				 WHERE secret_digest = $1 AND revoked_at IS NULL AND expires_at > $2",
			)
			.bind(digest.as_str())
			.bind(now)
			.execute(&self.pool)
			.await
			.map_err(map_sqlx_error)?
			.rows_affected();

			if updated > 0 {
				return Ok(RevokeOutcome::Revoked);
			}

			let row = sqlx::query_as::<_, TokenRow>(SELECT_BY_DIGEST)
				.bind(digest.as_str())
				.fetch_optional(&self.pool)
				.await
				.map_err(map_sqlx_error)?;
			let Some(record) = row.map(TokenRow::into_record).transpose()? else {
				return Ok(RevokeOutcome::Missing);
			};

			Ok(match record.status_at(now) {
				RefreshTokenStatus::Expired => RevokeOutcome::Expired,
				_ => RevokeOutcome::AlreadyRevoked,
			})
		})
	}

	fn revoke_subject<'a>(
		&'a self,
		subject: &'a SubjectId,
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move {
			let updated = sqlx::query(
				"UPDATE refresh_tokens SET revoked_at = $2 \
				 WHERE subject = $1 AND revoked_at IS NULL AND expires_at > $2",
			)
			.bind(subject.as_ref())
			.bind(now)
			.execute(&self.pool)
			.await
			.map_err(map_sqlx_error)?
			.rows_affected();

			Ok(usize::try_from(updated).unwrap_or(usize::MAX))
		})
	}

	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move {
			let deleted = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
				.bind(now)
				.execute(&self.pool)
				.await
				.map_err(map_sqlx_error)?
				.rows_affected();

			Ok(usize::try_from(deleted).unwrap_or(usize::MAX))
		})
	}
}

#[derive(FromRow)]
struct TokenRow {
	id: String,
	subject: String,
	secret_digest: String,
	issued_at: OffsetDateTime,
	expires_at: OffsetDateTime,
	revoked_at: Option<OffsetDateTime>,
	replaced_by: Option<String>,
}
impl TokenRow {
	fn into_record(self) -> Result<RefreshTokenRecord, StoreError> {
		let invalid = |e: crate::auth::IdentifierError| StoreError::Serialization {
			message: format!("Stored identifier is invalid: {e}"),
		};

		Ok(RefreshTokenRecord {
			id: TokenId::new(&self.id).map_err(invalid)?,
			subject: SubjectId::new(&self.subject).map_err(invalid)?,
			secret_digest: SecretDigest::from_encoded(self.secret_digest),
			issued_at: self.issued_at,
			expires_at: self.expires_at,
			revoked_at: self.revoked_at,
			replaced_by: self.replaced_by.map(TokenId::new).transpose().map_err(invalid)?,
		})
	}
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
	match e {
		sqlx::Error::PoolTimedOut
		| sqlx::Error::PoolClosed
		| sqlx::Error::Io(_)
		| sqlx::Error::Tls(_) => StoreError::Unavailable { message: e.to_string() },
		other => StoreError::Backend { message: other.to_string() },
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn pool_exhaustion_reads_as_unavailable() {
		assert!(matches!(
			map_sqlx_error(sqlx::Error::PoolTimedOut),
			StoreError::Unavailable { .. }
		));
		assert!(matches!(
			map_sqlx_error(sqlx::Error::RowNotFound),
			StoreError::Backend { .. }
		));
	}

	#[test]
	fn schema_keys_rows_by_digest() {
		assert!(SCHEMA.contains("secret_digest TEXT NOT NULL UNIQUE"));
	}
}
