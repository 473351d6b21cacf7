//! Simple file-backed [`RefreshTokenStore`] for single-process deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{RefreshTokenRecord, SecretDigest, SubjectId},
	store::{
		RefreshTokenStore, RevokeOutcome, RotateOutcome, StoreError, StoreFuture, Successor,
		memory::{self, RowMap},
	},
};

/// Persists rows to a JSON file after each mutation.
///
/// Every mutation is applied to a scratch copy, written to a temporary file, and renamed over
/// the snapshot while the write lock is held; the in-memory view only changes once the rename
/// succeeds. A rotation therefore lands on disk whole or not at all. Concurrent processes
/// sharing one file are not coordinated.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<RowMap>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<RowMap, StoreError> {
		if !path.exists() {
			return Ok(RowMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Unavailable {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(RowMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Unavailable {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let rows: Vec<RefreshTokenRecord> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(rows.into_iter().map(|row| (row.secret_digest.clone(), row)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, rows: &RowMap) -> Result<(), StoreError> {
		let snapshot: Vec<_> = rows.values().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	/// Applies `mutate` to a scratch copy and commits it only if it changed and persisted.
	fn commit<T>(
		&self,
		mutate: impl FnOnce(&mut RowMap) -> Result<(T, bool), StoreError>,
	) -> Result<T, StoreError> {
		let mut guard = self.inner.write();
		let mut scratch = guard.clone();
		let (value, changed) = mutate(&mut scratch)?;

		if changed {
			self.persist(&scratch)?;

			*guard = scratch;
		}

		Ok(value)
	}
}
impl RefreshTokenStore for FileStore {
	fn insert(&self, record: RefreshTokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.commit(|rows| memory::insert_row(rows, record).map(|()| ((), true)))
		})
	}

	fn find<'a>(&'a self, digest: &'a SecretDigest) -> StoreFuture<'a, Option<RefreshTokenRecord>> {
		Box::pin(async move { Ok(self.inner.read().get(digest).cloned()) })
	}

	fn rotate<'a>(
		&'a self,
		presented: &'a SecretDigest,
		successor: Successor,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RotateOutcome> {
		Box::pin(async move {
			self.commit(|rows| {
				let outcome = memory::rotate_row(rows, presented, successor, now)?;
				let changed = matches!(outcome, RotateOutcome::Rotated { .. });

				Ok((outcome, changed))
			})
		})
	}

	fn revoke<'a>(
		&'a self,
		digest: &'a SecretDigest,
		now: OffsetDateTime,
	) -> StoreFuture<'a, RevokeOutcome> {
		Box::pin(async move {
			self.commit(|rows| {
				let outcome = memory::revoke_row(rows, digest, now);

				Ok((outcome, outcome == RevokeOutcome::Revoked))
			})
		})
	}

	fn revoke_subject<'a>(
		&'a self,
		subject: &'a SubjectId,
		now: OffsetDateTime,
	) -> StoreFuture<'a, usize> {
		Box::pin(async move {
			self.commit(|rows| {
				let revoked = memory::revoke_subject_rows(rows, subject, now);

				Ok((revoked, revoked > 0))
			})
		})
	}

	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move {
			self.commit(|rows| {
				let purged = memory::purge_rows(rows, now);

				Ok((purged, purged > 0))
			})
		})
	}
}
