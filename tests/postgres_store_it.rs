#![cfg(feature = "postgres")]

// std
use std::env;
// crates.io
use sqlx::PgPool;
// self
use session_broker::{
	_preludet::*,
	auth::{RefreshTokenRecord, SubjectId, TokenId, TokenSecret},
	store::{PgStore, RefreshTokenStore, RevokeOutcome, RotateOutcome, Successor},
};

async fn connect() -> Option<PgStore> {
	let Ok(url) = env::var("DATABASE_URL") else {
		eprintln!("DATABASE_URL is not set; skipping Postgres store test.");

		return None;
	};
	let pool = PgPool::connect(&url).await.expect("Postgres should accept connections.");
	let store = PgStore::new(pool);

	store.ensure_schema().await.expect("Schema should apply cleanly.");

	Some(store)
}

fn unique_subject(label: &str) -> SubjectId {
	SubjectId::new(format!("{label}-{}", TokenId::generate()))
		.expect("Generated subject should be valid.")
}

#[tokio::test]
async fn concurrent_rotation_has_one_winner() {
	let Some(store) = connect().await else { return };
	let store = Arc::new(store);
	let now = OffsetDateTime::now_utc();
	let subject = unique_subject("pg-race");
	let secret = TokenSecret::generate();

	store
		.insert(RefreshTokenRecord::issue(subject.clone(), secret.digest(), now, Duration::days(7)))
		.await
		.expect("Insert should succeed.");

	let mut tasks = Vec::new();

	for _ in 0..8 {
		let store = store.clone();
		let digest = secret.digest();

		tasks.push(tokio::spawn(async move {
			let successor = Successor {
				id: TokenId::generate(),
				secret_digest: TokenSecret::generate().digest(),
				expires_at: now + Duration::days(7),
			};

			store.rotate(&digest, successor, now).await
		}));
	}

	let mut winners = 0;

	for task in tasks {
		let outcome =
			task.await.expect("Rotation task should not panic.").expect("Rotation should not error.");

		match outcome {
			RotateOutcome::Rotated { subject: rotated } => {
				assert_eq!(rotated, subject);

				winners += 1;
			},
			RotateOutcome::AlreadyRevoked { .. } => {},
			other => panic!("Unexpected rotation outcome {other:?}."),
		}
	}

	assert_eq!(winners, 1);

	let presented = store
		.find(&secret.digest())
		.await
		.expect("Lookup should succeed.")
		.expect("Rotated row should remain for reuse detection.");

	assert!(presented.revoked_at.is_some());
	assert!(presented.replaced_by.is_some());
}

#[tokio::test]
async fn revocation_is_idempotent_and_subject_scoped() {
	let Some(store) = connect().await else { return };
	let now = OffsetDateTime::now_utc();
	let subject = unique_subject("pg-revoke");
	let bystander = unique_subject("pg-bystander");
	let first = TokenSecret::generate();
	let second = TokenSecret::generate();
	let other = TokenSecret::generate();

	for (owner, secret) in [(&subject, &first), (&subject, &second), (&bystander, &other)] {
		store
			.insert(RefreshTokenRecord::issue(owner.clone(), secret.digest(), now, Duration::days(1)))
			.await
			.expect("Insert should succeed.");
	}

	assert_eq!(
		store.revoke(&first.digest(), now).await.expect("Revoke should succeed."),
		RevokeOutcome::Revoked
	);
	assert_eq!(
		store.revoke(&first.digest(), now).await.expect("Repeat revoke should succeed."),
		RevokeOutcome::AlreadyRevoked
	);
	assert_eq!(
		store.revoke(&TokenSecret::generate().digest(), now).await.expect("Revoke should succeed."),
		RevokeOutcome::Missing
	);
	assert_eq!(store.revoke_subject(&subject, now).await.expect("Subject revoke should succeed."), 1);

	let untouched = store
		.find(&other.digest())
		.await
		.expect("Lookup should succeed.")
		.expect("Bystander row should exist.");

	assert!(untouched.revoked_at.is_none());
}

#[tokio::test]
async fn expired_rows_are_classified_and_purged() {
	let Some(store) = connect().await else { return };
	let issued = OffsetDateTime::now_utc() - Duration::days(2);
	let subject = unique_subject("pg-expired");
	let secret = TokenSecret::generate();

	store
		.insert(RefreshTokenRecord::issue(subject, secret.digest(), issued, Duration::days(1)))
		.await
		.expect("Insert should succeed.");

	let now = OffsetDateTime::now_utc();
	let successor = Successor {
		id: TokenId::generate(),
		secret_digest: TokenSecret::generate().digest(),
		expires_at: now + Duration::days(1),
	};

	assert!(matches!(
		store.rotate(&secret.digest(), successor, now).await.expect("Rotation should not error."),
		RotateOutcome::Expired
	));
	assert_eq!(
		store.revoke(&secret.digest(), now).await.expect("Revoke should succeed."),
		RevokeOutcome::Expired
	);

	let untouched = store
		.find(&secret.digest())
		.await
		.expect("Lookup should succeed.")
		.expect("Expired row should still exist before purging.");

	assert_eq!(untouched.revoked_at, None);
	assert!(store.purge_expired(now).await.expect("Purge should succeed.") >= 1);
	assert!(store.find(&secret.digest()).await.expect("Lookup should succeed.").is_none());
}
