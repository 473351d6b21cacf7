// crates.io
use time::macros;
// self
use session_broker::{
	_preludet::*,
	codec::CodecError,
	config::SessionConfig,
	obs::FlowKind,
	store::RefreshFailure,
};

const T0: OffsetDateTime = macros::datetime!(2025-11-10 12:00 UTC);

#[tokio::test]
async fn exchange_refresh_logout_scenario() {
	let (broker, _store) = build_test_broker(SessionConfig::default());
	let first = broker.exchange_at(TEST_ASSERTION, T0).await.expect("Exchange should succeed.");
	let a1 = broker
		.authenticate_at(&first.access_token, T0)
		.expect("First access token should verify.");

	assert_eq!(a1.sub.as_ref(), "u1");

	let later = T0 + Duration::minutes(5);
	let second = broker
		.refresh_at(first.refresh_secret.expose(), later)
		.await
		.expect("Refreshing with R1 should succeed.");
	let a2 = broker
		.authenticate_at(&second.access_token, later)
		.expect("Second access token should verify.");

	assert_ne!(first.access_token, second.access_token);
	assert_eq!(a2.sub.as_ref(), "u1");
	assert!(matches!(
		broker.refresh_at(first.refresh_secret.expose(), later).await,
		Err(Error::Refresh(RefreshFailure::ReusedAfterRotation))
	));

	broker
		.logout_at(second.refresh_secret.expose(), later)
		.await
		.expect("Logging out with R2 should succeed.");

	assert!(matches!(
		broker.refresh_at(second.refresh_secret.expose(), later).await,
		Err(Error::Refresh(RefreshFailure::Revoked))
	));

	let metrics = broker.metrics();

	assert_eq!(metrics.flow(FlowKind::Exchange).successes(), 1);
	assert_eq!(metrics.flow(FlowKind::Refresh).attempts(), 3);
	assert_eq!(metrics.flow(FlowKind::Refresh).failures(), 2);
	assert_eq!(metrics.reuse_detected(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshes_with_one_secret_have_one_winner() {
	let (broker, store) = build_test_broker(SessionConfig::default());
	let broker = Arc::new(broker);
	let session = broker.exchange_at(TEST_ASSERTION, T0).await.expect("Exchange should succeed.");
	let tasks = (0..16)
		.map(|_| {
			let broker = broker.clone();
			let secret = session.refresh_secret.clone();

			tokio::spawn(async move { broker.refresh_at(secret.expose(), T0).await })
		})
		.collect::<Vec<_>>();
	let mut winners = 0;

	for task in tasks {
		match task.await.expect("Refresh task should not panic.") {
			Ok(_) => winners += 1,
			Err(Error::Refresh(RefreshFailure::ReusedAfterRotation)) => {},
			Err(other) => panic!("Unexpected refresh failure: {other:?}"),
		}
	}

	assert_eq!(winners, 1);
	assert_eq!(store.active_count(&session.subject, T0), 1, "One rotation leaves one active row.");
}

#[tokio::test]
async fn refresh_tokens_expire_monotonically() {
	let (broker, _store) = build_test_broker(SessionConfig::default());
	let session = broker.exchange_at(TEST_ASSERTION, T0).await.expect("Exchange should succeed.");

	for offset in [Duration::ZERO, Duration::seconds(1), Duration::days(1)] {
		let err = broker
			.refresh_at(session.refresh_secret.expose(), session.refresh_expires_at + offset)
			.await
			.expect_err("Refresh at or after expiry must fail.");

		assert!(matches!(err, Error::Refresh(RefreshFailure::Expired)));
	}

	let just_before = session.refresh_expires_at - Duration::seconds(1);

	broker
		.refresh_at(session.refresh_secret.expose(), just_before)
		.await
		.expect("Refresh just before expiry should succeed.");
}

#[tokio::test]
async fn access_tokens_outlive_logout_until_they_expire() {
	let (broker, _store) = build_test_broker(SessionConfig::default());
	let session = broker.exchange_at(TEST_ASSERTION, T0).await.expect("Exchange should succeed.");

	broker
		.logout_at(session.refresh_secret.expose(), T0)
		.await
		.expect("Logout should succeed.");

	assert!(broker.authenticate_at(&session.access_token, T0 + Duration::minutes(14)).is_ok());
	let past_leeway = session.access_expires_at + Duration::seconds(5);

	assert!(matches!(
		broker.authenticate_at(&session.access_token, past_leeway),
		Err(Error::AccessDenied(CodecError::Expired))
	));
}

#[tokio::test]
async fn tokens_from_another_broker_key_are_refused() {
	let (broker, _store) = build_test_broker(SessionConfig::default());
	let foreign = session_broker::session::SessionBroker::new(
		SessionConfig::default(),
		session_broker::codec::SigningKey::new(b"a-completely-different-signing-key!".to_vec())
			.expect("Foreign key fixture should be valid."),
		Arc::new(session_broker::store::MemoryStore::default()),
		Arc::new(test_identity_provider()),
	);
	let session = foreign.exchange_at(TEST_ASSERTION, T0).await.expect("Exchange should succeed.");

	assert!(matches!(
		broker.authenticate_at(&session.access_token, T0),
		Err(Error::AccessDenied(CodecError::InvalidSignature))
	));
}
