#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use session_broker::{
	_preludet::*,
	auth::SubjectId,
	provider::{HttpIdentityProvider, IdentityProvider, ProviderError, VerifiedIdentity},
};

fn build_provider(server: &MockServer) -> HttpIdentityProvider {
	let endpoint =
		Url::parse(&server.url("/verify")).expect("Mock verification endpoint should parse.");

	HttpIdentityProvider::with_client(test_reqwest_client(), endpoint)
		.expect("Mock verification endpoint should be accepted.")
}

#[tokio::test]
async fn successful_verification_yields_the_identity() {
	let server = MockServer::start_async().await;
	let provider = build_provider(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/verify").json_body(serde_json::json!({ "assertion": "good" }));
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"subject\":\"u42\",\"email\":\"u42@example.com\"}");
		})
		.await;
	let identity =
		provider.verify_assertion("good").await.expect("Verification should succeed.");

	assert_eq!(
		identity,
		VerifiedIdentity::new(SubjectId::new("u42").expect("Subject fixture should be valid."))
			.with_email("u42@example.com")
	);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn client_errors_are_rejections() {
	let server = MockServer::start_async().await;
	let provider = build_provider(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/verify");
			then.status(401).body("{\"error\":\"expired\"}");
		})
		.await;

	assert!(matches!(
		provider.verify_assertion("stale").await,
		Err(ProviderError::Rejected { .. })
	));
}

#[tokio::test]
async fn server_errors_mean_unavailable() {
	let server = MockServer::start_async().await;
	let provider = build_provider(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/verify");
			then.status(503);
		})
		.await;

	let err = provider.verify_assertion("any").await.expect_err("5xx should fail verification.");

	assert!(matches!(err, ProviderError::Unavailable { .. }));
}

#[tokio::test]
async fn malformed_bodies_report_the_offending_path() {
	let server = MockServer::start_async().await;
	let provider = build_provider(&server);

	server
		.mock_async(|when, then| {
			when.method(POST).path("/verify");
			then.status(200).header("content-type", "application/json").body("{\"subject\":7}");
		})
		.await;

	let err =
		provider.verify_assertion("odd").await.expect_err("Malformed body should fail verification.");

	match err {
		ProviderError::MalformedResponse { source } => {
			assert_eq!(source.path().to_string(), "subject");
		},
		other => panic!("Expected a malformed response error, got {other:?}."),
	}
}
