//! Exchange a verified identity assertion for a local session: short-lived signed access
//! tokens, rotating refresh tokens with reuse detection, and a fixed-window rate guard that
//! shields the issuance endpoints.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod guard;
pub mod obs;
pub mod provider;
#[cfg(feature = "server")] pub mod server;
pub mod session;
pub mod store;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by unit and integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::SubjectId,
		codec::SigningKey,
		config::SessionConfig,
		provider::{IdentityProvider, StaticIdentityProvider, VerifiedIdentity},
		session::SessionBroker,
		store::{MemoryStore, RefreshTokenStore},
	};

	/// Assertion accepted by [`test_identity_provider`] for subject `u1`.
	pub const TEST_ASSERTION: &str = "assertion-u1";

	/// Deterministic 32-byte signing key used across tests.
	pub fn test_signing_key() -> SigningKey {
		SigningKey::new(b"test-signing-key-0123456789abcdef".to_vec())
			.expect("Test signing key fixture should satisfy the minimum length.")
	}

	/// Identity provider that accepts [`TEST_ASSERTION`] for subject `u1` with an email claim.
	pub fn test_identity_provider() -> StaticIdentityProvider {
		let subject = SubjectId::new("u1").expect("Subject fixture should be valid.");

		StaticIdentityProvider::default().with_identity(
			TEST_ASSERTION,
			VerifiedIdentity::new(subject).with_email("u1@example.com"),
		)
	}

	/// Builds a reqwest client that accepts the self-signed certificates of local mock servers.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_client() -> ReqwestClient {
		ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Test reqwest client should build.")
	}

	/// Builds a [`SessionBroker`] over a fresh in-memory store and the test provider.
	pub fn build_test_broker(config: SessionConfig) -> (SessionBroker, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn RefreshTokenStore> = store_backend.clone();
		let provider: Arc<dyn IdentityProvider> = Arc::new(test_identity_provider());
		let broker = SessionBroker::new(config, test_signing_key(), store, provider);

		(broker, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)]
use {color_eyre as _, httpmock as _, tower as _, tracing_subscriber as _};
