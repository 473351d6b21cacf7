//! Runs the session broker over HTTP with a static demo identity or a remote verifier.
//!
//! Environment:
//!
//! - `SESSION_SIGNING_SECRET`: HMAC secret, at least 32 bytes (required).
//! - `SESSION_BIND`: listen address, `127.0.0.1:8080` by default.
//! - `SESSION_STORE_PATH`: JSON snapshot path; rows stay in memory when unset.
//! - `SESSION_IDP_URL`: HTTPS verification endpoint; the demo assertion is used when unset.
//!
//! Try it with `curl -i -XPOST localhost:8080/auth/exchange -d '{"idToken":"demo-assertion"}'
//! -H 'content-type: application/json'`.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::{Result, eyre::eyre};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
// self
use session_broker::{
	auth::SubjectId,
	codec::SigningKey,
	config::{CookiePolicy, RateGuardConfig, SessionConfig},
	guard::RateGuard,
	provider::{IdentityProvider, StaticIdentityProvider, VerifiedIdentity},
	server::{self, AppState},
	session::SessionBroker,
	store::{FileStore, MemoryStore, RefreshTokenStore},
};

const DEMO_ASSERTION: &str = "demo-assertion";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let secret = env::var("SESSION_SIGNING_SECRET")
		.map_err(|_| eyre!("SESSION_SIGNING_SECRET must be set."))?;
	let bind = env::var("SESSION_BIND").unwrap_or_else(|_| "127.0.0.1:8080".into());
	let store: Arc<dyn RefreshTokenStore> = match env::var("SESSION_STORE_PATH") {
		Ok(path) => Arc::new(FileStore::open(path)?),
		Err(_) => Arc::new(MemoryStore::default()),
	};
	let broker = Arc::new(SessionBroker::new(
		SessionConfig::default(),
		SigningKey::new(secret.into_bytes())?,
		store,
		identity_provider()?,
	));
	let guard = Arc::new(RateGuard::new(RateGuardConfig::default()));
	let _reclaimer = guard.spawn_reclaimer();
	let purger = broker.clone();

	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3_600));

		loop {
			ticker.tick().await;

			if let Err(e) = purger.purge_expired(time::OffsetDateTime::now_utc()).await {
				tracing::warn!(error = %e, "Failed to purge expired refresh tokens.");
			}
		}
	});

	let listener = TcpListener::bind(&bind).await?;
	// Plain-HTTP local runs need a cookie the browser will send back.
	let cookie = CookiePolicy::new("refresh_token", "/auth", false)?;
	let router = server::router(AppState::new(broker, guard, cookie));

	tracing::info!(address = %listener.local_addr()?, "Listening.");

	server::serve(listener, router).await?;

	Ok(())
}

fn identity_provider() -> Result<Arc<dyn IdentityProvider>> {
	#[cfg(feature = "reqwest")]
	{
		if let Ok(endpoint) = env::var("SESSION_IDP_URL") {
			let endpoint = session_broker::url::Url::parse(&endpoint)?;

			return Ok(Arc::new(session_broker::provider::HttpIdentityProvider::new(endpoint)?));
		}
	}

	let identity = VerifiedIdentity::new(SubjectId::new("demo-user")?).with_email("demo@example.com");

	Ok(Arc::new(StaticIdentityProvider::default().with_identity(DEMO_ASSERTION, identity)))
}
