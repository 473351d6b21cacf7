//! Session orchestration: exchange, refresh, logout, and access token authentication.
//!
//! [`SessionBroker`] composes the [`TokenCodec`], a [`RefreshTokenStore`], and an
//! [`IdentityProvider`]. Every store and provider call runs under the configured dependency
//! timeout; an elapsed budget surfaces as [`TransientError::DependencyTimeout`], never as a
//! credential verdict. Rotation atomicity lives in the store, so a caller dropping the
//! future mid-refresh leaves either the old token active or the full rotation committed.

mod metrics;

pub use metrics::{FlowCounters, SessionMetrics};

// self
use crate::{
	_prelude::*,
	auth::{AccessClaims, RefreshTokenRecord, SubjectId, TokenId, TokenSecret},
	codec::{SigningKey, TokenCodec},
	config::{ReusePolicy, SessionConfig},
	error::TransientError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::IdentityProvider,
	store::{RefreshFailure, RefreshTokenStore, RevokeOutcome, RotateOutcome, Successor},
};

/// Credentials handed to a client after a successful exchange or refresh.
#[derive(Clone)]
pub struct IssuedSession {
	/// Subject the session belongs to.
	pub subject: SubjectId,
	/// Signed access token.
	pub access_token: String,
	/// Access token expiry.
	pub access_expires_at: OffsetDateTime,
	/// Bearer secret of the newly issued refresh token.
	pub refresh_secret: TokenSecret,
	/// Refresh token expiry.
	pub refresh_expires_at: OffsetDateTime,
}
impl Debug for IssuedSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedSession")
			.field("subject", &self.subject)
			.field("access_token", &"<redacted>")
			.field("access_expires_at", &self.access_expires_at)
			.field("refresh_secret", &self.refresh_secret)
			.field("refresh_expires_at", &self.refresh_expires_at)
			.finish()
	}
}

/// Runs the session protocol over injected collaborators.
pub struct SessionBroker {
	codec: TokenCodec,
	store: Arc<dyn RefreshTokenStore>,
	provider: Arc<dyn IdentityProvider>,
	config: SessionConfig,
	metrics: Arc<SessionMetrics>,
}
impl SessionBroker {
	/// Creates a broker that signs with `key` and persists refresh tokens in `store`.
	pub fn new(
		config: SessionConfig,
		key: SigningKey,
		store: Arc<dyn RefreshTokenStore>,
		provider: Arc<dyn IdentityProvider>,
	) -> Self {
		let codec = TokenCodec::new(&key, config.leeway);

		Self { codec, store, provider, config, metrics: Default::default() }
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Returns the in-process flow counters.
	pub fn metrics(&self) -> Arc<SessionMetrics> {
		self.metrics.clone()
	}

	/// Exchanges an identity assertion for a new session.
	pub async fn exchange(&self, assertion: &str) -> Result<IssuedSession> {
		self.exchange_at(assertion, OffsetDateTime::now_utc()).await
	}

	/// Exchanges an identity assertion for a new session as of `now`.
	pub async fn exchange_at(&self, assertion: &str, now: OffsetDateTime) -> Result<IssuedSession> {
		self.observe(FlowKind::Exchange, "exchange", async move {
			if assertion.trim().is_empty() {
				return Err(Error::BadRequest { reason: "identity assertion is empty".into() });
			}

			let identity = self
				.bounded("provider.verify_assertion", self.provider.verify_assertion(assertion))
				.await?;
			let secret = TokenSecret::generate();
			let record = RefreshTokenRecord::issue(
				identity.subject.clone(),
				secret.digest(),
				now,
				self.config.refresh_ttl,
			);
			let refresh_expires_at = record.expires_at;
			let (access_token, access_expires_at) =
				self.mint(identity.subject.clone(), identity.email, now)?;

			self.bounded("store.insert", self.store.insert(record)).await?;

			Ok(IssuedSession {
				subject: identity.subject,
				access_token,
				access_expires_at,
				refresh_secret: secret,
				refresh_expires_at,
			})
		})
		.await
	}

	/// Rotates the presented refresh secret and issues a new session.
	pub async fn refresh(&self, secret: &str) -> Result<IssuedSession> {
		self.refresh_at(secret, OffsetDateTime::now_utc()).await
	}

	/// Rotates the presented refresh secret as of `now`.
	///
	/// Every refusal surfaces as [`Error::Refresh`]; the [`RefreshFailure`] inside tells
	/// unknown, expired, logged-out, and replayed secrets apart for logs and metrics.
	pub async fn refresh_at(&self, secret: &str, now: OffsetDateTime) -> Result<IssuedSession> {
		const KIND: FlowKind = FlowKind::Refresh;

		self.observe(KIND, "refresh", async move {
			if secret.is_empty() {
				return Err(Error::BadRequest { reason: "refresh secret is empty".into() });
			}

			let presented = TokenSecret::new(secret).digest();
			let next = TokenSecret::generate();
			let successor = Successor {
				id: TokenId::generate(),
				secret_digest: next.digest(),
				expires_at: now + self.config.refresh_ttl,
			};
			let refresh_expires_at = successor.expires_at;
			let outcome =
				self.bounded("store.rotate", self.store.rotate(&presented, successor, now)).await?;
			let subject = match outcome {
				RotateOutcome::Rotated { subject } => subject,
				RotateOutcome::Missing => return Err(RefreshFailure::NotFound.into()),
				RotateOutcome::Expired => return Err(RefreshFailure::Expired.into()),
				RotateOutcome::AlreadyRevoked { replaced_by: None, .. } =>
					return Err(RefreshFailure::Revoked.into()),
				RotateOutcome::AlreadyRevoked { replaced_by: Some(_), subject } => {
					self.metrics.record_reuse();
					self.respond_to_reuse(&subject, now).await;

					return Err(RefreshFailure::ReusedAfterRotation.into());
				},
			};
			let (access_token, access_expires_at) = self.mint(subject.clone(), None, now)?;

			Ok(IssuedSession {
				subject,
				access_token,
				access_expires_at,
				refresh_secret: next,
				refresh_expires_at,
			})
		})
		.await
	}

	/// Revokes the presented refresh secret.
	pub async fn logout(&self, secret: &str) -> Result<RevokeOutcome> {
		self.logout_at(secret, OffsetDateTime::now_utc()).await
	}

	/// Revokes the presented refresh secret as of `now`.
	///
	/// Unknown and already revoked secrets succeed too; the returned outcome is for the
	/// caller's logs only and must not reach the client.
	pub async fn logout_at(&self, secret: &str, now: OffsetDateTime) -> Result<RevokeOutcome> {
		self.observe(FlowKind::Logout, "logout", async move {
			if secret.is_empty() {
				return Err(Error::BadRequest { reason: "refresh secret is empty".into() });
			}

			let digest = TokenSecret::new(secret).digest();

			self.bounded("store.revoke", self.store.revoke(&digest, now)).await
		})
		.await
	}

	/// Verifies a bearer access token against the current clock.
	pub fn authenticate(&self, bearer: &str) -> Result<AccessClaims> {
		self.authenticate_at(bearer, OffsetDateTime::now_utc())
	}

	/// Verifies a bearer access token as of `now`. Never touches the store.
	pub fn authenticate_at(&self, bearer: &str, now: OffsetDateTime) -> Result<AccessClaims> {
		const KIND: FlowKind = FlowKind::Authenticate;

		let _span = FlowSpan::new(KIND, "authenticate").entered();
		let counters = self.metrics.flow(KIND);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		counters.record_attempt();

		let result = self.codec.verify_at(bearer, now).map_err(Error::from);

		counters.record_result(&result);
		obs::record_flow_result(KIND, &result);

		result
	}

	/// Deletes refresh tokens that expired before `now`; returns how many went.
	pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<usize> {
		self.bounded("store.purge_expired", self.store.purge_expired(now)).await
	}

	fn mint(
		&self,
		subject: SubjectId,
		email: Option<String>,
		now: OffsetDateTime,
	) -> Result<(String, OffsetDateTime)> {
		let claims = AccessClaims::new(subject, email, now, self.config.access_ttl);
		let token = self.codec.mint(&claims)?;

		Ok((token, now + self.config.access_ttl))
	}

	async fn respond_to_reuse(&self, subject: &SubjectId, now: OffsetDateTime) {
		if self.config.reuse_policy != ReusePolicy::RevokeSubject {
			return;
		}

		match self.bounded("store.revoke_subject", self.store.revoke_subject(subject, now)).await {
			Ok(_revoked) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(
					subject = %subject,
					revoked = _revoked,
					"Revoked every refresh token of a subject after reuse."
				);
			},
			Err(e) => obs::log_flow_failure(FlowKind::Refresh, &e),
		}
	}

	async fn observe<T, Fut>(&self, kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		let span = FlowSpan::new(kind, stage);
		let counters = self.metrics.flow(kind);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);
		counters.record_attempt();

		let result = span.instrument(fut).await;

		counters.record_result(&result);
		obs::record_flow_result(kind, &result);

		result
	}

	async fn bounded<T, E, Fut>(&self, operation: &'static str, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T, E>>,
		Error: From<E>,
	{
		let budget = std::time::Duration::try_from(self.config.dependency_timeout)
			.unwrap_or(std::time::Duration::ZERO);

		match tokio::time::timeout(budget, fut).await {
			Ok(result) => result.map_err(Error::from),
			Err(_) => Err(TransientError::DependencyTimeout {
				operation,
				after: self.config.dependency_timeout,
			}
			.into()),
		}
	}
}
impl Debug for SessionBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroker")
			.field("codec", &self.codec)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}
