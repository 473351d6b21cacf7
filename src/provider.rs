//! Identity provider seam.
//!
//! The broker never verifies identity assertions itself. An [`IdentityProvider`] takes the
//! opaque assertion a client obtained from an external identity service and answers with the
//! [`VerifiedIdentity`] it vouches for, or a [`ProviderError`] that separates "this assertion
//! is bad" from "the provider could not be asked".

// self
use crate::{_prelude::*, auth::SubjectId};
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Boxed future returned by [`IdentityProvider::verify_assertion`].
pub type ProviderFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a + Send>>;

/// Verifies identity assertions issued by an external identity service.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Verifies `assertion` and returns the identity it proves.
	fn verify_assertion<'a>(&'a self, assertion: &'a str) -> ProviderFuture<'a, VerifiedIdentity>;
}

/// Identity vouched for by an [`IdentityProvider`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
	/// Stable subject identifier owned by the provider.
	pub subject: SubjectId,
	/// Email claim, when the provider supplies one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
}
impl VerifiedIdentity {
	/// Creates an identity without an email claim.
	pub fn new(subject: SubjectId) -> Self {
		Self { subject, email: None }
	}

	/// Attaches an email claim.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}
}

/// Failures reported by an [`IdentityProvider`].
#[derive(Debug, ThisError)]
pub enum ProviderError {
	/// The assertion is invalid, expired, or otherwise refused.
	#[error("Identity provider rejected the assertion: {reason}.")]
	Rejected {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The provider could not be reached or failed internally.
	#[error("Identity provider is unavailable: {message}.")]
	Unavailable {
		/// Transport or upstream failure description.
		message: String,
	},
	/// The provider answered with a body that does not describe an identity.
	#[error("Identity provider returned a malformed response.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// In-process provider that accepts a fixed set of assertions.
///
/// Suited to tests and local demos; every unknown assertion is rejected.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentityProvider {
	identities: HashMap<String, VerifiedIdentity>,
}
impl StaticIdentityProvider {
	/// Registers `identity` as the answer for `assertion`.
	pub fn with_identity(mut self, assertion: impl Into<String>, identity: VerifiedIdentity) -> Self {
		self.identities.insert(assertion.into(), identity);

		self
	}
}
impl IdentityProvider for StaticIdentityProvider {
	fn verify_assertion<'a>(&'a self, assertion: &'a str) -> ProviderFuture<'a, VerifiedIdentity> {
		Box::pin(async move {
			self.identities
				.get(assertion)
				.cloned()
				.ok_or_else(|| ProviderError::Rejected { reason: "unknown assertion".into() })
		})
	}
}

#[cfg(feature = "reqwest")]
#[derive(Serialize)]
struct VerifyRequest<'a> {
	assertion: &'a str,
}

/// Provider that delegates verification to an HTTPS endpoint.
///
/// The assertion is POSTed as `{"assertion": "..."}`. A 2xx answer must carry
/// `{"subject": "...", "email": "..."?}`; any 4xx is a rejection, while 5xx answers and
/// transport failures mean the provider is unavailable. Redirects are never followed.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct HttpIdentityProvider {
	client: ReqwestClient,
	endpoint: Url,
}
#[cfg(feature = "reqwest")]
impl HttpIdentityProvider {
	/// Creates a provider with a default client that refuses redirects.
	pub fn new(endpoint: Url) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(|e| ConfigError::HttpClientBuild { message: e.to_string() })?;

		Self::with_client(client, endpoint)
	}

	/// Creates a provider over a caller-configured client.
	pub fn with_client(client: ReqwestClient, endpoint: Url) -> Result<Self, ConfigError> {
		if endpoint.scheme() != "https" {
			return Err(ConfigError::InsecureEndpoint { url: endpoint.to_string() });
		}

		Ok(Self { client, endpoint })
	}

	/// Returns the verification endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}
}
#[cfg(feature = "reqwest")]
impl IdentityProvider for HttpIdentityProvider {
	fn verify_assertion<'a>(&'a self, assertion: &'a str) -> ProviderFuture<'a, VerifiedIdentity> {
		Box::pin(async move {
			let response = self
				.client
				.post(self.endpoint.clone())
				.json(&VerifyRequest { assertion })
				.send()
				.await
				.map_err(|e| ProviderError::Unavailable { message: e.to_string() })?;
			let status = response.status();

			if status.is_client_error() {
				return Err(ProviderError::Rejected { reason: format!("status {}", status.as_u16()) });
			}
			if !status.is_success() {
				return Err(ProviderError::Unavailable {
					message: format!("verification endpoint returned status {}", status.as_u16()),
				});
			}

			let body = response
				.bytes()
				.await
				.map_err(|e| ProviderError::Unavailable { message: e.to_string() })?;
			let mut de = serde_json::Deserializer::from_slice(&body);

			serde_path_to_error::deserialize(&mut de)
				.map_err(|source| ProviderError::MalformedResponse { source })
		})
	}
}
