//! Fixed claim set carried by signed access tokens.

// self
use crate::{_prelude::*, auth::SubjectId};

/// Claims embedded in every access token.
///
/// The structure is closed: tokens are decoded into exactly these fields, never into a
/// free-form map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
	/// Authenticated subject.
	pub sub: SubjectId,
	/// Email claim forwarded from the identity provider, when present.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Issued-at, seconds since the Unix epoch.
	pub iat: i64,
	/// Expiry, seconds since the Unix epoch.
	pub exp: i64,
}
impl AccessClaims {
	/// Builds claims for `subject` issued at `issued_at` and valid for `ttl`.
	pub fn new(
		subject: SubjectId,
		email: Option<String>,
		issued_at: OffsetDateTime,
		ttl: Duration,
	) -> Self {
		let iat = issued_at.unix_timestamp();

		Self { sub: subject, email, iat, exp: iat + ttl.whole_seconds() }
	}

	/// Issued-at as a timestamp.
	pub fn issued_at(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.iat).ok()
	}

	/// Expiry as a timestamp.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.exp).ok()
	}
}
