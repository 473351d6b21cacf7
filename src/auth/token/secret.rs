//! Bearer secret wrapper that redacts sensitive material, plus the digest stores index by.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const SECRET_BYTES: usize = 32;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Draws a fresh 256-bit secret from the thread-local CSPRNG.
	pub fn generate() -> Self {
		let mut bytes = [0_u8; SECRET_BYTES];

		rand::rng().fill_bytes(&mut bytes);

		Self(URL_SAFE_NO_PAD.encode(bytes))
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Computes the digest persisted in place of the raw secret.
	pub fn digest(&self) -> SecretDigest {
		SecretDigest::of(&self.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// URL-safe base64 SHA-256 digest of a refresh secret.
///
/// Stores key rows by digest; the raw secret is never persisted.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretDigest(String);
impl SecretDigest {
	/// Hashes the provided raw secret.
	pub fn of(secret: &str) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(secret.as_bytes());

		Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
	}

	/// Returns the encoded digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Rehydrates a digest previously produced by [`SecretDigest::of`], e.g. from a database row.
	pub fn from_encoded(encoded: impl Into<String>) -> Self {
		Self(encoded.into())
	}
}
impl Debug for SecretDigest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// A prefix is enough to correlate log lines without handing out the whole key.
		let prefix = self.0.get(..8).unwrap_or(&self.0);

		write!(f, "SecretDigest({prefix}..)")
	}
}
