//! Signed access token codec.
//!
//! Tokens are HS256 JWTs over the fixed [`AccessClaims`] structure, signed with one
//! process-wide symmetric key. Verification never touches shared state or I/O. Checks run in
//! this order: structure, algorithm, signature, expiry.
//!
//! The algorithm check deliberately runs before the signature check rather than after it: a
//! token naming any algorithm other than HS256 is refused as
//! [`CodecError::AlgorithmMismatch`] without any signature work, so a token cannot pick its
//! own verification method. Either order refuses the same tokens; only the reported kind
//! differs.

// std
use std::collections::HashSet;
// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind as JwtErrorKind,
};
// self
use crate::{_prelude::*, auth::AccessClaims, error::ConfigError};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Reasons an access token is refused, plus the (local) signing failure.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CodecError {
	/// Token is not a well-formed JWT carrying the expected claims.
	#[error("Access token is malformed.")]
	Malformed,
	/// Token header names an algorithm other than the pinned one.
	#[error("Access token uses unexpected algorithm {found}.")]
	AlgorithmMismatch {
		/// Algorithm advertised by the token header.
		found: String,
	},
	/// Signature does not match the signing key.
	#[error("Access token signature is invalid.")]
	InvalidSignature,
	/// Token is past its expiry (plus leeway).
	#[error("Access token has expired.")]
	Expired,
	/// Token could not be produced.
	#[error("Access token could not be signed: {message}.")]
	Signing {
		/// Encoder failure description.
		message: String,
	},
}
impl CodecError {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Malformed => "access_malformed",
			Self::AlgorithmMismatch { .. } => "access_algorithm_mismatch",
			Self::InvalidSignature => "access_invalid_signature",
			Self::Expired => "access_expired",
			Self::Signing { .. } => "access_signing",
		}
	}
}

/// Symmetric signing secret, loaded once at process start.
#[derive(Clone)]
pub struct SigningKey(Arc<[u8]>);
impl SigningKey {
	/// Minimum accepted key length in bytes (256 bits).
	pub const MIN_LEN: usize = 32;

	/// Wraps raw key material after checking its length.
	pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, ConfigError> {
		let bytes = bytes.into();

		if bytes.len() < Self::MIN_LEN {
			return Err(ConfigError::WeakSigningKey { min: Self::MIN_LEN, actual: bytes.len() });
		}

		Ok(Self(Arc::from(bytes)))
	}

	fn expose(&self) -> &[u8] {
		&self.0
	}
}
impl Debug for SigningKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SigningKey").field(&"<redacted>").finish()
	}
}

/// Mints and verifies access tokens.
#[derive(Clone)]
pub struct TokenCodec {
	encoding: EncodingKey,
	decoding: DecodingKey,
	validation: Validation,
	leeway: Duration,
}
impl TokenCodec {
	/// Creates a codec that tolerates `leeway` of clock skew on expiry.
	pub fn new(key: &SigningKey, leeway: Duration) -> Self {
		let mut validation = Validation::new(ALGORITHM);

		// Expiry is checked against an injectable clock below.
		validation.validate_exp = false;
		validation.validate_nbf = false;
		validation.required_spec_claims = HashSet::new();

		Self {
			encoding: EncodingKey::from_secret(key.expose()),
			decoding: DecodingKey::from_secret(key.expose()),
			validation,
			leeway: if leeway.is_negative() { Duration::ZERO } else { leeway },
		}
	}

	/// Mints a token for `claims`.
	pub fn mint(&self, claims: &AccessClaims) -> Result<String, CodecError> {
		jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding)
			.map_err(|e| CodecError::Signing { message: e.to_string() })
	}

	/// Verifies `token` against the current clock.
	pub fn verify(&self, token: &str) -> Result<AccessClaims, CodecError> {
		self.verify_at(token, OffsetDateTime::now_utc())
	}

	/// Verifies `token` as of `now`.
	pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<AccessClaims, CodecError> {
		let header = jsonwebtoken::decode_header(token).map_err(|_| CodecError::Malformed)?;

		if header.alg != ALGORITHM {
			return Err(CodecError::AlgorithmMismatch { found: format!("{:?}", header.alg) });
		}

		let claims = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)
			.map_err(|e| match e.kind() {
				JwtErrorKind::InvalidSignature => CodecError::InvalidSignature,
				JwtErrorKind::InvalidAlgorithm => CodecError::AlgorithmMismatch {
					found: format!("{:?}", header.alg),
				},
				_ => CodecError::Malformed,
			})?
			.claims;

		if now.unix_timestamp() >= claims.exp.saturating_add(self.leeway.whole_seconds()) {
			return Err(CodecError::Expired);
		}

		Ok(claims)
	}
}
impl Debug for TokenCodec {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCodec")
			.field("algorithm", &ALGORITHM)
			.field("leeway", &self.leeway)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	use time::macros;
	// self
	use super::*;
	use crate::auth::SubjectId;

	const KEY: &[u8] = b"unit-test-signing-key-0123456789ab";

	fn codec(leeway: Duration) -> TokenCodec {
		let key = SigningKey::new(KEY.to_vec()).expect("Signing key fixture should be valid.");

		TokenCodec::new(&key, leeway)
	}

	fn claims(issued_at: OffsetDateTime) -> AccessClaims {
		AccessClaims::new(
			SubjectId::new("u1").expect("Subject fixture should be valid."),
			Some("u1@example.com".into()),
			issued_at,
			Duration::minutes(15),
		)
	}

	#[test]
	fn minted_tokens_verify_until_expiry() {
		let codec = codec(Duration::ZERO);
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let claims = claims(issued);
		let token = codec.mint(&claims).expect("Minting should succeed.");

		assert_eq!(
			codec.verify_at(&token, issued + Duration::minutes(14)).expect("Token should verify."),
			claims
		);
		assert_eq!(
			codec.verify_at(&token, issued + Duration::minutes(15)),
			Err(CodecError::Expired)
		);
	}

	#[test]
	fn leeway_extends_acceptance_by_the_configured_skew() {
		let codec = codec(Duration::seconds(5));
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = codec.mint(&claims(issued)).expect("Minting should succeed.");
		let exp = issued + Duration::minutes(15);

		assert!(codec.verify_at(&token, exp + Duration::seconds(4)).is_ok());
		assert_eq!(codec.verify_at(&token, exp + Duration::seconds(5)), Err(CodecError::Expired));
	}

	#[test]
	fn foreign_keys_fail_signature_checks() {
		let issued = OffsetDateTime::now_utc();
		let other = TokenCodec::new(
			&SigningKey::new(b"another-signing-key-0123456789abcd".to_vec())
				.expect("Second key fixture should be valid."),
			Duration::ZERO,
		);
		let token = other.mint(&claims(issued)).expect("Minting should succeed.");

		assert_eq!(codec(Duration::ZERO).verify_at(&token, issued), Err(CodecError::InvalidSignature));
	}

	#[test]
	fn unexpected_algorithms_are_refused_before_signature_checks() {
		let issued = OffsetDateTime::now_utc();
		let token = jsonwebtoken::encode(
			&Header::new(Algorithm::HS512),
			&claims(issued),
			&EncodingKey::from_secret(KEY),
		)
		.expect("HS512 fixture should encode.");

		assert!(matches!(
			codec(Duration::ZERO).verify_at(&token, issued),
			Err(CodecError::AlgorithmMismatch { .. })
		));
	}

	#[test]
	fn unsigned_and_garbage_tokens_are_malformed() {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"u1","iat":0,"exp":9999999999}"#);
		let unsigned = format!("{header}.{payload}.");
		let codec = codec(Duration::ZERO);
		let now = OffsetDateTime::now_utc();

		assert_eq!(codec.verify_at(&unsigned, now), Err(CodecError::Malformed));
		assert_eq!(codec.verify_at("not-a-token", now), Err(CodecError::Malformed));
		assert_eq!(codec.verify_at("", now), Err(CodecError::Malformed));
	}

	#[test]
	fn short_keys_are_rejected() {
		assert_eq!(
			SigningKey::new(b"short".to_vec()).map(|_| ()),
			Err(ConfigError::WeakSigningKey { min: 32, actual: 5 })
		);
		assert_eq!(
			format!("{:?}", SigningKey::new(KEY.to_vec()).expect("Key fixture should be valid.")),
			"SigningKey(\"<redacted>\")"
		);
	}
}
