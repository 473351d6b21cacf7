//! Refresh token records, access token claims, and the secrets that back them.

pub mod claims;
pub mod record;
pub mod secret;
