//! HTTP surface over [`SessionBroker`].
//!
//! Routes:
//!
//! - `POST /auth/exchange` with `{"idToken": "..."}`; rate limited.
//! - `POST /auth/refresh` reading the refresh cookie; rate limited.
//! - `POST /auth/logout` reading the refresh cookie.
//! - `GET /profile` behind the bearer gate.
//! - `GET /health`.
//!
//! Every refusal collapses to its [`ErrorClass`] status; the precise failure kind only reaches
//! logs and metrics. The router must be served with connect info (see [`serve`]); without a
//! peer address the rate guard fails closed.

// std
use std::net::SocketAddr;
// crates.io
use axum::{
	Extension, Json, Router,
	extract::{ConnectInfo, Request, State, rejection::JsonRejection},
	http::{
		HeaderMap, HeaderValue, StatusCode,
		header::{AUTHORIZATION, COOKIE, RETRY_AFTER, SET_COOKIE},
	},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	auth::SubjectId,
	config::CookiePolicy,
	error::{ConfigError, ErrorClass},
	guard::{ClientKey, RateDecision, RateGuard},
	session::{IssuedSession, SessionBroker},
};

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
	broker: Arc<SessionBroker>,
	guard: Arc<RateGuard>,
	cookie: Arc<CookiePolicy>,
}
impl AppState {
	/// Bundles the collaborators the handlers need.
	pub fn new(broker: Arc<SessionBroker>, guard: Arc<RateGuard>, cookie: CookiePolicy) -> Self {
		Self { broker, guard, cookie: Arc::new(cookie) }
	}
}

/// Subject attached to a request by the bearer gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedSubject {
	/// Verified subject.
	pub subject: SubjectId,
	/// Email claim carried by the access token.
	pub email: Option<String>,
}

/// Builds the router with every route and middleware wired.
pub fn router(state: AppState) -> Router {
	let issuance = Router::new()
		.route("/auth/exchange", post(exchange))
		.route("/auth/refresh", post(refresh))
		.route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));
	let protected = Router::new()
		.route("/profile", get(profile))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

	Router::new()
		.route("/health", get(health))
		.route("/auth/logout", post(logout))
		.merge(issuance)
		.merge(protected)
		.with_state(state)
}

/// Serves `router` on `listener`, exposing peer addresses to the rate guard.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
	axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await
}

#[derive(Deserialize)]
struct ExchangeRequest {
	#[serde(rename = "idToken", alias = "id_token")]
	id_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
	access_token: String,
}

#[derive(Serialize)]
struct ProfileResponse {
	subject: SubjectId,
	#[serde(skip_serializing_if = "Option::is_none")]
	email: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
	error: &'static str,
}

/// Boundary wrapper rendering [`Error`] without leaking its detail.
#[derive(Debug)]
pub struct ApiError(pub Error);
impl From<Error> for ApiError {
	fn from(e: Error) -> Self {
		Self(e)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, label) = match self.0.class() {
			ErrorClass::Client => (StatusCode::BAD_REQUEST, "bad_request"),
			ErrorClass::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
			ErrorClass::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
			ErrorClass::Dependency => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
		};
		let mut response = (status, Json(ErrorBody { error: label })).into_response();

		if let Error::RateLimited(directive) = &self.0 {
			response
				.headers_mut()
				.insert(RETRY_AFTER, HeaderValue::from(directive.retry_after_secs()));
		}

		response
	}
}

async fn health() -> &'static str {
	"ok"
}

async fn exchange(
	State(state): State<AppState>,
	payload: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
	let Json(request) = payload.map_err(|e| Error::BadRequest { reason: e.body_text() })?;
	let session = state.broker.exchange(&request.id_token).await?;

	session_response(&state, session)
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
	let secret = read_cookie(&headers, &state.cookie.name).ok_or(Error::MissingCredential)?;
	let session = state.broker.refresh(&secret).await?;

	session_response(&state, session)
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
	let secret = read_cookie(&headers, &state.cookie.name).ok_or(Error::MissingCredential)?;
	// Store failures are logged by the broker; the browser credential is dropped regardless.
	let _outcome = state.broker.logout(&secret).await;
	let clear = header_value(state.cookie.clear_cookie())?;

	Ok((StatusCode::OK, [(SET_COOKIE, clear)]).into_response())
}

async fn profile(Extension(caller): Extension<AuthenticatedSubject>) -> Json<ProfileResponse> {
	Json(ProfileResponse { subject: caller.subject, email: caller.email })
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
	let Some(ConnectInfo(peer)) = request.extensions().get::<ConnectInfo<SocketAddr>>().copied()
	else {
		#[cfg(feature = "tracing")]
		tracing::error!(path = %request.uri().path(), "Peer address missing; refusing request.");

		return ApiError(Error::ClientKeyUnavailable).into_response();
	};
	let key = ClientKey::from_peer(peer);

	match state.guard.admit(key) {
		RateDecision::Allow => next.run(request).await,
		RateDecision::Reject(directive) => {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				client = %key,
				path = %request.uri().path(),
				"Request budget exhausted."
			);

			ApiError(Error::RateLimited(directive)).into_response()
		},
	}
}

async fn require_bearer(
	State(state): State<AppState>,
	mut request: Request,
	next: Next,
) -> Result<Response, ApiError> {
	let token = bearer_token(request.headers()).ok_or(Error::MissingCredential)?;
	let claims = state.broker.authenticate(&token)?;

	request
		.extensions_mut()
		.insert(AuthenticatedSubject { subject: claims.sub, email: claims.email });

	Ok(next.run(request).await)
}

fn session_response(state: &AppState, session: IssuedSession) -> Result<Response, ApiError> {
	let cookie = header_value(
		state
			.cookie
			.set_cookie(session.refresh_secret.expose(), state.broker.config().refresh_ttl),
	)?;

	Ok((
		StatusCode::OK,
		[(SET_COOKIE, cookie)],
		Json(SessionResponse { access_token: session.access_token }),
	)
		.into_response())
}

fn header_value(value: String) -> Result<HeaderValue, ApiError> {
	HeaderValue::try_from(value).map_err(|_| {
		ApiError(Error::Config(ConfigError::InvalidCookie {
			field: "value",
			value: "<redacted>".into(),
		}))
	})
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
	headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(';'))
		.filter_map(|pair| pair.trim().split_once('='))
		.find(|(key, _)| key.trim() == name)
		.map(|(_, value)| value.trim().to_owned())
		.filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
	let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?.trim();

	if token.is_empty() { None } else { Some(token.to_owned()) }
}
