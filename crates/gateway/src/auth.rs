//! Session gate and account routes.
//!
//! Handlers that need a signed-in user take a [`CurrentUser`]. Without a live
//! session, background calls (the `ajax=true` query flag, an
//! `X-Requested-With: XMLHttpRequest` header or a JSON body) get a 401 JSON
//! body; page loads are redirected to `/login`.

use axum::extract::{FromRequestParts, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use crabai_core::conversation::UserId;
use crabai_core::error::{AuthError, Error};
use crabai_security::SESSION_COOKIE;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error};

use crate::{ApiError, ErrorResponse, SharedState, api_error};

/// The authenticated user of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: UserId,
    pub username: String,
}

/// Why a request was turned away at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Background call: answer with 401 JSON
    Background,
    /// Page load: send to the login page
    Page,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Background => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::auth(AuthError::Unauthenticated.to_string())),
            )
                .into_response(),
            Self::Page => Redirect::to("/login").into_response(),
        }
    }
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers);
        match state.accounts.authenticate(token.as_deref()) {
            Ok(session) => Ok(Self {
                user_id: session.user_id,
                username: session.username,
            }),
            Err(_) => {
                debug!(path = %parts.uri.path(), "Unauthenticated request");
                if is_background(parts) {
                    Err(AuthRejection::Background)
                } else {
                    Err(AuthRejection::Page)
                }
            }
        }
    }
}

/// Whether the caller expects JSON rather than a page.
pub(crate) fn is_background(parts: &Parts) -> bool {
    let ajax_flag = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.get("ajax").cloned())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    ajax_flag || wants_json(&parts.headers)
}

pub(crate) fn wants_json(headers: &HeaderMap) -> bool {
    let requested_with = headers
        .get("X-Requested-With")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
    let json_body = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    requested_with || json_body
}

/// The session token from the cookie, or from `Authorization: Bearer`.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
    })
}

fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

// --- Handlers ---

#[derive(Debug, Deserialize)]
pub(crate) struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

fn account_error(e: Error) -> ApiError {
    match e {
        Error::Auth(auth @ AuthError::UsernameTaken) => {
            api_error(StatusCode::CONFLICT, auth.to_string())
        }
        Error::Auth(auth) => api_error(StatusCode::UNAUTHORIZED, auth.to_string()),
        Error::Validation(v) => api_error(StatusCode::BAD_REQUEST, v.to_string()),
        other => {
            error!(error = %other, "Account operation failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

pub(crate) async fn signup_page() -> &'static str {
    "Sign up by POSTing a form with username and password to /signup"
}

pub(crate) async fn login_page() -> &'static str {
    "Log in by POSTing a form with username and password to /login"
}

pub(crate) async fn signup_handler(
    State(state): State<SharedState>,
    Form(form): Form<Credentials>,
) -> Result<Redirect, ApiError> {
    state
        .accounts
        .signup(&form.username, &form.password)
        .await
        .map_err(account_error)?;
    Ok(Redirect::to("/login"))
}

pub(crate) async fn login_handler(
    State(state): State<SharedState>,
    Form(form): Form<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let token = state
        .accounts
        .login(&form.username, &form.password)
        .await
        .map_err(account_error)?;

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie(&token))]),
        Redirect::to("/app"),
    ))
}

pub(crate) async fn logout_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.accounts.logout(&token);
    }
    (
        AppendHeaders([(SET_COOKIE, expired_cookie())]),
        Redirect::to("/login"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_from_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; crabai_session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(session_token(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn no_token_without_headers() {
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn background_detection() {
        let (parts, _) = axum::http::Request::builder()
            .uri("/run?query=x&ajax=true")
            .body(())
            .unwrap()
            .into_parts();
        assert!(is_background(&parts));

        let (parts, _) = axum::http::Request::builder()
            .uri("/run?query=x")
            .header("X-Requested-With", "XMLHttpRequest")
            .body(())
            .unwrap()
            .into_parts();
        assert!(is_background(&parts));

        let (parts, _) = axum::http::Request::builder()
            .uri("/app")
            .body(())
            .unwrap()
            .into_parts();
        assert!(!is_background(&parts));
    }
}
