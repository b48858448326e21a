//! Authentication and user routes

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use super::session::{
    cookie_value, expired_session_cookie, login_state_cookie, session_cookie, session_id,
    EXPIRED_LOGIN_STATE_COOKIE, LOGIN_STATE_COOKIE,
};
use super::AppState;
use crate::auth::{AuthError, OAuthStrategy};
use crate::users::{save_oauth_user_profile, User, UserRepository};

/// Where failed logins land
pub const SIGNIN_PATH: &str = "/authentication/signin";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// 302 redirect
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn signin_with_error(err: &AuthError) -> Response {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("err", &err.to_string())
        .finish();
    found(&format!("{}?{}", SIGNIN_PATH, query))
}

/// Look up the user behind the request's session cookie
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let sid = session_id(headers)?;
    let user_id = state.sessions.user_id(&sid)?;
    match state.users.get(user_id).await {
        Ok(user) => user,
        Err(e) => {
            error!("Failed to load session user {}: {:#}", user_id, e);
            None
        }
    }
}

/// GET /api/auth/:strategy
///
/// Remembers where to go afterwards and sends the browser to the provider. The
/// state token is also set as a cookie so the callback only completes in this browser.
pub async fn oauth_call(
    State(state): State<AppState>,
    Path(strategy_name): Path<String>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let Some(strategy) = state.strategies.get(&strategy_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let login_state = state.pending.start(strategy.name(), query.redirect_to);
    match strategy.authorization_url(&login_state) {
        Ok(url) => {
            debug!(strategy = strategy.name(), "Redirecting to provider");
            (
                StatusCode::FOUND,
                [
                    (header::LOCATION, url),
                    (header::SET_COOKIE, login_state_cookie(&login_state)),
                ],
            )
                .into_response()
        }
        Err(e) => {
            error!(strategy = strategy.name(), "Cannot build authorization URL: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/auth/:strategy/callback
///
/// Completes the login started by [`oauth_call`]. The login state cookie is
/// cleared whatever the outcome.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(strategy_name): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(strategy) = state.strategies.get(&strategy_name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = complete_login(&state, strategy.as_ref(), query, &headers).await;
    response.headers_mut().append(
        header::SET_COOKIE,
        HeaderValue::from_static(EXPIRED_LOGIN_STATE_COOKIE),
    );
    response
}

async fn complete_login(
    state: &AppState,
    strategy: &dyn OAuthStrategy,
    query: CallbackQuery,
    headers: &HeaderMap,
) -> Response {
    if let Some(provider_error) = &query.error {
        warn!(
            strategy = strategy.name(),
            error = %provider_error,
            description = ?query.error_description,
            "Provider refused the login"
        );
        return found(SIGNIN_PATH);
    }

    let browser_state = cookie_value(headers, LOGIN_STATE_COOKIE);
    let redirect_to = match query
        .state
        .as_deref()
        .and_then(|s| state.pending.finish(strategy.name(), s, browser_state.as_deref()))
    {
        Some(redirect_to) => redirect_to,
        None => {
            warn!(strategy = strategy.name(), "Callback with unknown or foreign login state");
            return signin_with_error(&AuthError::InvalidState);
        }
    };

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return found(SIGNIN_PATH);
    };

    let profile = match strategy.authenticate(code).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(strategy = strategy.name(), "Authentication failed: {}", e);
            return signin_with_error(&e);
        }
    };

    let signed_in = current_user(state, headers).await;
    let (user, info) = match save_oauth_user_profile(
        state.users.as_ref(),
        signed_in.as_ref(),
        profile,
        redirect_to.as_deref(),
    )
    .await
    {
        Ok(saved) => saved,
        Err(e) => {
            warn!(strategy = strategy.name(), "Could not save provider profile: {}", e);
            return signin_with_error(&e);
        }
    };

    let sid = state.sessions.create(user.id);
    info!(user_id = %user.id, strategy = strategy.name(), "User signed in");

    let location = info.redirect_to.unwrap_or_else(|| "/".to_string());
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::SET_COOKIE, session_cookie(&sid)),
        ],
    )
        .into_response()
}

/// GET /api/auth/signout
pub async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(sid) = session_id(&headers) {
        state.sessions.remove(&sid);
    }
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, expired_session_cookie()),
        ],
    )
        .into_response()
}

/// GET /api/users/me
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match current_user(&state, &headers).await {
        Some(user) => Json(user).into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "User is not signed in" })),
        )
            .into_response(),
    }
}
