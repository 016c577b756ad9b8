//! Authentication request handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::models::{AuthResponse, LoginRequest, LogoutResponse, RegisterRequest};
use crate::services::cookies::{self, REFRESH_COOKIE};

/// `POST /auth/register`: create an account and sign it in.
pub async fn register_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let session = state
        .auth
        .register(&body.email, &body.password, body.name.as_deref())
        .await?;
    let jar = cookies::set_session(jar, &session.tokens, state.config.cookie_secure);
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user: session.user.into(),
        }),
    ))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let session = state.auth.login(&body.email, &body.password).await?;
    let jar = cookies::set_session(jar, &session.tokens, state.config.cookie_secure);
    Ok((
        jar,
        Json(AuthResponse {
            user: session.user.into(),
        }),
    ))
}

/// `POST /auth/refresh`: exchange the refresh cookie for a new pair.
///
/// A token that cannot be rotated expires both cookies.
pub async fn refresh_handler(State(state): State<AppState>, jar: CookieJar) -> AppResult<Response> {
    let secure = state.config.cookie_secure;
    let Some(presented) = cookies::token_from(&jar, REFRESH_COOKIE) else {
        return Ok((cookies::clear_session(jar, secure), AppError::AuthenticationRequired)
            .into_response());
    };

    let rotation = match state.auth.refresh_tokens(&presented).await {
        Ok(rotation) => rotation,
        Err(e) if e.is_storage() => return Err(e.into()),
        Err(e) => {
            return Ok((cookies::clear_session(jar, secure), AppError::from(e)).into_response());
        }
    };

    // The presented token is spent now, so the successor goes out even if
    // the user lookup fails.
    let jar = cookies::set_session(jar, &rotation.tokens, secure);
    match state.auth.current_user(&rotation.payload.user_id).await {
        Ok(user) => Ok((jar, Json(AuthResponse { user: user.into() })).into_response()),
        Err(e) => Ok((jar, AppError::from(e)).into_response()),
    }
}

/// `POST /auth/logout`: revoke the presented refresh token and clear cookies.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<LogoutResponse>)> {
    let presented = cookies::token_from(&jar, REFRESH_COOKIE);
    state.auth.logout(presented.as_deref()).await?;
    let jar = cookies::clear_session(jar, state.config.cookie_secure);
    Ok((jar, Json(LogoutResponse { success: true })))
}

/// `GET /auth/me`: the signed-in user.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<AuthResponse>> {
    let user = state.auth.current_user(&current.id).await?;
    Ok(Json(AuthResponse { user: user.into() }))
}
