//! Session middleware: cookie extraction, verification and silent renewal.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use parla_core::auth::session::SessionOutcome;
use parla_core::models::auth::UserId;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE};

/// Identity of the signed-in user, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
}

/// Axum middleware: reads the session cookies, authenticates the request and
/// injects [`CurrentUser`] into request extensions.
///
/// When the refresh token had to be rotated the new cookies are appended to
/// the handler's response. Rejections answer 401 and expire both cookies.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let access = cookies::token_from(&jar, ACCESS_COOKIE);
    let refresh = cookies::token_from(&jar, REFRESH_COOKIE);
    let secure = state.config.cookie_secure;

    let outcome = state
        .auth
        .authenticate(access.as_deref(), refresh.as_deref())
        .await?;

    let identity = match outcome {
        SessionOutcome::Authenticated(identity) => identity,
        SessionOutcome::Rejected(rejection) => {
            debug!(?rejection, path = %request.uri().path(), "request rejected");
            let jar = cookies::clear_session(jar, secure);
            return Ok((jar, AppError::from(rejection)).into_response());
        }
    };

    request.extensions_mut().insert(CurrentUser {
        id: identity.user_id,
        email: identity.email,
    });
    let response = next.run(request).await;

    Ok(match identity.renewed {
        Some(tokens) => {
            debug!(user_id = %identity.user_id, "session renewed");
            (cookies::set_session(jar, &tokens, secure), response).into_response()
        }
        None => response,
    })
}
