//! Session cookies: set, renew and clear the two httpOnly token cookies.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use parla_core::auth::jwt::{ACCESS_TOKEN_EXPIRY_SECS, REFRESH_TOKEN_EXPIRY_SECS};
use parla_core::models::auth::TokenPair;
use time::Duration;

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

fn session_cookie(name: &'static str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Build the access token cookie (15 minutes).
pub fn access_cookie(token: &str, secure: bool) -> Cookie<'static> {
    session_cookie(
        ACCESS_COOKIE,
        token.to_string(),
        Duration::seconds(ACCESS_TOKEN_EXPIRY_SECS),
        secure,
    )
}

/// Build the refresh token cookie (7 days).
pub fn refresh_cookie(token: &str, secure: bool) -> Cookie<'static> {
    session_cookie(
        REFRESH_COOKIE,
        token.to_string(),
        Duration::seconds(REFRESH_TOKEN_EXPIRY_SECS),
        secure,
    )
}

/// Build an expired, empty cookie that makes the browser drop `name`.
pub fn cleared_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    session_cookie(name, String::new(), Duration::ZERO, secure)
}

/// Read a cookie value, treating empty values as absent.
pub fn token_from(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Add both token cookies to the response jar.
pub fn set_session(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(access_cookie(&tokens.access_token, secure))
        .add(refresh_cookie(&tokens.refresh_token, secure))
}

/// Expire both token cookies.
pub fn clear_session(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(cleared_cookie(ACCESS_COOKIE, secure))
        .add(cleared_cookie(REFRESH_COOKIE, secure))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_cookie_attributes() {
        let cookie = access_cookie("abc", false);
        assert_eq!(cookie.name(), "access_token");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(900)));
        assert_ne!(cookie.secure(), Some(true));
    }

    #[test]
    fn refresh_cookie_lives_seven_days() {
        let cookie = refresh_cookie("xyz", true);
        assert_eq!(cookie.name(), "refresh_token");
        assert_eq!(cookie.max_age(), Some(Duration::seconds(604_800)));
        assert_eq!(cookie.secure(), Some(true));
    }

    #[test]
    fn cleared_cookie_is_empty_and_expired() {
        let cookie = cleared_cookie(REFRESH_COOKIE, false);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn empty_cookie_values_are_absent() {
        let jar = CookieJar::new()
            .add(Cookie::new(ACCESS_COOKIE, ""))
            .add(Cookie::new(REFRESH_COOKIE, "r"));
        assert_eq!(token_from(&jar, ACCESS_COOKIE), None);
        assert_eq!(token_from(&jar, REFRESH_COOKIE).as_deref(), Some("r"));
        assert_eq!(token_from(&jar, "other"), None);
    }

    #[test]
    fn session_sets_both_cookies() {
        let tokens = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        };
        let jar = set_session(CookieJar::new(), &tokens, false);
        assert_eq!(jar.get(ACCESS_COOKIE).map(|c| c.value()), Some("a"));
        assert_eq!(jar.get(REFRESH_COOKIE).map(|c| c.value()), Some("r"));
    }
}
