use axum_extra::extract::cookie::{Cookie, SameSite};
use time::{Duration, OffsetDateTime};

pub const SESSION_COOKIE: &str = "jwt";

/// Value written over the session cookie on logout.
pub const LOGGED_OUT: &str = "loggedout";

const LOGOUT_COOKIE_SECONDS: i64 = 10;

/// HTTP-only session cookie; `secure` is set outside development.
pub fn session_cookie(token: String, lifetime_days: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .expires(OffsetDateTime::now_utc() + Duration::days(lifetime_days))
        .build()
}

/// Short-lived placeholder that replaces the session cookie.
pub fn logout_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, LOGGED_OUT))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .expires(OffsetDateTime::now_utc() + Duration::seconds(LOGOUT_COOKIE_SECONDS))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("abc".into(), 90, true);
        assert_eq!(cookie.name(), "jwt");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        let expires = cookie.expires_datetime().unwrap();
        assert!(expires > OffsetDateTime::now_utc() + Duration::days(89));
    }

    #[test]
    fn logout_cookie_expires_quickly() {
        let cookie = logout_cookie(false);
        assert_eq!(cookie.value(), LOGGED_OUT);
        assert_eq!(cookie.secure(), Some(false));
        assert!(cookie.expires_datetime().unwrap() <= OffsetDateTime::now_utc() + Duration::seconds(10));
    }
}
