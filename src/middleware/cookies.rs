use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::config::AuthSettings;
use crate::session::SessionRecord;
use crate::types::{CookiePair, SessionId};

fn long_lived(name: &str, value: &str, settings: &AuthSettings) -> Cookie<'static> {
    Cookie::build((name.to_string(), value.to_string()))
        .http_only(true)
        .secure(settings.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::days(settings.session_ttl_days))
        .build()
}

/// Create removal cookie.
fn cleared(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Session id cookie, set as soon as a pending record exists.
pub(super) fn session_cookie(settings: &AuthSettings, session_id: &SessionId) -> Cookie<'static> {
    long_lived(&settings.session_cookie_name, session_id.as_str(), settings)
}

/// Session id, bearer access token and subject cookies of an authenticated record.
pub(super) fn add_session_cookies(
    jar: CookieJar,
    settings: &AuthSettings,
    record: &SessionRecord,
) -> CookieJar {
    jar.add(session_cookie(settings, &record.id))
        .add(long_lived(
            &settings.access_token_cookie_name,
            &record.access_token,
            settings,
        ))
        .add(long_lived(
            &settings.subject_cookie_name,
            record.subject_id.as_str(),
            settings,
        ))
}

/// Expire every cookie this service sets, whether or not the browser sent it.
pub(super) fn clear_session_cookies(jar: CookieJar, settings: &AuthSettings) -> CookieJar {
    jar.add(cleared(&settings.session_cookie_name))
        .add(cleared(&settings.access_token_cookie_name))
        .add(cleared(&settings.subject_cookie_name))
}

/// Session id from the cookie, falling back to the session header.
pub(super) fn session_id(
    jar: &CookieJar,
    headers: &HeaderMap,
    settings: &AuthSettings,
) -> Option<SessionId> {
    jar.get(&settings.session_cookie_name)
        .map(|c| c.value().to_string())
        .or_else(|| {
            headers
                .get(settings.session_header.as_str())
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .map(SessionId)
}

/// Session id and access token as presented by the caller. The access token
/// falls back to an `Authorization: Bearer` header.
pub(super) fn cookie_pair(jar: &CookieJar, headers: &HeaderMap, settings: &AuthSettings) -> CookiePair {
    let access_token = jar
        .get(&settings.access_token_cookie_name)
        .map(|c| c.value().to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty());

    CookiePair {
        session_id: session_id(jar, headers, settings),
        access_token,
    }
}
