// ============================================================================
// Axum Middleware
// ============================================================================
//
// TTL policy enforcement for every request carrying a session cookie:
// - Idle clock: the store's own expiry on the session record. Reads do
//   not refresh it (rolling renewal on anonymous read traffic is
//   deliberately disabled); only state-changing writes re-arm it.
// - Absolute clock: checked here on every request, independent of route.
//   A session past its absolute age is destroyed and rejected even if it
//   was idle-refreshed a second ago.
//
// ============================================================================

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::WardenError;
use crate::sessions::SessionStatus;
use crate::store::Store;
use crate::Warden;

/// Owning user id of a validated session, attached as a request extension
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionUser(pub String);

/// Session TTL enforcement middleware
///
/// Requests without a session cookie pass through untouched. A session
/// rejected by the absolute clock gets a 401 with the cookie cleared; a
/// cookie pointing at a record the store no longer has passes through
/// with the cookie cleared, leaving the anonymous-vs-authenticated
/// decision to the downstream handler. Store failures propagate as
/// server errors: enforcement fails closed.
pub async fn enforce_session_ttl<S: Store + 'static>(
    State(warden): State<Arc<Warden<S>>>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie_name = warden.config().cookie_name.clone();
    let Some(session_id) = session_cookie(req.headers(), &cookie_name) else {
        return next.run(req).await;
    };

    match warden.sessions().validate_session(&session_id).await {
        Ok(SessionStatus::Active { user_id }) => {
            req.extensions_mut().insert(SessionUser(user_id));
            next.run(req).await
        }
        Ok(SessionStatus::Expired) => {
            let mut response = WardenError::SessionExpired.into_response();
            clear_session_cookie(response.headers_mut(), &cookie_name);
            response
        }
        Ok(SessionStatus::Missing) => {
            let mut response = next.run(req).await;
            clear_session_cookie(response.headers_mut(), &cookie_name);
            response
        }
        Err(e) => e.into_response(),
    }
}

/// Extract the session id from the Cookie header
fn session_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookies = headers.get(header::COOKIE).and_then(|v| v.to_str().ok())?;
    for cookie in cookies.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix(&format!("{}=", cookie_name)) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn clear_session_cookie(headers: &mut HeaderMap, cookie_name: &str) {
    // A handler that just issued a fresh session cookie on this response
    // (login) wins; clearing here would log the user straight back out.
    let prefix = format!("{}=", cookie_name);
    let already_set = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.to_str().map(|s| s.starts_with(&prefix)).unwrap_or(false));
    if already_set {
        return;
    }
    let cleared = format!("{}=; Max-Age=0; Path=/; HttpOnly", cookie_name);
    if let Ok(value) = HeaderValue::from_str(&cleared) {
        headers.append(header::SET_COOKIE, value);
    }
}
