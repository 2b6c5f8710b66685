//! Request middleware: authentication and role gates.
//!
//! Successful authentication inserts [`AuthUser`] into the request
//! extensions for downstream extractors. When the refresh path minted a new
//! session, the response gets a fresh readable `access_token` cookie so
//! later requests skip the refresh. Rejections are uniform: an
//! unauthenticated caller learns nothing about which carrier or provider
//! call failed.

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::authenticator::{AuthUser, Authenticated};
use crate::auth::provider::Session;
use crate::auth::roles::Role;
use crate::auth::token::{self, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::config::CookiePolicy;
use crate::server::AppState;

/// Roles that may enter the admin surface.
pub const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::SuperAdmin];

/// Gate a router behind authentication.
pub fn protect(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, require_auth))
}

/// Gate a router behind authentication plus a role requirement.
pub fn protect_with_roles(
    router: Router<AppState>,
    state: AppState,
    allowed: &'static [Role],
) -> Router<AppState> {
    // Layers run outermost-last: authentication first, then the role gate.
    router
        .layer(middleware::from_fn(move |req: Request, next: Next| {
            role_guard(allowed, req, next)
        }))
        .layer(middleware::from_fn_with_state(state, require_auth))
}

/// Attach identity when present without ever failing the request.
pub fn attach_identity(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, optional_auth))
}

async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let credentials = token::resolve(req.headers(), req.uri().query());

    match state.authenticator.authenticate(&credentials).await {
        Ok(Authenticated { user, issued }) => {
            debug!(user_id = %user.id, role = %user.role, "request authenticated");
            req.extensions_mut().insert(user);
            let mut response = next.run(req).await;
            if let Some(session) = issued {
                set_access_cookie(&mut response, &state.cookies, &session);
            }
            response
        }
        Err(e) => {
            warn!(path = %req.uri().path(), error = %e, "authentication failed");
            unauthenticated()
        }
    }
}

async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let credentials = token::resolve(req.headers(), req.uri().query());

    let issued = match state.authenticator.optional_authenticate(&credentials).await {
        Some(Authenticated { user, issued }) => {
            req.extensions_mut().insert(user);
            issued
        }
        None => None,
    };

    let mut response = next.run(req).await;
    if let Some(session) = issued {
        set_access_cookie(&mut response, &state.cookies, &session);
    }
    response
}

async fn role_guard(allowed: &'static [Role], req: Request, next: Next) -> Response {
    match req.extensions().get::<AuthUser>() {
        None => unauthenticated(),
        Some(user) if user.role.satisfies_any(allowed) => next.run(req).await,
        Some(user) => {
            warn!(
                user_id = %user.id,
                role = %user.role,
                path = %req.uri().path(),
                "insufficient role"
            );
            forbidden()
        }
    }
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Authentication required",
            "message": "Please log in to access this resource"
        })),
    )
        .into_response()
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Insufficient permissions",
            "message": "You do not have permission to access this resource"
        })),
    )
        .into_response()
}

/// Render a cookie with the gateway's attribute policy.
pub fn cookie_header(
    name: &str,
    value: &str,
    policy: &CookiePolicy,
    http_only: bool,
    max_age: Option<u64>,
) -> String {
    let mut cookie = format!("{name}={value}; Path=/; SameSite={}", policy.same_site.as_str());
    if policy.secure {
        cookie.push_str("; Secure");
    }
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={age}"));
    }
    cookie
}

/// Expire a cookie on the client.
pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0")
}

/// Append a `Set-Cookie` header to a response.
///
/// `append`, not `insert`: a response may legitimately set several cookies.
pub fn append_set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "dropping unrepresentable Set-Cookie header"),
    }
}

/// Readable access-token cookie. Lifetime follows the provider-reported
/// expiry when present, session-scoped otherwise.
pub fn set_access_cookie(response: &mut Response, policy: &CookiePolicy, session: &Session) {
    let cookie = cookie_header(
        ACCESS_TOKEN_COOKIE,
        session.access_token.as_str(),
        policy,
        false,
        session.expires_in,
    );
    append_set_cookie(response, &cookie);
}

/// httpOnly refresh-token cookie.
pub fn set_refresh_cookie(response: &mut Response, policy: &CookiePolicy, session: &Session) {
    let cookie = cookie_header(
        REFRESH_TOKEN_COOKIE,
        session.refresh_token.as_str(),
        policy,
        true,
        session.expires_in,
    );
    append_set_cookie(response, &cookie);
}
