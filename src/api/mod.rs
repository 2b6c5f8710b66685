// REST endpoints for the auth gateway

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::authenticator::AuthUser;
use crate::auth::middleware::{
    self as mw, append_set_cookie, clear_cookie, set_access_cookie, set_refresh_cookie,
};
use crate::auth::provider::ProviderError;
use crate::auth::roles::Role;
use crate::auth::token::{self, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::server::AppState;
use crate::types::UserId;

/// Assemble the gateway's routes.
///
/// `/api/v1/auth/*` is the public account surface; `/me` requires
/// authentication; `/api/v1/admin/*` additionally requires an admin role.
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/signup", post(sign_up))
        .route("/login", post(sign_in))
        .route("/refresh", post(refresh_session))
        .route("/logout", post(sign_out));

    let me = mw::protect(Router::new().route("/me", get(me)), state.clone());

    // Works for anonymous and signed-in callers alike; never rejects.
    let session = mw::attach_identity(
        Router::new().route("/session", get(session_info)),
        state.clone(),
    );

    let admin = mw::protect_with_roles(
        Router::new()
            .route("/users", post(upsert_user))
            .route("/users/{id}/role", put(set_role)),
        state.clone(),
        mw::ADMIN_ROLES,
    );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/auth", public.merge(me).merge(session))
        .nest("/api/v1/admin", admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Error envelope every handler speaks.
struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.error, "message": self.message })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpsertUserRequest {
    id: String,
    email: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetRoleRequest {
    role: String,
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn sign_up(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.email.is_empty() || body.password.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Signup failed",
            "Email and password are required",
        ));
    }

    let user = state
        .accounts
        .sign_up(&body.email, &body.password)
        .await
        .map_err(signup_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": user, "message": "User created successfully" })),
    ))
}

fn signup_error(e: ProviderError) -> ApiError {
    match &e {
        ProviderError::Transport(_) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            "Signup failed",
            "Cannot reach the identity provider. Please try again later.",
        ),
        ProviderError::Rejected { status: 429, .. } => ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Signup failed",
            "Too many signup attempts. Please wait and try again.",
        ),
        ProviderError::Rejected { status, message }
            if *status == 422 || message.to_lowercase().contains("already registered") =>
        {
            ApiError::new(
                StatusCode::CONFLICT,
                "Signup failed",
                "User already exists. Please sign in instead.",
            )
        }
        ProviderError::Rejected { message, .. } => {
            ApiError::new(StatusCode::BAD_REQUEST, "Signup failed", message.clone())
        }
        ProviderError::InvalidResponse(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Signup failed",
            "Unexpected provider response",
        ),
    }
}

async fn sign_in(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let (user, session) = state
        .accounts
        .sign_in(&body.email, &body.password)
        .await
        .map_err(login_error)?;

    let mut response = Json(json!({
        "user": user,
        "access_token": session.access_token.clone(),
        "expires_in": session.expires_in,
    }))
    .into_response();

    set_refresh_cookie(&mut response, &state.cookies, &session);
    set_access_cookie(&mut response, &state.cookies, &session);

    Ok(response)
}

fn login_error(e: ProviderError) -> ApiError {
    match &e {
        ProviderError::Transport(_) => ApiError::new(
            StatusCode::BAD_GATEWAY,
            "Login failed",
            "Cannot reach the identity provider. Please try again later.",
        ),
        ProviderError::Rejected { status: 429, .. } => ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Login failed",
            "Too many login attempts. Please wait and try again.",
        ),
        _ => ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials",
            "Email or password is incorrect",
        ),
    }
}

/// Silent session refresh from the httpOnly cookie.
///
/// In development the refresh token may come from the request body as a
/// convenience; production accepts the cookie only.
async fn refresh_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<Response, ApiError> {
    let from_cookie = token::resolve(&headers, None).refresh;
    let from_body = if state.environment.is_production() {
        None
    } else {
        body.and_then(|Json(b)| b.refresh_token)
            .map(crate::types::RefreshToken::new)
    };

    let Some(refresh_token) = from_cookie.clone().or(from_body) else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "No refresh token provided",
            "Please log in to access this resource",
        ));
    };

    let session = state.refresh.refresh(&refresh_token).await.map_err(|e| {
        warn!(error = %e, "session refresh rejected");
        ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Authentication required",
            "Please log in to access this resource",
        )
    })?;

    let mut response = Json(json!({
        "access_token": session.access_token.clone(),
        "expires_in": session.expires_in,
    }))
    .into_response();

    // Rotate the refresh cookie only when the provider actually returned a
    // different value; quick refresh successions otherwise churn the cookie
    // for nothing.
    let rotated = from_cookie
        .map(|incoming| incoming != session.refresh_token)
        .unwrap_or(true);
    if rotated {
        set_refresh_cookie(&mut response, &state.cookies, &session);
    }
    set_access_cookie(&mut response, &state.cookies, &session);

    Ok(response)
}

/// Revoke the current session and expire both cookies.
///
/// Revocation is best-effort: cookies are cleared even when the provider
/// call fails, so the client always ends signed out.
async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(access) = token::resolve(&headers, None).access
        && let Err(e) = state.accounts.sign_out(&access).await
    {
        warn!(error = %e, "provider sign-out failed");
    }

    let mut response = Json(json!({ "message": "Signed out" })).into_response();
    append_set_cookie(&mut response, &clear_cookie(ACCESS_TOKEN_COOKIE));
    append_set_cookie(&mut response, &clear_cookie(REFRESH_TOKEN_COOKIE));
    response
}

async fn me(Extension(user): Extension<AuthUser>) -> Json<AuthUser> {
    Json(user)
}

async fn session_info(user: Option<Extension<AuthUser>>) -> Json<Value> {
    Json(json!({ "user": user.map(|Extension(user)| user) }))
}

async fn upsert_user(
    State(state): State<AppState>,
    Json(body): Json<UpsertUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Canonicalize the supplied role label; legacy spellings are accepted
    // but never stored verbatim through this surface.
    let role = body
        .role
        .as_deref()
        .map(|raw| Role::normalize(Some(raw)).as_str());

    let record = state
        .directory
        .create_profile(&UserId::new(body.id), body.email.as_deref(), role)
        .await
        .map_err(|e| {
            warn!(error = %e, "user profile upsert failed");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Profile update failed",
                "Could not write the user profile",
            )
        })?;

    Ok((StatusCode::CREATED, Json(json!({ "user": record }))))
}

async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = UserId::new(id);
    let role = Role::normalize(Some(&body.role));

    state.directory.set_role(&user, role).await.map_err(|e| {
        warn!(user_id = %user, error = %e, "role update failed");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Role update failed",
            "Could not write the user role",
        )
    })?;

    Ok(Json(json!({ "user_id": user, "role": role })))
}
