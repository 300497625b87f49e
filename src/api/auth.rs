//! Session authentication.
//!
//! Logging in issues a random opaque token. Only its HMAC under the configured
//! session secret is stored, so a leaked database does not leak live sessions.
//! The token travels as the `session` cookie or as a bearer token.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::validation::{parse_choice, required_text, validate_email, validate_password, MAX_NAME_LEN};
use crate::config::AuthConfig;
use crate::db::{
    ClassName, LoginRequest, LoginResponse, NewUser, RegisterRequest, Role, Store, User, UserResponse,
};
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

type HmacSha256 = Hmac<Sha256>;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Keyed hash of a token, as stored in `sessions.token_hash`
fn hash_token(secret: &str, token: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        // HMAC accepts keys of any length
        Err(_) => unreachable!("HMAC key rejected"),
    };
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Bearer token first, then the session cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

fn session_cookie(token: String, config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Resolve the request's session to its user, if any
async fn session_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    let Some(token) = extract_token(headers) else {
        return Ok(None);
    };
    let token_hash = hash_token(state.config.auth.session_key(), &token);
    Ok(state.store.user_for_session(&token_hash).await?)
}

async fn start_session(state: &AppState, user: &User) -> Result<String, ApiError> {
    let token = generate_token();
    let expires_at = (Utc::now() + Duration::hours(state.config.auth.session_ttl_hours))
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    state
        .store
        .create_session(user.id, &hash_token(state.config.auth.session_key(), &token), &expires_at)
        .await?;
    Ok(token)
}

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let user = state
        .store
        .find_user_by_email(&request.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&request.password, &user.password_hash) {
        warn!(user_id = user.id, "Failed login attempt");
        return Err(invalid());
    }

    let token = start_session(&state, &user).await?;
    info!(user_id = user.id, "User logged in");

    let jar = jar.add(session_cookie(token.clone(), &state.config.auth));
    Ok((
        jar,
        Json(LoginResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// POST /api/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    if let Some(token) = extract_token(&headers) {
        state
            .store
            .delete_session(&hash_token(state.config.auth.session_key(), &token))
            .await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

/// GET /api/user
pub async fn current_user(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

fn validate_register_request(req: &RegisterRequest, first_user: bool) -> Result<NewUser, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let email = errors.check("email", validate_email(req.email.as_deref()));
    let password = errors.check("password", validate_password(req.password.as_deref()));
    let name = errors.check("name", required_text("Name", req.name.as_deref(), MAX_NAME_LEN));

    let role = if first_user {
        Some(Role::Admin)
    } else {
        match req.role.as_deref() {
            None | Some("") => Some(Role::Teacher),
            Some(role) => errors.check("role", role.parse::<Role>()),
        }
    };

    let mut classes = BTreeSet::new();
    for class in req.assigned_classes.iter().flatten() {
        if let Some(class) = errors.check("assignedClasses", parse_choice::<ClassName>("Class", Some(class))) {
            classes.insert(class);
        }
    }

    errors.finish()?;
    let (Some(email), Some(password), Some(name), Some(role)) = (email, password, name, role) else {
        return Err(ApiError::bad_request("Invalid registration"));
    };
    let password_hash =
        hash_password(&password).map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    Ok(NewUser {
        email,
        password_hash,
        name,
        role,
        assigned_classes: if role == Role::Admin { BTreeSet::new() } else { classes },
    })
}

/// POST /api/register
///
/// Open while no account exists (the first account becomes an admin),
/// admin-only afterwards.
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let first_user = state.store.count_users().await? == 0;
    if !first_user {
        let caller = session_user(&state, &headers)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        if !caller.is_admin() {
            return Err(ApiError::forbidden("Only administrators can register users"));
        }
    }

    let new_user = validate_register_request(&request, first_user)?;
    if state.store.find_user_by_email(&new_user.email).await?.is_some() {
        return Err(ApiError::conflict("A user with this email already exists"));
    }

    let user = state.store.create_user(new_user).await?;
    info!(user_id = user.id, role = %user.role, "Registered user");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Rejects requests without a valid session and makes the user available to handlers
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = session_user(&state, request.headers())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extractor for the authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(user.clone());
        }
        session_user(state, &parts.headers)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Create the configured bootstrap admin if it does not exist yet
pub async fn ensure_admin_user(store: &Store, config: &AuthConfig) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (config.admin_email.as_deref(), config.admin_password.as_deref()) else {
        return Ok(());
    };

    let email = validate_email(Some(email)).map_err(anyhow::Error::msg)?;
    if store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;
    let user = store
        .create_user(NewUser {
            email,
            password_hash,
            name: config.admin_name.clone(),
            role: Role::Admin,
            assigned_classes: BTreeSet::new(),
        })
        .await?;
    info!(user_id = user.id, "Created admin user {}", user.email);
    Ok(())
}
