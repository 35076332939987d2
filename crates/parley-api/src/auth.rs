use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, response::IntoResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use parley_db::Database;
use parley_types::api::{
    AuthRequest, AuthResponse, Claims, ForgotPasswordRequest, ResetPasswordRequest, WorkspaceClaim,
};
use parley_types::models::{User, Workspace};

use crate::error::{ApiError, ApiResult, require_text};
use crate::state::{AppState, with_db};

/// Session tokens are valid for a week.
const TOKEN_TTL_DAYS: i64 = 7;

/// Password reset codes are valid for a quarter of an hour.
const RESET_CODE_TTL_MINUTES: i64 = 15;

/// Plaintext reset codes go only to this log target, which the server
/// silences unless the operator turns it on through `RUST_LOG`.
pub const RESET_CODE_LOG_TARGET: &str = "parley::reset_codes";

/// Workspace slug for a new user: the email's local part, lowercased, with
/// every run of other characters collapsed into one hyphen.
pub fn workspace_slug(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut slug = String::with_capacity(local.len());
    let mut in_gap = false;
    for c in local.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            in_gap = false;
        } else if !in_gap {
            slug.push('-');
            in_gap = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("workspace");
    }
    slug
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Upstream(anyhow::anyhow!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> ApiResult<()> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        warn!("Unparseable password hash in store: {}", e);
        ApiError::InvalidCredentials
    })?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}

pub(crate) fn hash_reset_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Log in an existing user or register a new one, then make sure the user
/// owns a workspace.
pub fn register_or_login(db: &Database, email: &str, password: &str) -> ApiResult<(User, Workspace)> {
    let email = normalize_email(email);
    require_text("email", &email)?;
    if password.is_empty() {
        return Err(ApiError::BadRequest("password is required".into()));
    }

    let user = match db.get_user_by_email(&email)? {
        Some(user) => {
            verify_password(password, &user.password_hash)?;
            user
        }
        None => {
            let hash = hash_password(password)?;
            match db.create_user(&email, &hash)? {
                Some(user) => {
                    info!("Registered {}", email);
                    user
                }
                // Lost a race with a concurrent signup for the same email.
                None => {
                    let user = db
                        .get_user_by_email(&email)?
                        .ok_or_else(|| anyhow::anyhow!("user {} missing after conflict", email))?;
                    verify_password(password, &user.password_hash)?;
                    user
                }
            }
        }
    };

    let workspace = db.ensure_workspace(user.id, &workspace_slug(&email))?;
    Ok((user.into(), workspace.into()))
}

pub fn sign_token(secret: &str, user: &User, workspace: &Workspace) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        ws: WorkspaceClaim::from(workspace),
        exp: (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// POST /api/auth/signup and /api/auth/login. Both register on first use.
pub async fn authenticate(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, workspace) =
        with_db(&state, move |db| register_or_login(db, &req.email, &req.password)).await?;

    let token = sign_token(&state.jwt_secret, &user, &workspace)?;

    Ok(Json(AuthResponse {
        token,
        user,
        workspace,
    }))
}

/// Issue a reset code when `email` belongs to a user. The code is returned
/// for the caller to relay and written only to [`RESET_CODE_LOG_TARGET`].
pub fn issue_reset_code(db: &Database, email: &str) -> ApiResult<Option<String>> {
    let email = normalize_email(email);
    if db.get_user_by_email(&email)?.is_none() {
        return Ok(None);
    }

    let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
    let expires_at = Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES);
    db.create_password_reset(&email, &hash_reset_code(&code), expires_at)?;

    // No mail transport: the operator relays the code.
    info!("Password reset code issued for {}", email);
    debug!(target: RESET_CODE_LOG_TARGET, "Reset code for {}: {}", email, code);
    Ok(Some(code))
}

/// POST /api/auth/forgot. Answers the same whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    with_db(&state, move |db| issue_reset_code(db, &req.email)).await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/auth/reset
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.new_password.is_empty() {
        return Err(ApiError::BadRequest("newPassword is required".into()));
    }
    let email = normalize_email(&req.email);
    let code_hash = hash_reset_code(req.code.trim());

    with_db(&state, move |db| {
        let invalid = || ApiError::BadRequest("invalid or expired code".into());

        let user = db.get_user_by_email(&email)?.ok_or_else(invalid)?;
        if !db.consume_password_reset(&email, &code_hash, Utc::now())? {
            return Err(invalid());
        }

        let hash = hash_password(&req.new_password)?;
        db.update_password(user.id, &hash)?;
        info!("Password reset for {}", email);
        Ok(())
    })
    .await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}
