use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, LogoutResponse, PublicUser, RefreshRequest,
            RegisterRequest, UpdateProfileRequest,
        },
        repo_types::User,
        services::{
            hash_password, is_valid_email, validate_profile, verify_password, AuthUser, JwtKeys,
            TokenKind, MIN_PASSWORD_LEN,
        },
    },
    scan::pipeline,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn email_taken() -> (StatusCode, String) {
    (StatusCode::CONFLICT, "Email already registered".into())
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    e.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}

/// Interprets an email lookup: taken by someone other than `owner` is a
/// conflict, a failed lookup is an internal error.
fn ensure_email_free(
    lookup: anyhow::Result<Option<User>>,
    owner: Option<Uuid>,
) -> Result<(), (StatusCode, String)> {
    match lookup {
        Ok(Some(other)) if Some(other.id) != owner => {
            warn!(email = %other.email, "email already registered");
            Err(email_taken())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            Err(internal(e))
        }
    }
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.issue(user.id, TokenKind::Access).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        internal(e)
    })?;
    let refresh_token = keys.issue(user.id, TokenKind::Refresh).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        internal(e)
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();
    payload.name = payload.name.trim().to_string();

    if payload.name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Name is required".into()));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    validate_profile(&payload.profile).map_err(|m| (StatusCode::BAD_REQUEST, m))?;

    ensure_email_free(
        User::find_by_email(&state.db, &payload.email).await,
        None,
    )?;

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        internal(e)
    })?;

    let user = User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &hash,
        &payload.profile,
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            warn!(email = %payload.email, "email registered concurrently");
            return email_taken();
        }
        error!(error = %e, "create user failed");
        internal(e)
    })?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid email or password.".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(internal(e));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        internal(e)
    })?;

    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid email or password.".into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .decode(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    Ok(Json(issue_tokens(&state, user)?))
}

/// Drops any pending scan state for the caller, deleting an unconsumed upload.
#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Json<LogoutResponse> {
    pipeline::discard_session(&state, user_id).await;
    info!(%user_id, "user logged out");
    Json(LogoutResponse {
        status: "success",
        message: "You have been logged out.",
    })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            error!(user_id = %user_id, "user not found");
            (StatusCode::UNAUTHORIZED, "User not found".to_string())
        })?;

    Ok(Json(user.into()))
}

/// Applies the provided fields to `user`, re-hashing a new password.
fn apply_update(user: &mut User, payload: UpdateProfileRequest) -> Result<(), (StatusCode, String)> {
    validate_profile(&payload.profile).map_err(|m| (StatusCode::BAD_REQUEST, m))?;

    if let Some(name) = payload.name {
        let name = name.trim();
        if name.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "Name is required".into()));
        }
        user.name = name.to_string();
    }
    if let Some(email) = payload.email {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
        }
        user.email = email;
    }
    if let Some(password) = payload.password {
        if password.len() < MIN_PASSWORD_LEN {
            return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
        }
        user.password_hash = hash_password(&password).map_err(internal)?;
    }

    let p = payload.profile;
    if p.age.is_some() {
        user.age = p.age;
    }
    if p.gender.is_some() {
        user.gender = p.gender;
    }
    if p.health_conditions.is_some() {
        user.health_conditions = p.health_conditions;
    }
    if p.weight.is_some() {
        user.weight = p.weight;
    }
    if p.height.is_some() {
        user.height = p.height;
    }
    if p.dietary_preferences.is_some() {
        user.dietary_preferences = p.dietary_preferences;
    }
    if p.goal.is_some() {
        user.goal = p.goal;
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let mut user = User::find_by_id(&state.db, user_id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    let previous_email = user.email.clone();
    apply_update(&mut user, payload)?;

    if user.email != previous_email {
        ensure_email_free(
            User::find_by_email(&state.db, &user.email).await,
            Some(user.id),
        )?;
    }

    let saved = user.save(&state.db).await.map_err(|e| {
        if is_unique_violation(&e) {
            return email_taken();
        }
        error!(error = %e, %user_id, "profile update failed");
        internal(e)
    })?;
    info!(%user_id, "profile updated");
    Ok(Json(saved.into()))
}
