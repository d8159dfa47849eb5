use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, MessageResponse, ProfileResponse, PublicUser,
            RegisterRequest, UpdateProfileRequest, UserResponse,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        password::{HashedPassword, PlaintextPassword},
        repo_types::{NewUser, User, UserType},
    },
    error::AuthError,
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_registration(mut payload: RegisterRequest) -> RegisterRequest {
    payload.name = payload.name.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();
    payload.address = payload.address.trim().to_string();
    payload.phone = payload
        .phone
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    payload.avatar = payload
        .avatar
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    payload
}

fn validate_registration(payload: &RegisterRequest) -> Result<(), AuthError> {
    if payload.name.is_empty()
        || payload.email.is_empty()
        || payload.password.is_empty()
        || payload.address.is_empty()
    {
        return Err(AuthError::Validation(
            "Name, email, password, and address are required".into(),
        ));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(
            "Password must be at least 6 characters long".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        return Err(AuthError::Validation("Invalid email".into()));
    }
    // Admin accounts are provisioned administratively, never self-registered.
    if payload.user_type == UserType::Admin {
        return Err(AuthError::Validation("Invalid user type".into()));
    }
    Ok(())
}

async fn hash_on_blocking_pool(password: PlaintextPassword) -> Result<HashedPassword, AuthError> {
    // Argon2 is deliberately expensive; keep it off the async workers.
    tokio::task::spawn_blocking(move || HashedPassword::from_plaintext(&password))
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
        .map_err(AuthError::Internal)
}

async fn verify_on_blocking_pool(
    hash: HashedPassword,
    password: PlaintextPassword,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || hash.verify(&password))
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
        .map_err(AuthError::Internal)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let payload = normalize_registration(payload);
    validate_registration(&payload)?;

    // Friendly-path duplicate check; the unique index in the repo is the
    // guarantee when two registrations race past this.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        return Err(AuthError::DuplicateEmail);
    }

    let password_hash = hash_on_blocking_pool(PlaintextPassword::new(payload.password)).await?;

    let user = User::create(
        &state.db,
        NewUser {
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            avatar: payload.avatar,
            user_type: payload.user_type,
            password_hash,
            // Elders are auto-approved; volunteers wait for admin approval.
            is_approved: payload.user_type == UserType::Elder,
            address: payload.address,
            longitude: None,
            latitude: None,
        },
    )
    .await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&user).map_err(AuthError::Internal)?;

    info!(user_id = %user.id, email = %user.email, user_type = ?user.user_type, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".into(),
            user: PublicUser::from(user),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    payload.email = payload.email.trim().to_lowercase();
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AuthError::Validation(
            "Email and password are required".into(),
        ));
    }

    // Unknown email and wrong password collapse into the same error.
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let ok = verify_on_blocking_pool(
        user.password_hash.clone(),
        PlaintextPassword::new(payload.password),
    )
    .await?;
    if !ok {
        return Err(AuthError::InvalidCredentials);
    }

    // Only after the password verifies do we admit the account exists but
    // is deactivated.
    if !user.is_active {
        return Err(AuthError::AccountInactive);
    }

    User::touch_last_login(&state.db, user.id).await?;

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&user).map_err(AuthError::Internal)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        user: PublicUser::from(user),
        token,
    }))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse {
        user: PublicUser::from(user),
    })
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AuthError> {
    let updated = User::update_profile(&state.db, user.id, payload.into())
        .await?
        .ok_or(AuthError::NotFound)?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(ProfileResponse {
        message: "Profile updated successfully".into(),
        user: PublicUser::from(updated),
    }))
}

/// Stateless logout: the token stays valid until expiry, the client is
/// expected to discard its session snapshot.
#[instrument(skip_all)]
pub async fn logout(CurrentUser(user): CurrentUser) -> Json<MessageResponse> {
    info!(user_id = %user.id, "user logged out");
    Json(MessageResponse {
        message: "Logout successful".into(),
    })
}
