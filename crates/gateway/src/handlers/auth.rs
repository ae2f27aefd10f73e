//! Registration, login and the current user

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use pledgehub_common::{
    auth::{hash_password, verify_password, AuthContext},
    db::models::User,
    errors::{AppError, Result},
    policy::TenantRole,
};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// Issued on register and login
#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Serialize)]
pub struct MembershipProps {
    pub tenant_id: Uuid,
    pub slug: String,
    pub name: String,
    pub roles: Vec<TenantRole>,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: User,
    pub memberships: Vec<MembershipProps>,
}

fn issue_token(state: &AppState, user: User) -> Result<TokenResponse> {
    let token = state
        .jwt
        .generate_token(user.id, &user.email, user.is_system_admin)?;

    Ok(TokenResponse {
        token,
        token_type: "Bearer",
        expires_in: state.jwt.expiration_secs(),
        user,
    })
}

/// Create an account and sign it in
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>)> {
    request.validate()?;

    let password_hash = hash_password(&request.password)?;
    let is_system_admin = state.config.is_admin_email(&request.email);

    let user = state
        .repo()
        .create_user(request.name.trim().to_string(), &request.email, password_hash, is_system_admin)
        .await?;

    tracing::info!(user_id = %user.id, is_system_admin, "User registered");

    Ok((StatusCode::CREATED, Json(issue_token(&state, user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    request.validate()?;

    let user = state
        .repo()
        .find_user_by_email(&request.email)
        .await?
        .filter(|user| verify_password(&request.password, &user.password_hash))
        .ok_or(AppError::InvalidCredentials)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(issue_token(&state, user)?))
}

/// The signed-in user and every tenant they belong to
pub async fn me(State(state): State<AppState>, auth: AuthContext) -> Result<Json<MeResponse>> {
    let repo = state.repo();

    let user = repo
        .find_user_by_id(auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "Account no longer exists".to_string(),
        })?;

    let memberships = repo
        .memberships(user.id)
        .await?
        .into_iter()
        .map(|(tenant, roles)| MembershipProps {
            tenant_id: tenant.id,
            slug: tenant.slug,
            name: tenant.name,
            roles,
        })
        .collect();

    Ok(Json(MeResponse { user, memberships }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let request = RegisterRequest {
            name: "Ada".to_string(),
            email: "ada@example.org".to_string(),
            password: "short".to_string(),
        };
        let err = AppError::from(request.validate().unwrap_err());
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "password"));

        let request = RegisterRequest {
            name: "Ada".to_string(),
            email: "not-an-email".to_string(),
            password: "long enough".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_login_validation() {
        let request = LoginRequest {
            email: "ada@example.org".to_string(),
            password: String::new(),
        };
        assert!(request.validate().is_err());
    }
}
