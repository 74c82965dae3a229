use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
};
use axum_extra::headers::{Authorization, Header, authorization::Basic};

use crate::error::AppError;
use crate::identity::{Credentials, IdentityResolver};
use crate::state::AppState;

/// Authenticated user resolved from `Authorization: Basic ...`.
///
/// Add this as a handler parameter to require authentication. Unknown
/// usernames are registered on the spot.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

/// Like [`AuthUser`], but a request with no `Authorization` header resolves to
/// `None` (anonymous). A header that is present is held to the same rules.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    pub fn username(&self) -> Option<&str> {
        self.0.as_ref().map(|u| u.username.as_str())
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let creds = basic_credentials(&parts.headers)?.ok_or(AppError::CredentialsMissing)?;
        authenticate(state, creds).await
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match basic_credentials(&parts.headers)? {
            Some(creds) => Ok(MaybeAuthUser(Some(authenticate(state, creds).await?))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}

async fn authenticate(state: &AppState, creds: Credentials) -> Result<AuthUser, AppError> {
    let username = IdentityResolver::new(&state.db).resolve(creds).await?;
    Ok(AuthUser { username })
}

/// Read Basic credentials from the request headers.
///
/// - no `Authorization` header: `Ok(None)`
/// - a scheme other than Basic: `CredentialsMissing` (401)
/// - Basic with a payload that is not base64 `user:pass` in UTF-8: `MalformedCredentials` (400)
pub fn basic_credentials(headers: &HeaderMap) -> Result<Option<Credentials>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    if !has_basic_scheme(value) {
        return Err(AppError::CredentialsMissing);
    }

    let auth = <Authorization<Basic> as Header>::decode(&mut std::iter::once(value))
        .map_err(|_| AppError::MalformedCredentials)?;

    Ok(Some(Credentials {
        username: auth.username().to_string(),
        password: auth.password().to_string(),
    }))
}

fn has_basic_scheme(value: &HeaderValue) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= 6 && bytes[..6].eq_ignore_ascii_case(b"basic ")
}
