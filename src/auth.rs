//! Login/logout against the remote credential service.
//!
//! The service has answered a successful login in two shapes over time,
//! `{ user: { id, email, role }, token }` and `{ id, email, role, token }`.
//! Both are decoded into one [`Identity`] right here; nothing downstream
//! knows which shape arrived. Only `email` and `role` are required.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ErrorBody;
use crate::models::{Identity, UserId};
use crate::roles::normalize_role;
use crate::session::SessionStore;

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";
pub const CONNECTION_ERROR_MESSAGE: &str = "Unable to reach the server. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidCredentials,
    MalformedResponse,
    NetworkFailure,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("malformed login response: {0}")]
    MalformedResponse(String),
    #[error("credential service unreachable: {0}")]
    NetworkFailure(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::InvalidCredentials(_) => AuthErrorKind::InvalidCredentials,
            AuthError::MalformedResponse(_) => AuthErrorKind::MalformedResponse,
            AuthError::NetworkFailure(_) => AuthErrorKind::NetworkFailure,
        }
    }

    /// What the login form shows. Contract violations and transport errors
    /// collapse into one generic connection message.
    pub fn user_message(&self) -> &str {
        match self {
            AuthError::InvalidCredentials(message) => message,
            AuthError::MalformedResponse(_) | AuthError::NetworkFailure(_) => {
                CONNECTION_ERROR_MESSAGE
            }
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginUser {
    #[serde(default)]
    id: Option<UserId>,
    email: String,
    role: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoginResponse {
    Nested {
        user: LoginUser,
        #[serde(default)]
        token: Option<String>,
    },
    Flat {
        #[serde(flatten)]
        user: LoginUser,
        #[serde(default)]
        token: Option<String>,
    },
}

impl LoginResponse {
    fn into_parts(self) -> (LoginUser, Option<String>) {
        match self {
            LoginResponse::Nested { user, token } | LoginResponse::Flat { user, token } => {
                (user, token)
            }
        }
    }
}

pub(crate) fn decode_login(body: &[u8]) -> Result<(Identity, Option<String>), AuthError> {
    let response: LoginResponse = serde_json::from_slice(body).map_err(|_| {
        AuthError::MalformedResponse("unrecognized login response shape".to_string())
    })?;
    let (user, token) = response.into_parts();
    if user.email.trim().is_empty() || user.role.trim().is_empty() {
        return Err(AuthError::MalformedResponse(
            "user data missing from login response".to_string(),
        ));
    }

    let identity = Identity {
        id: user.id,
        email: user.email,
        role: normalize_role(&user.role),
    };
    Ok((identity, token))
}

pub(crate) fn rejection_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| INVALID_CREDENTIALS_MESSAGE.to_string())
}

pub struct Authenticator {
    client: reqwest::Client,
    login_url: String,
    session: SessionStore,
}

impl Authenticator {
    pub fn new(client: reqwest::Client, auth_base_url: &str, session: SessionStore) -> Self {
        Self {
            client,
            login_url: format!("{}/auth/login", auth_base_url.trim_end_matches('/')),
            session,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .post(&self.login_url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|err| AuthError::NetworkFailure(err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| AuthError::NetworkFailure(err.to_string()))?;

        if !status.is_success() {
            tracing::info!(email, status = status.as_u16(), "login rejected");
            return Err(AuthError::InvalidCredentials(rejection_message(&body)));
        }

        let (identity, token) = decode_login(&body).inspect_err(|err| {
            tracing::warn!(error = %err, "credential service broke the login contract");
        })?;
        self.session.set(&identity, token.as_deref());
        tracing::info!(email = %identity.email, role = %identity.role, "signed in");
        Ok(identity)
    }

    pub fn logout(&self) {
        self.session.clear();
        tracing::info!("signed out");
    }
}
