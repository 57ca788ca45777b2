use std::{
    convert::Infallible,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{AppState, models::UserRecord};

/// Claims
///
/// Payload of a session token. Signed with the configured session secret and validated
/// on every request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the forum uid.
    pub sub: u64,
    /// Expiration time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued at (iat), seconds since the epoch.
    pub iat: usize,
}

/// SessionUser
///
/// The resolved identity of a logged-in request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub uid: u64,
    pub username: String,
    pub userslug: String,
    pub is_admin: bool,
}

impl From<UserRecord> for SessionUser {
    fn from(user: UserRecord) -> Self {
        Self {
            uid: user.uid,
            username: user.username,
            userslug: user.userslug,
            is_admin: user.is_admin,
        }
    }
}

/// CurrentUser
///
/// The session of the current request: `Some` for a logged-in user, `None` for a guest.
/// Inserted by `resolve_session`; extracting it never fails, so guards decide what a
/// missing session means for their route.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<SessionUser>);

impl CurrentUser {
    /// The uid of the session, or 0 for guests.
    pub fn uid(&self) -> u64 {
        self.0.as_ref().map_or(0, |user| user.uid)
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.0.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(|user| user.is_admin)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default())
    }
}

/// resolve_session
///
/// Outermost application middleware. Resolves the caller's session and stores it in the
/// request extensions as `CurrentUser`. Bad or expired credentials degrade to a guest
/// session; rejecting is left to the per-route guards.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = session_user(&state, request.headers()).await;
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

async fn session_user(state: &AppState, headers: &HeaderMap) -> Option<SessionUser> {
    // Development bypass: a bare uid in x-user-id, resolved against the forum's users.
    if state.config.is_development() {
        let bypass = headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        if let Some(uid) = bypass {
            if let Some(user) = state.forum.get_user(uid).await {
                return Some(user.into());
            }
        }
    }

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?
        .strip_prefix("Bearer ")?;

    let decoding_key = DecodingKey::from_secret(state.config.session_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => data,
        Err(err) => {
            tracing::debug!(error = %err, "rejected session token");
            return None;
        }
    };

    // The user may have been deleted after the token was issued.
    state
        .forum
        .get_user(token_data.claims.sub)
        .await
        .map(SessionUser::from)
}

/// issue_token
///
/// Signs a session token for `uid` valid for `ttl`.
pub fn issue_token(
    secret: &str,
    uid: u64,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let claims = Claims {
        sub: uid,
        iat: now.as_secs() as usize,
        exp: (now + ttl).as_secs() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
