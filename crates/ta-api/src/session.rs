//! Cookie-session identity and the `X-TA-Nonce` check for mutating routes.

use actix_session::{Session, SessionExt};
use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use serde::{Deserialize, Serialize};
use ta_core::{AppError, Capability, Role, User};

use crate::error::ApiError;

pub const NONCE_HEADER: &str = "X-TA-Nonce";
const SESSION_KEY: &str = "user";

/// What the signed cookie remembers about a logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub role: Role,
    pub display_name: String,
    pub nonce: String,
}

impl SessionUser {
    pub fn new(user: &User, nonce: String) -> Self {
        Self {
            id: user.id,
            role: user.role,
            display_name: user.display_name.clone(),
            nonce,
        }
    }

    pub fn require(&self, cap: Capability) -> Result<(), ApiError> {
        if self.role.can(cap) {
            Ok(())
        } else {
            Err(AppError::Forbidden("You do not have permission to do that".into()).into())
        }
    }

    pub fn require_any(&self, caps: &[Capability]) -> Result<(), ApiError> {
        if caps.iter().any(|cap| self.role.can(*cap)) {
            Ok(())
        } else {
            Err(AppError::Forbidden("You do not have permission to do that".into()).into())
        }
    }
}

pub fn store(session: &Session, user: &SessionUser) -> Result<(), ApiError> {
    session.renew();
    session
        .insert(SESSION_KEY, user)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("session write failed: {e}")))
}

fn load(req: &HttpRequest) -> Result<SessionUser, ApiError> {
    let session = req.get_session();
    match session.get::<SessionUser>(SESSION_KEY) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(AppError::Unauthorized("You must be logged in".into()).into()),
        Err(e) => {
            log::warn!("discarding unreadable session: {e}");
            session.purge();
            Err(AppError::Unauthorized("You must be logged in".into()).into())
        }
    }
}

/// Any logged-in user. Rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

impl std::ops::Deref for CurrentUser {
    type Target = SessionUser;

    fn deref(&self) -> &SessionUser {
        &self.0
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(load(req).map(CurrentUser))
    }
}

/// A logged-in user whose request carries the session nonce.
/// 401 without a session, 403 on a missing or stale nonce.
#[derive(Debug, Clone)]
pub struct NonceUser(pub SessionUser);

impl std::ops::Deref for NonceUser {
    type Target = SessionUser;

    fn deref(&self) -> &SessionUser {
        &self.0
    }
}

impl FromRequest for NonceUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let checked = load(req).and_then(|user| {
            let sent = req
                .headers()
                .get(NONCE_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if !sent.is_empty() && sent == user.nonce {
                Ok(NonceUser(user))
            } else {
                Err(AppError::Forbidden("Invalid nonce".into()).into())
            }
        });
        ready(checked)
    }
}
