use chrono::Duration;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::schema::User;
use crate::error::{Error, HtmlError};
use crate::schema::{UserRole, Uuid};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    /// Must match `users.token_version`; bumped on logout.
    pub version: i32,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(user: &User, lifetime_hours: i64) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(lifetime_hours)).timestamp();

        Self {
            user_id: user.id,
            username: user.username.to_owned(),
            role: user.role(),
            version: user.token_version,
            iat,
            exp,
        }
    }

    pub fn is_expired(&self) -> bool {
        (self.exp - Utc::now().timestamp()).is_negative()
    }
}

/// The authenticated requester, rebuilt from the database on every request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(HtmlError::Forbidden.default());
        }
        Ok(())
    }

    /// Authors may manage their own objects; admins may manage everyone's.
    pub fn authorize_owner(&self, owner_id: Uuid, any: ActionType) -> Result<(), Error> {
        if owner_id == self.user_id {
            return Ok(());
        }
        self.authenticate(any)
    }
}

impl From<&User> for SessionData {
    fn from(user: &User) -> Self {
        SessionData {
            user_id: user.id,
            username: user.username.to_owned(),
            role: user.role(),
        }
    }
}

fn signing_key(secret: &str) -> Result<Hmac<Sha256>, Error> {
    Hmac::new_from_slice(secret.as_bytes()).map_err(|e| {
        log::error!("Invalid signing key: {e}");
        HtmlError::InternalServerError.default()
    })
}

pub fn generate_jwt_session(
    user: &User,
    secret: &str,
    lifetime_hours: i64,
) -> Result<String, Error> {
    let key = signing_key(secret)?;
    let claims = JwtSessionData::new(user, lifetime_hours);

    claims.sign_with_key(&key).map_err(|e| {
        log::error!("Failed to sign session: {e}");
        HtmlError::InternalServerError.default()
    })
}

pub fn verify_jwt_session(token: &str, secret: &str) -> Result<JwtSessionData, Error> {
    let key = signing_key(secret)?;

    let session: JwtSessionData = token
        .verify_with_key(&key)
        .map_err(|_| HtmlError::InvalidSession.new("Invalid token."))?;

    if session.is_expired() {
        return Err(HtmlError::InvalidSession.new("Token expired."));
    }
    Ok(session)
}
