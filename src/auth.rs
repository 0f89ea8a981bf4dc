//! Sign-in against the configured credential table.
//!
//! The signed-in user lives in the state store under `user` (`null` when
//! signed out), so it survives restarts together with the rest of the
//! document. Passwords are compared as SHA-256 hex digests.

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::events::{AUTH_LOGIN, AUTH_LOGOUT, EventBus};
use crate::listeners::Subscription;
use crate::state::KeyPathStore;

/// Store path of the signed-in user.
pub const USER_PATH: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    /// Unix milliseconds.
    pub login_time: i64,
    pub uid: String,
    pub email: String,
}

/// Lowercase hex SHA-256 of `password`, the format of `[auth.users]` values.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub struct Auth {
    users: BTreeMap<String, String>,
    email_domain: String,
    store: Rc<KeyPathStore>,
    events: Rc<EventBus>,
}

impl Auth {
    pub fn new(config: &AuthConfig, store: Rc<KeyPathStore>, events: Rc<EventBus>) -> Self {
        Self {
            users: config.users.clone(),
            email_domain: config.email_domain.clone(),
            store,
            events,
        }
    }

    /// Check `password` for `username` (trimmed, case-insensitive) and make
    /// that user the signed-in user.
    pub fn login(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = username.trim().to_lowercase();
        let matches = self
            .users
            .get(&username)
            .is_some_and(|digest| *digest == hash_password(password));
        if !matches {
            warn!(%username, "login rejected");
            return Err(AppError::InvalidCredentials);
        }

        let user = User {
            login_time: Utc::now().timestamp_millis(),
            uid: username.clone(),
            email: format!("{username}@{}", self.email_domain),
            username,
        };
        let value = serde_json::to_value(&user)
            .map_err(|e| AppError::Auth(format!("serialise user: {e}")))?;
        self.store.set(USER_PATH, value.clone())?;
        info!(username = %user.username, "user signed in");
        self.events.emit(AUTH_LOGIN, &value);
        Ok(user)
    }

    pub fn logout(&self) -> Result<(), AppError> {
        let previous = self.current_user();
        self.store.set(USER_PATH, Value::Null)?;
        if let Some(user) = previous {
            info!(username = %user.username, "user signed out");
        }
        self.events.emit(AUTH_LOGOUT, &Value::Null);
        Ok(())
    }

    /// True only when the stored `user` is a well-formed [`User`].
    pub fn is_logged_in(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn current_user(&self) -> Option<User> {
        match self.store.get_as::<User>(USER_PATH) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "stored user is malformed");
                None
            }
        }
    }

    /// Run `callback` with the new `user` value on every sign-in and sign-out.
    pub fn on_auth_state_changed<F>(&self, callback: F) -> Result<Subscription, AppError>
    where
        F: Fn(&Value) + 'static,
    {
        self.store.subscribe(USER_PATH, callback)
    }
}
