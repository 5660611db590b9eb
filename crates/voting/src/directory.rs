use std::sync::Arc;

use shared::{
    domain::{AuthMode, User, UserId, Username},
    error::{ApiError, ErrorCode},
    store::UserRepository,
};
use tracing::{info, warn};

use crate::{
    credential::{hash_credential, validate_secret, verify_credential},
    internal, require_user,
};

/// Maps usernames to stable identities.
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserRepository>,
    mode: AuthMode,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserRepository>, mode: AuthMode) -> Self {
        Self { users, mode }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Signs a user in, creating the identity on first use.
    ///
    /// In [`AuthMode::Credentialed`] a new identity needs a credential and a
    /// known identity must present the matching one. In
    /// [`AuthMode::NameOnly`] any credential is ignored.
    pub async fn register_or_authenticate(
        &self,
        username: &str,
        credential: Option<&str>,
    ) -> Result<UserId, ApiError> {
        let username = Username::parse(username)?;
        if self.mode == AuthMode::NameOnly {
            return self.find_or_create_without_credential(&username).await;
        }

        if let Some(existing) = self.find_by_name(&username).await? {
            return authenticate(existing, credential);
        }

        let secret = credential.ok_or_else(|| {
            ApiError::new(
                ErrorCode::Validation,
                "a credential is required to register",
            )
        })?;
        validate_secret(secret)?;
        match self.insert(&username, Some(&hash_credential(secret))).await? {
            Some(user_id) => Ok(user_id),
            // Another sign-in created the name first; treat it as known.
            None => {
                let existing = self.find_by_name(&username).await?.ok_or_else(vanished)?;
                authenticate(existing, credential)
            }
        }
    }

    /// Creates a credentialed identity. Repeating a sign-up with the same
    /// credential returns the existing identity.
    pub async fn sign_up(&self, username: &str, credential: &str) -> Result<UserId, ApiError> {
        let username = Username::parse(username)?;
        validate_secret(credential)?;

        if let Some(existing) = self.find_by_name(&username).await? {
            return claim_existing(existing, credential);
        }
        match self.insert(&username, Some(&hash_credential(credential))).await? {
            Some(user_id) => Ok(user_id),
            None => {
                let existing = self.find_by_name(&username).await?.ok_or_else(vanished)?;
                claim_existing(existing, credential)
            }
        }
    }

    /// Signs in a known user without ever creating one.
    pub async fn sign_in(
        &self,
        username: &str,
        credential: Option<&str>,
    ) -> Result<UserId, ApiError> {
        let username = Username::parse(username)?;
        let existing = self
            .find_by_name(&username)
            .await?
            .ok_or_else(|| ApiError::not_found("user"))?;
        match self.mode {
            AuthMode::NameOnly => Ok(existing.user_id),
            AuthMode::Credentialed => authenticate(existing, credential),
        }
    }

    /// Replaces a user's credential. When one is already set, `current` must
    /// match it.
    pub async fn reset_credential(
        &self,
        user_id: UserId,
        current: Option<&str>,
        new_credential: &str,
    ) -> Result<(), ApiError> {
        validate_secret(new_credential)?;
        let user = require_user(self.users.as_ref(), user_id).await?;
        if let Some(stored) = user.credential_hash.as_deref() {
            let verified = current.is_some_and(|secret| verify_credential(stored, secret));
            if !verified {
                warn!(user_id = user_id.0, "credential reset rejected");
                return Err(invalid_credentials());
            }
        }

        let updated = self
            .users
            .set_credential_hash(user_id, &hash_credential(new_credential))
            .await
            .map_err(internal)?;
        if !updated {
            return Err(ApiError::not_found("user"));
        }
        info!(user_id = user_id.0, "credential reset");
        Ok(())
    }

    pub async fn username(&self, user_id: UserId) -> Result<String, ApiError> {
        Ok(require_user(self.users.as_ref(), user_id).await?.username)
    }

    async fn find_or_create_without_credential(
        &self,
        username: &Username,
    ) -> Result<UserId, ApiError> {
        if let Some(existing) = self.find_by_name(username).await? {
            return Ok(existing.user_id);
        }
        match self.insert(username, None).await? {
            Some(user_id) => Ok(user_id),
            None => Ok(self
                .find_by_name(username)
                .await?
                .ok_or_else(vanished)?
                .user_id),
        }
    }

    async fn find_by_name(&self, username: &Username) -> Result<Option<User>, ApiError> {
        self.users
            .find_user_by_name(username.as_str())
            .await
            .map_err(internal)
    }

    async fn insert(
        &self,
        username: &Username,
        credential_hash: Option<&str>,
    ) -> Result<Option<UserId>, ApiError> {
        let inserted = self
            .users
            .insert_user(username.as_str(), credential_hash)
            .await
            .map_err(internal)?;
        if let Some(user_id) = inserted {
            info!(user_id = user_id.0, username = username.as_str(), "user registered");
        }
        Ok(inserted)
    }
}

fn authenticate(user: User, credential: Option<&str>) -> Result<UserId, ApiError> {
    let verified = match (user.credential_hash.as_deref(), credential) {
        (Some(stored), Some(secret)) => verify_credential(stored, secret),
        _ => false,
    };
    if !verified {
        warn!(user_id = user.user_id.0, "sign-in rejected");
        return Err(invalid_credentials());
    }
    Ok(user.user_id)
}

fn claim_existing(user: User, credential: &str) -> Result<UserId, ApiError> {
    match user.credential_hash.as_deref() {
        Some(stored) if verify_credential(stored, credential) => Ok(user.user_id),
        _ => Err(ApiError::new(
            ErrorCode::Conflict,
            format!("username '{}' is already taken", user.username),
        )),
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::new(ErrorCode::Unauthorized, "invalid username or credential")
}

fn vanished() -> ApiError {
    ApiError::new(
        ErrorCode::Internal,
        "user disappeared between insert and lookup",
    )
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
