//! Credentials and customer profiles.
//!
//! A credential (login + role) and its profile are created together by
//! [`AccountService::sign_up`] and switched on and off together by
//! `activate`/`deactivate`, which also park or restore the owner's cart.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{CartStatus, Credential, Role, User};
use repository::{CartsRepository, CredentialsRepository, Session, Store, UsersRepository};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::access::Caller;
use crate::error::{ServiceError, conflict, not_found};

const MIN_PASSWORD_LEN: usize = 8;

/// Password hashing capability.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> String;
    fn verify(&self, password: &str, stored: &str) -> bool;
}

/// Salted SHA-256, stored as `hex(salt)$hex(digest)`.
///
/// Deployments exposed to offline attacks should plug in a memory-hard KDF
/// through [`PasswordHasher`] instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct SaltedSha256;

impl SaltedSha256 {
    fn digest(salt: &[u8], password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }
}

impl PasswordHasher for SaltedSha256 {
    fn hash(&self, password: &str) -> String {
        let salt: [u8; 16] = rand::random();
        format!("{}${}", hex::encode(salt), hex::encode(Self::digest(&salt, password)))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt, digest)) = stored.split_once('$') else {
            return false;
        };
        match hex::decode(salt) {
            Ok(salt) => hex::encode(Self::digest(&salt, password)) == digest,
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    pub username: String,
    pub password: String,
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_new_password: String,
}

impl std::fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

/// A credential together with its profile.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub credential: Credential,
    pub profile: User,
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn sign_up(&self, input: SignUp) -> Result<Account, ServiceError>;

    /// Checks a username/password pair and returns the identity to act as.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Caller, ServiceError>;

    async fn profile(&self, caller: &Caller) -> Result<User, ServiceError>;
    async fn update_profile(&self, caller: &Caller, patch: ProfilePatch) -> Result<User, ServiceError>;
    async fn change_username(
        &self,
        caller: &Caller,
        credential_id: Uuid,
        username: &str,
    ) -> Result<Credential, ServiceError>;
    async fn change_password(
        &self,
        caller: &Caller,
        credential_id: Uuid,
        change: PasswordChange,
    ) -> Result<(), ServiceError>;
    async fn change_role(
        &self,
        caller: &Caller,
        credential_id: Uuid,
        role: Role,
    ) -> Result<Credential, ServiceError>;

    /// Deactivates the credential, its profile and the owner's active cart.
    async fn deactivate(&self, caller: &Caller, credential_id: Uuid) -> Result<(), ServiceError>;
    /// Reverses [`AccountService::deactivate`]. Admin only.
    async fn activate(&self, caller: &Caller, credential_id: Uuid) -> Result<(), ServiceError>;

    async fn list_users(&self, caller: &Caller) -> Result<Vec<User>, ServiceError>;
    async fn get_user(&self, caller: &Caller, user_id: Uuid) -> Result<User, ServiceError>;
    async fn list_credentials(&self, caller: &Caller) -> Result<Vec<Credential>, ServiceError>;
    async fn get_credential(&self, caller: &Caller, credential_id: Uuid) -> Result<Credential, ServiceError>;
}

pub struct AccountServiceImpl<S> {
    store: Arc<S>,
    hasher: Arc<dyn PasswordHasher>,
}

impl<S: Store> AccountServiceImpl<S> {
    pub fn new(store: Arc<S>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }
}

fn required_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn valid_email(value: &str) -> Result<String, ServiceError> {
    let email = value.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email.to_string()),
        _ => Err(ServiceError::Validation(format!("'{email}' is not a valid email"))),
    }
}

fn valid_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::Validation(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

async fn require_credential(
    session: &mut dyn Session,
    id: Uuid,
) -> Result<Credential, ServiceError> {
    session
        .get_credential(id)
        .await?
        .ok_or_else(|| not_found("credential", id))
}

/// Loads an active credential the caller owns.
async fn own_active_credential(
    session: &mut dyn Session,
    caller: &Caller,
    id: Uuid,
) -> Result<Credential, ServiceError> {
    let credential = require_credential(session, id).await?;
    if !credential.active {
        return Err(conflict("credential is deactivated"));
    }
    if caller.credential_id != id {
        return Err(ServiceError::Forbidden("only the owner can change this credential".into()));
    }
    Ok(credential)
}

async fn active_profile(session: &mut dyn Session, caller: &Caller) -> Result<User, ServiceError> {
    let user = session
        .get_user(caller.user_id)
        .await?
        .ok_or_else(|| not_found("user", caller.user_id))?;
    if !user.active {
        return Err(conflict("profile is deactivated"));
    }
    Ok(user)
}

/// Flips credential, profile and cart to `active`.
async fn cascade(
    session: &mut dyn Session,
    mut credential: Credential,
    active: bool,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    credential.active = active;
    credential.updated_at = now;
    session.update_credential(&credential).await?;

    let Some(mut user) = session.find_user_by_credential(credential.id).await? else {
        warn!(credential_id = %credential.id, "Credential has no profile");
        return Ok(());
    };
    user.active = active;
    user.updated_at = now;
    session.update_user(&user).await?;

    let (from, to) = if active {
        (CartStatus::Inactive, CartStatus::Active)
    } else {
        (CartStatus::Active, CartStatus::Inactive)
    };
    if active && session.find_cart_by_status(user.id, CartStatus::Active).await?.is_some() {
        warn!(user_id = %user.id, "User already has an active cart; parked cart left as is");
        return Ok(());
    }
    match session.find_cart_by_status(user.id, from).await? {
        Some(mut cart) => {
            cart.status = to;
            cart.updated_at = now;
            session.update_cart(&cart).await?;
        }
        None => warn!(user_id = %user.id, status = ?from, "No cart to switch"),
    }
    Ok(())
}

#[async_trait]
impl<S: Store> AccountService for AccountServiceImpl<S> {
    #[instrument(skip(self, input), fields(username = %input.username))]
    async fn sign_up(&self, input: SignUp) -> Result<Account, ServiceError> {
        let username = required_text("username", &input.username)?;
        valid_password(&input.password)?;
        let email = valid_email(&input.email)?;

        let mut s = self.store.begin().await?;
        if s.find_credential_by_username(&username).await?.is_some() {
            return Err(conflict("username is already in use"));
        }
        if s.find_user_by_email(&email).await?.is_some() {
            return Err(conflict("email is already in use"));
        }

        let credential = Credential::new(username, self.hasher.hash(&input.password), Role::User);
        let now = Utc::now();
        let profile = User {
            id: Uuid::new_v4(),
            credential_id: credential.id,
            name: required_text("name", &input.name)?,
            last_name: required_text("last_name", &input.last_name)?,
            email,
            phone: required_text("phone", &input.phone)?,
            address: input.address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
            active: true,
            created_at: now,
            updated_at: now,
        };
        s.insert_credential(&credential).await?;
        s.insert_user(&profile).await?;
        s.commit().await?;

        info!(user_id = %profile.id, "User signed up");
        Ok(Account { credential, profile })
    }

    #[instrument(skip(self, password))]
    async fn authenticate(&self, username: &str, password: &str) -> Result<Caller, ServiceError> {
        let mut s = self.store.begin().await?;
        let credential = s
            .find_credential_by_username(username)
            .await?
            .filter(|c| self.hasher.verify(password, &c.password_hash))
            .ok_or_else(|| ServiceError::Unauthorized("invalid credentials".into()))?;
        if !credential.active {
            return Err(conflict("account is inactive; contact the administrator"));
        }
        let user = s
            .find_user_by_credential(credential.id)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("invalid credentials".into()))?;

        Ok(Caller {
            user_id: user.id,
            credential_id: credential.id,
            role: credential.role,
        })
    }

    #[instrument(skip(self))]
    async fn profile(&self, caller: &Caller) -> Result<User, ServiceError> {
        let mut s = self.store.begin().await?;
        active_profile(s.as_mut(), caller).await
    }

    #[instrument(skip(self))]
    async fn update_profile(&self, caller: &Caller, patch: ProfilePatch) -> Result<User, ServiceError> {
        let mut s = self.store.begin().await?;
        let mut user = active_profile(s.as_mut(), caller).await?;

        if let Some(email) = patch.email {
            let email = valid_email(&email)?;
            if let Some(other) = s.find_user_by_email(&email).await? {
                if other.id != user.id {
                    return Err(conflict("email is already in use"));
                }
            }
            user.email = email;
        }
        if let Some(name) = patch.name {
            user.name = required_text("name", &name)?;
        }
        if let Some(last_name) = patch.last_name {
            user.last_name = required_text("last_name", &last_name)?;
        }
        if let Some(phone) = patch.phone {
            user.phone = required_text("phone", &phone)?;
        }
        if let Some(address) = patch.address {
            user.address = Some(address.trim().to_string()).filter(|a| !a.is_empty());
        }
        user.updated_at = Utc::now();

        s.update_user(&user).await?;
        s.commit().await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn change_username(
        &self,
        caller: &Caller,
        credential_id: Uuid,
        username: &str,
    ) -> Result<Credential, ServiceError> {
        let username = required_text("username", username)?;
        let mut s = self.store.begin().await?;
        let mut credential = own_active_credential(s.as_mut(), caller, credential_id).await?;
        if s.find_credential_by_username(&username).await?.is_some() {
            return Err(conflict("username is already in use"));
        }
        credential.username = username;
        credential.updated_at = Utc::now();
        s.update_credential(&credential).await?;
        s.commit().await?;
        Ok(credential)
    }

    #[instrument(skip(self))]
    async fn change_password(
        &self,
        caller: &Caller,
        credential_id: Uuid,
        change: PasswordChange,
    ) -> Result<(), ServiceError> {
        let mut s = self.store.begin().await?;
        let mut credential = own_active_credential(s.as_mut(), caller, credential_id).await?;
        if change.new_password != change.confirm_new_password {
            return Err(ServiceError::Validation(
                "new password and its confirmation do not match".into(),
            ));
        }
        if !self.hasher.verify(&change.current_password, &credential.password_hash) {
            return Err(ServiceError::Validation("current password is incorrect".into()));
        }
        valid_password(&change.new_password)?;

        credential.password_hash = self.hasher.hash(&change.new_password);
        credential.updated_at = Utc::now();
        s.update_credential(&credential).await?;
        s.commit().await?;
        info!(credential_id = %credential_id, "Password changed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn change_role(
        &self,
        caller: &Caller,
        credential_id: Uuid,
        role: Role,
    ) -> Result<Credential, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let mut credential = require_credential(s.as_mut(), credential_id).await?;
        if credential.role == role {
            return Err(conflict(format!("credential already has role {role}")));
        }
        credential.role = role;
        credential.updated_at = Utc::now();
        s.update_credential(&credential).await?;
        s.commit().await?;
        Ok(credential)
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, caller: &Caller, credential_id: Uuid) -> Result<(), ServiceError> {
        let mut s = self.store.begin().await?;
        let credential = require_credential(s.as_mut(), credential_id).await?;
        if !caller.is_admin() && caller.credential_id != credential_id {
            return Err(ServiceError::Forbidden("not allowed to deactivate this account".into()));
        }
        if !credential.active {
            return Err(conflict("account is already inactive"));
        }
        cascade(s.as_mut(), credential, false).await?;
        s.commit().await?;
        info!(credential_id = %credential_id, "Account deactivated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn activate(&self, caller: &Caller, credential_id: Uuid) -> Result<(), ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        let credential = require_credential(s.as_mut(), credential_id).await?;
        if credential.active {
            return Err(conflict("account is already active"));
        }
        cascade(s.as_mut(), credential, true).await?;
        s.commit().await?;
        info!(credential_id = %credential_id, "Account activated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_users(&self, caller: &Caller) -> Result<Vec<User>, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        Ok(s.list_users().await?)
    }

    #[instrument(skip(self))]
    async fn get_user(&self, caller: &Caller, user_id: Uuid) -> Result<User, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        s.get_user(user_id).await?.ok_or_else(|| not_found("user", user_id))
    }

    #[instrument(skip(self))]
    async fn list_credentials(&self, caller: &Caller) -> Result<Vec<Credential>, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        Ok(s.list_credentials().await?)
    }

    #[instrument(skip(self))]
    async fn get_credential(&self, caller: &Caller, credential_id: Uuid) -> Result<Credential, ServiceError> {
        caller.require_admin()?;
        let mut s = self.store.begin().await?;
        require_credential(s.as_mut(), credential_id).await
    }
}
