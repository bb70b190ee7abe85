// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Player accounts: a login name, a password hash, and the player thing it plays as.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use fjall::PersistMode;
use serde::{Deserialize, Serialize};
use thicket_common::ThingId;
use thiserror::Error;
use tracing::{info, warn};

use crate::{FjallWorldStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub login_name: String,
    pub password_hash: String,
    pub character: ThingId,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("No such account")]
    NoSuchAccount,
    #[error("Incorrect password")]
    BadPassword,
    #[error("Account name already taken")]
    AlreadyExists,
    #[error("Invalid account name")]
    InvalidName,
    #[error("Could not hash password: {0}")]
    HashError(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub trait AccountStore: Send + Sync {
    /// Find the named account and verify its password.
    fn account_for_login(&self, login_name: &str, password: &str)
    -> Result<Account, AccountError>;

    fn account_exists(&self, login_name: &str) -> Result<bool, AccountError>;

    /// Record a new account playing as `character`.
    fn create_account(
        &self,
        login_name: &str,
        password: &str,
        character: ThingId,
    ) -> Result<Account, AccountError>;
}

fn account_key(login_name: &str) -> String {
    login_name.to_lowercase()
}

fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AccountError::HashError(e.to_string()))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> Result<(), AccountError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AccountError::HashError(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AccountError::BadPassword)
}

/// A login name held while the player it will play as is being made. No other creation can
/// take the name until the reservation is used or dropped.
pub struct LoginReservation<'a> {
    store: &'a FjallWorldStore,
    login_name: String,
}

impl LoginReservation<'_> {
    pub fn login_name(&self) -> &str {
        &self.login_name
    }

    /// Record the reserved account, playing as `character`.
    pub fn create_account(
        self,
        password: &str,
        character: ThingId,
    ) -> Result<Account, AccountError> {
        let password_hash = hash_password(password)?;
        let _reserved = self.store.reserved_logins.lock().unwrap();
        self.store
            .insert_account(&self.login_name, password_hash, character)
    }
}

impl Drop for LoginReservation<'_> {
    fn drop(&mut self) {
        self.store
            .reserved_logins
            .lock()
            .unwrap()
            .remove(&account_key(&self.login_name));
    }
}

fn check_login_name(login_name: &str) -> Result<(), AccountError> {
    if login_name.is_empty() || login_name.chars().any(char::is_whitespace) {
        return Err(AccountError::InvalidName);
    }
    Ok(())
}

impl FjallWorldStore {
    /// Hold `login_name` for an account about to be created.
    pub fn reserve_login(&self, login_name: &str) -> Result<LoginReservation<'_>, AccountError> {
        check_login_name(login_name)?;
        let mut reserved = self.reserved_logins.lock().unwrap();
        let key = account_key(login_name);
        if reserved.contains(&key) || self.account_exists(login_name)? {
            return Err(AccountError::AlreadyExists);
        }
        reserved.insert(key);
        Ok(LoginReservation {
            store: self,
            login_name: login_name.to_string(),
        })
    }

    fn insert_account(
        &self,
        login_name: &str,
        password_hash: String,
        character: ThingId,
    ) -> Result<Account, AccountError> {
        let inner = self.inner.lock().unwrap();
        let key = account_key(login_name);
        if inner
            .accounts
            .contains_key(&key)
            .map_err(StoreError::from)?
        {
            return Err(AccountError::AlreadyExists);
        }
        let account = Account {
            login_name: login_name.to_string(),
            password_hash,
            character,
            created: Utc::now(),
        };
        let encoded = serde_json::to_vec(&account).map_err(StoreError::from)?;
        inner
            .accounts
            .insert(&key, encoded)
            .map_err(StoreError::from)?;
        if inner.sync_writes {
            inner
                .keyspace
                .persist(PersistMode::SyncAll)
                .map_err(StoreError::from)?;
        }
        info!(login_name, ?character, "Created account");
        Ok(account)
    }
}

impl AccountStore for FjallWorldStore {
    fn account_for_login(
        &self,
        login_name: &str,
        password: &str,
    ) -> Result<Account, AccountError> {
        let bytes = {
            let inner = self.inner.lock().unwrap();
            inner
                .accounts
                .get(account_key(login_name))
                .map_err(StoreError::from)?
        };
        let Some(bytes) = bytes else {
            return Err(AccountError::NoSuchAccount);
        };
        let account: Account = serde_json::from_slice(&bytes).map_err(StoreError::from)?;
        verify_password(password, &account.password_hash).inspect_err(|_| {
            warn!(login_name, "Failed login");
        })?;
        Ok(account)
    }

    fn account_exists(&self, login_name: &str) -> Result<bool, AccountError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .accounts
            .contains_key(account_key(login_name))
            .map_err(StoreError::from)?)
    }

    /// Refuses names held by a `LoginReservation`.
    fn create_account(
        &self,
        login_name: &str,
        password: &str,
        character: ThingId,
    ) -> Result<Account, AccountError> {
        check_login_name(login_name)?;
        let password_hash = hash_password(password)?;
        let reserved = self.reserved_logins.lock().unwrap();
        if reserved.contains(&account_key(login_name)) {
            return Err(AccountError::AlreadyExists);
        }
        self.insert_account(login_name, password_hash, character)
    }
}
