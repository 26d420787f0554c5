//! Operator accounts and the admin check that guards deletes.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto::{self, DEFAULT_PBKDF2_ITERATIONS};
use crate::storage::{read_text_file, write_text_file};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user: String,
    pub is_admin: bool,
}

/// Who is using the app right now. Implementations own their session state.
pub trait AdminAuthority: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;

    fn is_admin(&self) -> bool {
        self.current_identity()
            .map(|identity| identity.is_admin)
            .unwrap_or(false)
    }
}

/// Fixed identity, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthority {
    identity: Option<Identity>,
}

impl StaticAuthority {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn signed_in(user: impl Into<String>, is_admin: bool) -> Self {
        Self {
            identity: Some(Identity {
                user: user.into(),
                is_admin,
            }),
        }
    }
}

impl AdminAuthority for StaticAuthority {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.clone()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("El usuario y la contraseña son requeridos")]
    MissingCredentials,
    #[error("Usuario o contraseña incorrectos")]
    InvalidCredentials,
    #[error("accounts are already configured")]
    AlreadyConfigured,
    #[error("account {0} already exists")]
    DuplicateAccount(String),
    #[error("se requiere iniciar sesión como administrador")]
    AdminRequired,
    #[error("auth file i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("auth file is unreadable: {0}")]
    Format(#[from] serde_json::Error),
    #[error("auth session lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRecord {
    pub user: String,
    pub salt: String,
    pub hash: String,
    #[serde(default = "default_pbkdf2_iterations")]
    pub iterations: u32,
    #[serde(default)]
    pub admin: bool,
}

impl AuthRecord {
    fn new(user: &str, password: &str, iterations: u32, admin: bool) -> Self {
        let iterations = iterations.max(1);
        let salt = crypto::random_salt();
        let key = crypto::derive_key(password, &salt, iterations);
        Self {
            user: user.to_string(),
            salt: crypto::encode_b64(&salt),
            hash: crypto::encode_b64(key.as_slice()),
            iterations,
            admin,
        }
    }

    fn verify(&self, password: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        let Ok(salt) = crypto::decode_b64(self.salt.as_str()) else {
            return false;
        };
        let key = crypto::derive_key(password, salt.as_slice(), self.iterations.max(1));
        crypto::encode_b64(key.as_slice()) == self.hash
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthFile {
    #[serde(default)]
    accounts: Vec<AuthRecord>,
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

/// Accounts stored as salted PBKDF2 hashes in `auth.json`. The first account created is
/// an administrator; later ones are added by an administrator.
pub struct PasswordAuthority {
    path: PathBuf,
    iterations: u32,
    session: Mutex<Option<Identity>>,
}

impl PasswordAuthority {
    pub fn new(path: impl Into<PathBuf>, iterations: u32) -> Self {
        Self {
            path: path.into(),
            iterations: iterations.max(1),
            session: Mutex::new(None),
        }
    }

    pub fn is_configured(&self) -> Result<bool, AuthError> {
        Ok(!self.read_file()?.accounts.is_empty())
    }

    /// Creates the first administrator account.
    pub fn setup(&self, user: &str, password: &str) -> Result<(), AuthError> {
        let user = user.trim();
        if user.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let mut file = self.read_file()?;
        if !file.accounts.is_empty() {
            return Err(AuthError::AlreadyConfigured);
        }
        file.accounts
            .push(AuthRecord::new(user, password, self.iterations, true));
        self.write_file(&file)?;
        info!(user, "administrator account created");
        Ok(())
    }

    pub fn add_account(&self, user: &str, password: &str, admin: bool) -> Result<(), AuthError> {
        if !self.is_admin() {
            return Err(AuthError::AdminRequired);
        }
        let user = user.trim();
        if user.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let mut file = self.read_file()?;
        if file.accounts.iter().any(|account| account.user == user) {
            return Err(AuthError::DuplicateAccount(user.to_string()));
        }
        file.accounts
            .push(AuthRecord::new(user, password, self.iterations, admin));
        self.write_file(&file)?;
        info!(user, admin, "account added");
        Ok(())
    }

    pub fn sign_in(&self, user: &str, password: &str) -> Result<Identity, AuthError> {
        let user = user.trim();
        if user.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let file = self.read_file()?;
        let Some(account) = file
            .accounts
            .iter()
            .find(|account| account.user == user && account.verify(password))
        else {
            warn!(user, "sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        };
        let identity = Identity {
            user: account.user.clone(),
            is_admin: account.admin,
        };
        *self.session.lock().map_err(|_| AuthError::Poisoned)? = Some(identity.clone());
        info!(user, admin = identity.is_admin, "signed in");
        Ok(identity)
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.session.lock() {
            if let Some(identity) = guard.take() {
                info!(user = %identity.user, "signed out");
            }
        }
    }

    /// Changes the password of the signed-in account.
    pub fn change_password(&self, current: &str, next: &str) -> Result<(), AuthError> {
        let Some(identity) = self.current_identity() else {
            return Err(AuthError::InvalidCredentials);
        };
        if current.is_empty() || next.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let mut file = self.read_file()?;
        let Some(account) = file
            .accounts
            .iter_mut()
            .find(|account| account.user == identity.user)
        else {
            return Err(AuthError::InvalidCredentials);
        };
        if !account.verify(current) {
            return Err(AuthError::InvalidCredentials);
        }
        *account = AuthRecord::new(&identity.user, next, account.iterations, account.admin);
        self.write_file(&file)?;
        info!(user = %identity.user, "password changed");
        Ok(())
    }

    fn read_file(&self) -> Result<AuthFile, AuthError> {
        let Some(raw) = read_text_file(&self.path)? else {
            return Ok(AuthFile::default());
        };
        Ok(serde_json::from_str(raw.as_str())?)
    }

    fn write_file(&self, file: &AuthFile) -> Result<(), AuthError> {
        let content = serde_json::to_string_pretty(file)?;
        write_text_file(&self.path, content.as_str())?;
        Ok(())
    }
}

impl AdminAuthority for PasswordAuthority {
    fn current_identity(&self) -> Option<Identity> {
        self.session.lock().ok()?.clone()
    }
}
