//! Login gate in front of the chat.
//!
//! Users live in a YAML credential file with bcrypt password hashes. A
//! successful login leaves a signed, expiring token next to the config so the
//! next launch can skip the prompt.

use bcrypt::DEFAULT_COST;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AuthError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialStore {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub cookie: CookieConfig,
    #[serde(default)]
    pub preauthorized: Preauthorized,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub usernames: BTreeMap<String, UserRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub email: String,
    pub name: String,
    /// bcrypt hash
    pub password: String,
}

/// Remembered-login settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    /// Secret mixed into the token signature
    pub key: String,
    pub expiry_days: i64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "duochat_auth".to_string(),
            key: uuid::Uuid::new_v4().simple().to_string(),
            expiry_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preauthorized {
    #[serde(default)]
    pub emails: Vec<String>,
}

impl CredentialStore {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AuthError::Store(format!(
                "cannot read {} ({}); run `duochat init` first",
                path.display(),
                e
            ))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| AuthError::Store(format!("cannot parse {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| AuthError::Store(e.to_string()))?;
        }
        let content =
            serde_yaml::to_string(self).map_err(|e| AuthError::Store(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| AuthError::Store(format!("cannot write {}: {}", path.display(), e)))
    }

    pub fn user(&self, username: &str) -> Option<&UserRecord> {
        self.credentials.usernames.get(username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated { username: String, name: String },
    Rejected,
    /// Nothing submitted yet
    Pending,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthStatus::Authenticated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RememberedLogin {
    username: String,
    /// Unix seconds
    expires_at: i64,
    signature: String,
}

fn sign(key: &str, username: &str, expires_at: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", key, username, expires_at));
    format!("{:x}", hasher.finalize())
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    hash_password_with_cost(plain, DEFAULT_COST)
}

pub fn hash_password_with_cost(plain: &str, cost: u32) -> Result<String, AuthError> {
    if plain.is_empty() {
        return Err(AuthError::EmptyPassword);
    }
    Ok(bcrypt::hash(plain, cost)?)
}

pub struct Authenticator {
    store: CredentialStore,
    store_path: PathBuf,
    token_dir: PathBuf,
    hash_cost: u32,
}

impl Authenticator {
    pub fn new(store: CredentialStore, store_path: PathBuf, token_dir: PathBuf) -> Self {
        Self {
            store,
            store_path,
            token_dir,
            hash_cost: DEFAULT_COST,
        }
    }

    /// Load the credential file named by the config
    pub fn open(config: &Config) -> Result<Self, AuthError> {
        let store = CredentialStore::load(&config.credentials_path)?;
        Ok(Self::new(
            store,
            config.credentials_path.clone(),
            config.home.clone(),
        ))
    }

    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    fn token_path(&self) -> PathBuf {
        self.token_dir.join(format!("{}.json", self.store.cookie.name))
    }

    /// Check a username/password pair and remember the login on success
    pub fn login(&self, username: &str, password: &str) -> Result<AuthStatus, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Ok(AuthStatus::Pending);
        }

        let Some(user) = self.store.user(username) else {
            info!(username, "login rejected: unknown user");
            return Ok(AuthStatus::Rejected);
        };

        match bcrypt::verify(password, &user.password) {
            Ok(true) => {}
            Ok(false) => {
                info!(username, "login rejected: wrong password");
                return Ok(AuthStatus::Rejected);
            }
            Err(e) => {
                warn!(username, error = %e, "stored password hash is unreadable");
                return Ok(AuthStatus::Rejected);
            }
        }

        self.remember(username)?;
        info!(username, "login accepted");
        Ok(AuthStatus::Authenticated {
            username: username.to_string(),
            name: user.name.clone(),
        })
    }

    fn remember(&self, username: &str) -> Result<(), AuthError> {
        let cookie = &self.store.cookie;
        let expires_at = (Utc::now() + Duration::days(cookie.expiry_days)).timestamp();
        let token = RememberedLogin {
            username: username.to_string(),
            expires_at,
            signature: sign(&cookie.key, username, expires_at),
        };

        let path = self.token_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| AuthError::Store(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(&token).map_err(|e| AuthError::Store(e.to_string()))?;
        fs::write(&path, json)
            .map_err(|e| AuthError::Store(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Pick up a remembered login. Anything missing, expired or forged is
    /// treated as not logged in.
    pub fn resume(&self) -> AuthStatus {
        let path = self.token_path();
        let Ok(content) = fs::read_to_string(&path) else {
            return AuthStatus::Pending;
        };
        let token: RememberedLogin = match serde_json::from_str(&content) {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "ignoring malformed login token");
                return AuthStatus::Pending;
            }
        };

        if token.expires_at <= Utc::now().timestamp() {
            debug!(username = %token.username, "login token expired");
            return AuthStatus::Pending;
        }
        if token.signature != sign(&self.store.cookie.key, &token.username, token.expires_at) {
            warn!(username = %token.username, "login token signature mismatch");
            return AuthStatus::Pending;
        }

        match self.store.user(&token.username) {
            Some(user) => AuthStatus::Authenticated {
                username: token.username.clone(),
                name: user.name.clone(),
            },
            None => AuthStatus::Pending,
        }
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        let path = self.token_path();
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| AuthError::Store(format!("cannot remove {}: {}", path.display(), e)))?;
            info!("remembered login cleared");
        }
        Ok(())
    }

    /// Replace a user's password after checking the current one
    pub fn reset_password(
        &mut self,
        username: &str,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let hash_cost = self.hash_cost;
        let user = self
            .store
            .credentials
            .usernames
            .get_mut(username)
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;

        if !bcrypt::verify(current, &user.password)? {
            return Err(AuthError::WrongPassword);
        }
        user.password = hash_password_with_cost(new, hash_cost)?;

        self.store.save(&self.store_path)?;
        info!(username, "password updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COST: u32 = 4;

    fn store_with_alice() -> CredentialStore {
        let mut store = CredentialStore::default();
        store.credentials.usernames.insert(
            "alice".to_string(),
            UserRecord {
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
                password: hash_password_with_cost("secret", COST).unwrap(),
            },
        );
        store
    }

    fn authenticator(dir: &Path) -> Authenticator {
        let path = dir.join("credentials.yaml");
        let store = store_with_alice();
        store.save(&path).unwrap();
        Authenticator::new(store, path, dir.to_path_buf()).with_hash_cost(COST)
    }

    #[test]
    fn login_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(dir.path());

        assert_eq!(auth.login("", "secret").unwrap(), AuthStatus::Pending);
        assert_eq!(auth.login("alice", "").unwrap(), AuthStatus::Pending);
        assert_eq!(auth.login("bob", "secret").unwrap(), AuthStatus::Rejected);
        assert_eq!(auth.login("alice", "wrong").unwrap(), AuthStatus::Rejected);
        assert_eq!(
            auth.login("alice", "secret").unwrap(),
            AuthStatus::Authenticated {
                username: "alice".to_string(),
                name: "Alice".to_string()
            }
        );
    }

    #[test]
    fn remembered_login_survives_restart_until_logout() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(dir.path());
        assert_eq!(auth.resume(), AuthStatus::Pending);

        auth.login("alice", "secret").unwrap();
        assert!(dir.path().join("duochat_auth.json").exists());

        let reopened = Authenticator::new(
            CredentialStore::load(&dir.path().join("credentials.yaml")).unwrap(),
            dir.path().join("credentials.yaml"),
            dir.path().to_path_buf(),
        );
        assert!(reopened.resume().is_authenticated());

        reopened.logout().unwrap();
        assert_eq!(reopened.resume(), AuthStatus::Pending);
        reopened.logout().unwrap();
    }

    #[test]
    fn tampered_or_expired_token_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(dir.path());
        let token_path = dir.path().join("duochat_auth.json");

        let forged = RememberedLogin {
            username: "alice".to_string(),
            expires_at: Utc::now().timestamp() + 3600,
            signature: sign("other-key", "alice", Utc::now().timestamp() + 3600),
        };
        fs::write(&token_path, serde_json::to_string(&forged).unwrap()).unwrap();
        assert_eq!(auth.resume(), AuthStatus::Pending);

        let expires_at = Utc::now().timestamp() - 1;
        let expired = RememberedLogin {
            username: "alice".to_string(),
            expires_at,
            signature: sign(&auth.store.cookie.key, "alice", expires_at),
        };
        fs::write(&token_path, serde_json::to_string(&expired).unwrap()).unwrap();
        assert_eq!(auth.resume(), AuthStatus::Pending);

        fs::write(&token_path, "not json").unwrap();
        assert_eq!(auth.resume(), AuthStatus::Pending);
    }

    #[test]
    fn reset_password_persists_new_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut auth = authenticator(dir.path());

        assert!(matches!(
            auth.reset_password("alice", "wrong", "fresh"),
            Err(AuthError::WrongPassword)
        ));
        assert!(matches!(
            auth.reset_password("bob", "secret", "fresh"),
            Err(AuthError::UnknownUser(_))
        ));
        assert!(matches!(
            auth.reset_password("alice", "secret", ""),
            Err(AuthError::EmptyPassword)
        ));

        auth.reset_password("alice", "secret", "fresh").unwrap();
        assert_eq!(auth.login("alice", "secret").unwrap(), AuthStatus::Rejected);

        let reloaded = CredentialStore::load(&dir.path().join("credentials.yaml")).unwrap();
        let hash = &reloaded.user("alice").unwrap().password;
        assert!(bcrypt::verify("fresh", hash).unwrap());
    }

    #[test]
    fn credential_file_matches_documented_layout() {
        let yaml = r#"
credentials:
  usernames:
    alice:
      email: alice@example.com
      name: Alice
      password: $2b$04$abcdefghijklmnopqrstuu5Ps8jg0.0cv7vS1I9G5X6vCQYq6S.lS
cookie:
  name: chat_cookie
  key: abc
  expiry_days: 7
preauthorized:
  emails:
    - bob@example.com
"#;
        let store: CredentialStore = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(store.user("alice").unwrap().name, "Alice");
        assert_eq!(store.cookie.name, "chat_cookie");
        assert_eq!(store.cookie.expiry_days, 7);
        assert_eq!(store.preauthorized.emails, vec!["bob@example.com"]);
    }

    #[test]
    fn missing_credential_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CredentialStore::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, AuthError::Store(ref msg) if msg.contains("duochat init")));
    }
}
