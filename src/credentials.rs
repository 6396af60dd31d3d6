//! Authentication credential lifecycle: hydrate, login, register, logout.
//!
//! Durable state is exactly two string entries, `authToken` and `authEmail`.
//! Token presence is the only thing the rest of the client gates on.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::endpoints;
use crate::gateway::{DataGateway, FetchOutcome};

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const AUTH_EMAIL_KEY: &str = "authEmail";

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub email: String,
    #[serde(skip_serializing)]
    pub token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AuthError {
    #[error("{0}")]
    Rejected(String),
    #[error("login response did not contain a token")]
    MissingToken,
    #[error("orchestrator is not running")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("credential store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable string key/value storage for the credential pair.
pub trait CredentialStore: Send + 'static {
    fn read(&self, key: &str) -> Result<Option<String>, CredentialStoreError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), CredentialStoreError>;
    fn remove(&mut self, key: &str) -> Result<(), CredentialStoreError>;
}

#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        let store = Self::new();
        {
            let mut guard = store.lock();
            for (key, value) in entries {
                guard.insert((*key).to_string(), (*value).to_string());
            }
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .expect("credential store lock should not be poisoned")
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), CredentialStoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), CredentialStoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// JSON object on disk; a missing file reads as empty.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Map<String, Value>, CredentialStoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let bytes = fs::read(&self.path)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, entries: &Map<String, Value>) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&serde_json::to_vec_pretty(entries)?)?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn read(&self, key: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self
            .load()?
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), CredentialStoreError> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), Value::String(value.to_string()));
        self.save(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<(), CredentialStoreError> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    email: String,
}

pub struct CredentialManager {
    store: Box<dyn CredentialStore>,
    current: Option<Credential>,
}

impl CredentialManager {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    /// Reads the durable pair once. Missing, partial or unreadable data is `None`.
    pub fn hydrate(&mut self) -> Option<Credential> {
        let token = self.read_entry(AUTH_TOKEN_KEY);
        let email = self.read_entry(AUTH_EMAIL_KEY);

        self.current = match (token, email) {
            (Some(token), Some(email)) if !token.is_empty() => Some(Credential { email, token }),
            _ => None,
        };

        info!(
            component = "credentials",
            event = "auth.hydrate",
            authenticated = self.current.is_some()
        );
        self.current.clone()
    }

    pub fn current(&self) -> Option<&Credential> {
        self.current.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|credential| !credential.token.is_empty())
    }

    pub async fn login(
        &mut self,
        gateway: &DataGateway,
        email: &str,
        password: &str,
    ) -> Result<Credential, AuthError> {
        let outcome = gateway.call(&endpoints::login(email, password)).await;
        self.complete_login(email, outcome)
    }

    /// Applies a login response. Failure clears the in-memory credential only;
    /// whatever was persisted before is left alone.
    pub fn complete_login(
        &mut self,
        email: &str,
        outcome: FetchOutcome<Value>,
    ) -> Result<Credential, AuthError> {
        let response = match outcome.decode::<LoginResponse>() {
            FetchOutcome::Success(response) => response,
            FetchOutcome::Failure(message) => {
                self.current = None;
                warn!(
                    component = "credentials",
                    event = "auth.login.failure",
                    email,
                    message = %message
                );
                return Err(AuthError::Rejected(message));
            }
        };

        if response.token.is_empty() {
            self.current = None;
            warn!(
                component = "credentials",
                event = "auth.login.failure",
                email,
                message = "missing token"
            );
            return Err(AuthError::MissingToken);
        }

        let credential = Credential {
            email: if response.email.is_empty() {
                email.to_string()
            } else {
                response.email
            },
            token: response.token,
        };

        self.persist(&credential);
        self.current = Some(credential.clone());
        info!(
            component = "credentials",
            event = "auth.login.success",
            email = %credential.email
        );
        Ok(credential)
    }

    pub async fn register(
        &self,
        gateway: &DataGateway,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let outcome = gateway.call(&endpoints::register(email, password)).await;
        Self::complete_register(email, outcome)
    }

    pub fn complete_register(email: &str, outcome: FetchOutcome<Value>) -> Result<(), AuthError> {
        match outcome {
            FetchOutcome::Success(_) => {
                info!(component = "credentials", event = "auth.register.success", email);
                Ok(())
            }
            FetchOutcome::Failure(message) => {
                warn!(
                    component = "credentials",
                    event = "auth.register.failure",
                    email,
                    message = %message
                );
                Err(AuthError::Rejected(message))
            }
        }
    }

    /// Clears both durable entries and the in-memory credential. Safe to repeat.
    pub fn logout(&mut self) {
        for key in [AUTH_TOKEN_KEY, AUTH_EMAIL_KEY] {
            if let Err(err) = self.store.remove(key) {
                warn!(
                    component = "credentials",
                    event = "auth.store.remove_failed",
                    key,
                    error = %err
                );
            }
        }
        let was_authenticated = self.current.take().is_some();
        info!(
            component = "credentials",
            event = "auth.logout",
            was_authenticated
        );
    }

    fn persist(&mut self, credential: &Credential) {
        let writes = [
            (AUTH_TOKEN_KEY, credential.token.as_str()),
            (AUTH_EMAIL_KEY, credential.email.as_str()),
        ];
        for (key, value) in writes {
            if let Err(err) = self.store.write(key, value) {
                warn!(
                    component = "credentials",
                    event = "auth.store.write_failed",
                    key,
                    error = %err
                );
            }
        }
    }

    fn read_entry(&self, key: &str) -> Option<String> {
        match self.store.read(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    component = "credentials",
                    event = "auth.store.read_failed",
                    key,
                    error = %err
                );
                None
            }
        }
    }
}
