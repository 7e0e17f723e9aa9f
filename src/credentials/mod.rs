//! Credential store shared between the reconciliation loop and the engine
//!
//! Wi-Fi and login credentials are two field groups, each behind its own
//! mutex. Only the [`CredentialWriter`] (held by the reconciliation loop)
//! can change them; everyone else reads snapshots through a
//! [`CredentialReader`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Last-known credentials, as persisted by the web portal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSnapshot {
    #[serde(default)]
    pub wifi_name: Option<String>,
    #[serde(default)]
    pub wifi_password: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A Wi-Fi network name and its password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub name: String,
    pub password: String,
}

/// A remote account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl CredentialSnapshot {
    /// Read the snapshot from its JSON file.
    ///
    /// A missing file is not an error and yields `None`.
    pub fn read(path: &Path) -> Result<Option<Self>, CredentialError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialError::Io(e)),
        };
        let snapshot = serde_json::from_str(&contents)?;
        Ok(Some(snapshot))
    }

    /// Both Wi-Fi fields, if both are present and non-empty
    pub fn wifi(&self) -> Option<WifiCredentials> {
        match (non_empty(&self.wifi_name), non_empty(&self.wifi_password)) {
            (Some(name), Some(password)) => Some(WifiCredentials {
                name: name.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        }
    }

    /// Both login fields, if both are present and non-empty
    pub fn login(&self) -> Option<LoginCredentials> {
        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => Some(LoginCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read credentials file: {0}")]
    Io(#[from] std::io::Error),

    #[error("credentials file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Default)]
struct Inner {
    wifi: Mutex<WifiFields>,
    login: Mutex<LoginFields>,
}

#[derive(Default)]
struct WifiFields {
    name: Option<String>,
    password: Option<String>,
}

#[derive(Default)]
struct LoginFields {
    username: Option<String>,
    password: Option<String>,
}

impl Inner {
    // Poisoned locks still hold consistent field groups; each group is
    // replaced wholesale under its lock.
    fn wifi(&self) -> MutexGuard<'_, WifiFields> {
        self.wifi.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn login(&self) -> MutexGuard<'_, LoginFields> {
        self.login.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> CredentialSnapshot {
        // Lock order: wifi, then login
        let wifi = self.wifi();
        let login = self.login();
        CredentialSnapshot {
            wifi_name: wifi.name.clone(),
            wifi_password: wifi.password.clone(),
            username: login.username.clone(),
            password: login.password.clone(),
        }
    }
}

/// Create an empty store, returning its single writer and a reader
pub fn store() -> (CredentialWriter, CredentialReader) {
    let inner = Arc::new(Inner::default());
    (
        CredentialWriter {
            inner: Arc::clone(&inner),
        },
        CredentialReader { inner },
    )
}

/// Write access to the credential store. Not cloneable.
pub struct CredentialWriter {
    inner: Arc<Inner>,
}

impl CredentialWriter {
    /// Replace both field groups with the values from `snapshot`
    pub fn set(&self, snapshot: &CredentialSnapshot) {
        {
            let mut wifi = self.inner.wifi();
            wifi.name = snapshot.wifi_name.clone();
            wifi.password = snapshot.wifi_password.clone();
        }
        let mut login = self.inner.login();
        login.username = snapshot.username.clone();
        login.password = snapshot.password.clone();
    }

    /// True if `snapshot` differs from the stored credentials
    pub fn differs_from(&self, snapshot: &CredentialSnapshot) -> bool {
        self.inner.snapshot() != *snapshot
    }

    #[cfg(test)]
    pub fn reader(&self) -> CredentialReader {
        CredentialReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only access to the credential store
#[derive(Clone)]
pub struct CredentialReader {
    inner: Arc<Inner>,
}

impl CredentialReader {
    #[cfg(test)]
    pub fn get(&self) -> CredentialSnapshot {
        self.inner.snapshot()
    }

    /// Current username, if any
    pub fn username(&self) -> Option<String> {
        self.inner.login().username.clone()
    }
}
