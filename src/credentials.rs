// src/credentials.rs - Client credentials for the headset service
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CLIENT_ID_ENV: &str = "GAZE_CANVAS_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GAZE_CANVAS_CLIENT_SECRET";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

pub trait CredentialStore {
    fn get_credentials(&self) -> Option<Credentials>;
}

/// Reads `credentials.json` from the config directory. Environment variables
/// win over the file when both are set.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn default_location() -> Option<Self> {
        crate::config::project_dirs().map(|dirs| Self::new(dirs.config_dir().join("credentials.json")))
    }

    fn from_env() -> Option<Credentials> {
        let creds = Credentials {
            client_id: std::env::var(CLIENT_ID_ENV).ok()?,
            client_secret: std::env::var(CLIENT_SECRET_ENV).ok()?,
        };
        creds.is_complete().then_some(creds)
    }

    fn from_file(&self) -> Option<Credentials> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                debug!("No credentials at {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Credentials>(&text) {
            Ok(creds) if creds.is_complete() => Some(creds),
            Ok(_) => {
                warn!("Credentials in {} are incomplete", self.path.display());
                None
            }
            Err(e) => {
                warn!("Ignoring malformed credentials {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_credentials(&self) -> Option<Credentials> {
        Self::from_env().or_else(|| self.from_file())
    }
}
