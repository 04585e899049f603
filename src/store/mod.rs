//! Persistent credential and session storage.
//!
//! Credentials (account e-mail plus API token) and the cached session token
//! live in separate TOML files under the state directory so the session file
//! can be rewritten freely without touching the secret.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
#[cfg(unix)]
use cap_std::fs::{DirBuilderExt, OpenOptionsExt};
use cap_std::fs::{DirBuilder, OpenOptions};
use cap_std::{ambient_authority, fs_utf8::Dir};
use chrono::{DateTime, Utc};
use ortho_config::toml;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CREDENTIALS_FILE_NAME: &str = "credentials.toml";
const SESSION_FILE_NAME: &str = "session.toml";
const STATE_DIR_NAME: &str = ".elestio";

/// Account identity and API secret used to obtain session tokens.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct Credential {
    /// Account e-mail address.
    pub identity: String,
    /// API token issued by the dashboard.
    pub secret: String,
}

impl Credential {
    /// Builds a credential, trimming surrounding whitespace.
    #[must_use]
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into().trim().to_owned(),
            secret: secret.into().trim().to_owned(),
        }
    }

    /// Returns `true` when both halves of the credential are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.identity.is_empty() && !self.secret.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Cached session token and its client-side expiry.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Session {
    /// Opaque bearer token returned by the authentication endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Instant after which the token must no longer be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Session {
    /// Builds a populated session.
    #[must_use]
    pub fn new(token: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            token: Some(token.into()),
            expiry: Some(expiry),
        }
    }

    /// Returns an empty session with neither token nor expiry.
    #[must_use]
    pub const fn cleared() -> Self {
        Self {
            token: None,
            expiry: None,
        }
    }
}

/// Errors raised while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when no state directory could be determined.
    #[error("cannot determine state directory: set ELESTIO_STATE_DIR or HOME")]
    NoStateDir,
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a stored file cannot be parsed or rendered.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Read/write access to the configured credential.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credential, or `None` when not configured.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing storage cannot be read.
    fn load_credential(&self) -> Result<Option<Credential>, StoreError>;

    /// Replaces the stored credential.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing storage cannot be written.
    fn save_credential(&self, credential: &Credential) -> Result<(), StoreError>;
}

/// Read/write access to the persisted session.
pub trait SessionStore: Send + Sync {
    /// Returns the persisted session; an absent session loads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing storage cannot be read.
    fn load_session(&self) -> Result<Session, StoreError>;

    /// Replaces the persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backing storage cannot be written.
    fn save_session(&self, session: &Session) -> Result<(), StoreError>;
}

/// Stores credentials and sessions as TOML files in a state directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: Utf8PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// the first write.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a store rooted at `$HOME/.elestio`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoStateDir`] when `HOME` is unset or not UTF-8.
    pub fn in_home() -> Result<Self, StoreError> {
        let home = std::env::var("HOME").map_err(|_| StoreError::NoStateDir)?;
        if home.trim().is_empty() {
            return Err(StoreError::NoStateDir);
        }
        Ok(Self::new(Utf8PathBuf::from(home).join(STATE_DIR_NAME)))
    }

    /// Returns the state directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the credential file path.
    #[must_use]
    pub fn credentials_path(&self) -> Utf8PathBuf {
        self.root.join(CREDENTIALS_FILE_NAME)
    }

    /// Returns the session file path.
    #[must_use]
    pub fn session_path(&self) -> Utf8PathBuf {
        self.root.join(SESSION_FILE_NAME)
    }

    fn read_optional(&self, file_name: &str) -> Result<Option<String>, StoreError> {
        let path = self.root.join(file_name);
        let dir = match Dir::open_ambient_dir(&self.root, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    message: err.to_string(),
                });
            }
        };

        match dir.read_to_string(file_name) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io {
                path,
                message: err.to_string(),
            }),
        }
    }

    fn write(&self, file_name: &str, contents: &str) -> Result<(), StoreError> {
        let dir = self
            .open_private_root()
            .map_err(|err| io_error(self.root.clone(), &err))?;
        let path = self.root.join(file_name);
        let mut file = dir
            .open_with(file_name, &private_file_options())
            .map_err(|err| io_error(path.clone(), &err))?;
        file.write_all(contents.as_bytes())
            .map_err(|err| io_error(path, &err))
    }

    /// Opens the state directory, creating it owner-only when missing.
    fn open_private_root(&self) -> io::Result<Dir> {
        let (Some(parent), Some(name)) = (self.root.parent(), self.root.file_name()) else {
            Dir::create_ambient_dir_all(&self.root, ambient_authority())?;
            return Dir::open_ambient_dir(&self.root, ambient_authority());
        };
        let parent_path = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        Dir::create_ambient_dir_all(parent_path, ambient_authority())?;
        let parent_dir = Dir::open_ambient_dir(parent_path, ambient_authority())?;
        match parent_dir.create_dir_with(name, &private_dir_builder()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
        parent_dir.open_dir(name)
    }
}

fn io_error(path: Utf8PathBuf, err: &io::Error) -> StoreError {
    StoreError::Io {
        path,
        message: err.to_string(),
    }
}

fn private_dir_builder() -> DirBuilder {
    #[cfg(unix)]
    {
        let mut builder = DirBuilder::new();
        builder.mode(0o700);
        builder
    }
    #[cfg(not(unix))]
    {
        DirBuilder::new()
    }
}

fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
}

impl CredentialStore for FileStore {
    fn load_credential(&self) -> Result<Option<Credential>, StoreError> {
        let Some(contents) = self.read_optional(CREDENTIALS_FILE_NAME)? else {
            return Ok(None);
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }

        let credential: Credential = parse_toml(&self.credentials_path(), &contents)?;
        Ok(credential.is_complete().then_some(credential))
    }

    fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let rendered = render_toml(&self.credentials_path(), credential)?;
        self.write(CREDENTIALS_FILE_NAME, &rendered)
    }
}

impl SessionStore for FileStore {
    fn load_session(&self) -> Result<Session, StoreError> {
        let Some(contents) = self.read_optional(SESSION_FILE_NAME)? else {
            return Ok(Session::cleared());
        };
        if contents.trim().is_empty() {
            return Ok(Session::cleared());
        }
        parse_toml(&self.session_path(), &contents)
    }

    fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let rendered = render_toml(&self.session_path(), session)?;
        self.write(SESSION_FILE_NAME, &rendered)
    }
}

fn parse_toml<T>(path: &Utf8Path, contents: &str) -> Result<T, StoreError>
where
    T: for<'de> Deserialize<'de>,
{
    toml::from_str(contents).map_err(|err| StoreError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn render_toml<T: Serialize>(path: &Utf8Path, value: &T) -> Result<String, StoreError> {
    toml::to_string_pretty(value).map_err(|err| StoreError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
