//! Persisted credential cache keyed by account identifier.
//!
//! The cache is a small JSON document under the carina home directory. It
//! is rewritten in full on every change; concurrent processes race and the
//! last writer wins.

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::Account;

/// File name of the cache inside the carina home directory.
pub const CACHE_FILE_NAME: &str = "cache.json";

/// Cached state for one account.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Service endpoint resolved during authentication.
    pub endpoint: String,
    /// Token issued during authentication.
    pub token: String,
    /// When this account last checked for a newer release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_check: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Returns true when the entry holds both a token and an endpoint.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        !self.token.is_empty() && !self.endpoint.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
struct CacheFile {
    #[serde(default)]
    accounts: BTreeMap<String, CacheEntry>,
}

/// Errors raised while reading or writing the cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the cache file is not valid JSON.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the cache path has no file name.
    #[error("cache path {path} is missing a filename")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
    },
}

/// In-memory view of the cache file plus the path it is persisted to.
#[derive(Clone, Debug)]
pub struct CredentialCache {
    path: Utf8PathBuf,
    contents: CacheFile,
}

impl CredentialCache {
    /// Loads the cache from `path`; a missing file yields an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the file exists but cannot be read or
    /// parsed.
    pub fn load(path: impl Into<Utf8PathBuf>) -> Result<Self, CacheError> {
        let cache_path = path.into();
        let contents = match read_file(&cache_path)? {
            Some(text) if !text.trim().is_empty() => {
                serde_json::from_str(&text).map_err(|err| CacheError::Parse {
                    path: cache_path.clone(),
                    message: err.to_string(),
                })?
            }
            _ => CacheFile::default(),
        };
        Ok(Self {
            path: cache_path,
            contents,
        })
    }

    /// Location of the cache file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the cached state for `account_id`.
    #[must_use]
    pub fn entry(&self, account_id: &str) -> Option<&CacheEntry> {
        self.contents.accounts.get(account_id)
    }

    /// Number of cached accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.accounts.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.accounts.is_empty()
    }

    /// Overwrites the endpoint and token cached for `account` and persists.
    /// The recorded update check is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the file cannot be written.
    pub fn save_account(&mut self, account: &Account) -> Result<(), CacheError> {
        let fresh = account.build_cache();
        let entry = self.contents.accounts.entry(account.id()).or_default();
        entry.endpoint = fresh.endpoint;
        entry.token = fresh.token;
        self.write()
    }

    /// Records when `account_id` last checked for a newer release.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the file cannot be written.
    pub fn save_last_update_check(
        &mut self,
        account_id: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.contents
            .accounts
            .entry(account_id.to_owned())
            .or_default()
            .last_update_check = Some(checked_at);
        self.write()
    }

    /// Drops the entry for `account_id`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the file cannot be written.
    pub fn remove(&mut self, account_id: &str) -> Result<bool, CacheError> {
        if self.contents.accounts.remove(account_id).is_none() {
            return Ok(false);
        }
        self.write()?;
        Ok(true)
    }

    fn write(&self) -> Result<(), CacheError> {
        let (parent, file_name) = split_path(&self.path)?;
        Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| CacheError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
            CacheError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            }
        })?;

        let rendered =
            serde_json::to_string_pretty(&self.contents).map_err(|err| CacheError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;

        dir.write(file_name, rendered)
            .map_err(|err| CacheError::Io {
                path: self.path.clone(),
                message: err.to_string(),
            })
    }
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), CacheError> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let parent_dir = if parent.as_str().is_empty() {
        Utf8Path::new(".")
    } else {
        parent
    };
    let file_name = path.file_name().ok_or_else(|| CacheError::InvalidPath {
        path: path.to_path_buf(),
    })?;
    Ok((parent_dir, file_name))
}

fn read_file(path: &Utf8Path) -> Result<Option<String>, CacheError> {
    let (parent, file_name) = split_path(path)?;
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(CacheError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            });
        }
    };

    match dir.read_to_string(file_name) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(CacheError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}
