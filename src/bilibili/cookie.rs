//! Credential loading from a saved `Cookie` header file.

use std::path::{Path, PathBuf};

use cookie::Cookie;
use thiserror::Error;

/// Session cookie that authenticates the account.
const SESSION_COOKIE: &str = "SESSDATA";

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("Cookie file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read cookie file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cookie file {0} contains no cookies")]
    Empty(PathBuf),

    #[error("Invalid cookie in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Cookies parsed from a credential file, ready to send as one header.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieHeader {
    pairs: Vec<(String, String)>,
}

// Cookie values are credentials; keep them out of logs.
impl std::fmt::Debug for CookieHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.pairs.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("CookieHeader").field("names", &names).finish()
    }
}

impl CookieHeader {
    /// Parse the contents of a cookie file.
    ///
    /// The file holds a `Cookie` header value such as
    /// `SESSDATA=...; bili_jct=...; DedeUserID=...`, possibly split across
    /// lines. Lines starting with `#` are comments.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, CookieError> {
        let mut pairs = Vec::new();
        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            for parsed in Cookie::split_parse(line) {
                let c = parsed.map_err(|e| CookieError::Invalid {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
                pairs.push((c.name().to_string(), c.value().to_string()));
            }
        }
        if pairs.is_empty() {
            return Err(CookieError::Empty(path.to_path_buf()));
        }
        Ok(Self { pairs })
    }

    /// Read and parse a cookie file. A missing file is an error.
    pub async fn load(path: &Path) -> Result<Self, CookieError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CookieError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(CookieError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let header = Self::parse(path, &contents)?;
        if !header.has_session() {
            tracing::warn!(
                path = %path.display(),
                "Cookie file has no {} entry; private favorites will not be readable",
                SESSION_COOKIE
            );
        }
        tracing::debug!(count = header.pairs.len(), "Loaded cookies");
        Ok(header)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_session(&self) -> bool {
        self.get(SESSION_COOKIE).is_some_and(|v| !v.is_empty())
    }

    /// Value for the `Cookie` request header.
    pub fn header_value(&self) -> String {
        self.pairs
            .iter()
            .map(|(n, v)| format!("{}={}", n, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
