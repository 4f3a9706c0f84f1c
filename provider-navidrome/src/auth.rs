//! Server address and Subsonic credential handling.

use crate::error::{NavidromeError, Result};
use bridge_traits::media::AuthContext;
use rand::RngCore;
use std::fmt;
use url::Url;

/// Subsonic API version sent with every request
pub const SUBSONIC_API_VERSION: &str = "1.16.1";
/// Client name sent with every request
pub const SUBSONIC_CLIENT_NAME: &str = "musicboom";

/// Credentials in Subsonic token form (`t = md5(password + s)`).
#[derive(Clone, PartialEq, Eq)]
pub struct SubsonicAuth {
    pub username: String,
    pub token: String,
    pub salt: String,
}

impl SubsonicAuth {
    /// Derive a token from `password` with a fresh random salt
    pub fn from_password(username: impl Into<String>, password: &str) -> Self {
        let salt = generate_salt();
        let token = format!("{:x}", md5::compute(format!("{}{}", password, salt)));
        Self {
            username: username.into(),
            token,
            salt,
        }
    }

    /// Common query parameters in the order the server documents them
    pub fn query_pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("u", self.username.as_str()),
            ("t", self.token.as_str()),
            ("s", self.salt.as_str()),
            ("v", SUBSONIC_API_VERSION),
            ("c", SUBSONIC_CLIENT_NAME),
            ("f", "json"),
        ]
    }

    /// Set the common parameters on `url`, replacing any already present
    pub fn apply_to(&self, url: &mut Url) {
        let keep: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !self.query_pairs().iter().any(|(k, _)| *k == key.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &keep {
            pairs.append_pair(key, value);
        }
        for (key, value) in self.query_pairs() {
            pairs.append_pair(key, value);
        }
    }
}

impl fmt::Debug for SubsonicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsonicAuth")
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

/// 8 random bytes as lowercase hex
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Work out Subsonic credentials from an [`AuthContext`].
///
/// A username is required. An explicit `token`+`salt` pair wins over a
/// password; with neither there are no Subsonic credentials.
pub fn resolve_subsonic_auth(auth: &AuthContext) -> Option<SubsonicAuth> {
    let username = non_blank(auth.username.as_deref())?;

    if let (Some(token), Some(salt)) = (
        non_blank(auth.token.as_deref()),
        non_blank(auth.salt.as_deref()),
    ) {
        return Some(SubsonicAuth {
            username: username.to_string(),
            token: token.to_string(),
            salt: salt.to_string(),
        });
    }

    non_blank(auth.password.as_deref())
        .map(|password| SubsonicAuth::from_password(username, password))
}

/// Bearer token, if one is configured
pub fn bearer_token(auth: &AuthContext) -> Option<&str> {
    non_blank(auth.bearer_token.as_deref())
}

/// Parse the configured server address.
///
/// Defaults the scheme to `https` and makes sure the path ends in `/` so
/// relative joins keep any reverse-proxy prefix.
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NavidromeError::MissingBaseUrl);
    }

    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut base =
        Url::parse(&with_scheme).map_err(|e| NavidromeError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// Join `path` (which may carry its own query) onto the normalised base
pub fn join_url(base_url: &str, path: &str) -> Result<Url> {
    normalize_base_url(base_url)?
        .join(path)
        .map_err(|e| NavidromeError::InvalidUrl(format!("{}: {}", path, e)))
}

fn has_scheme(raw: &str) -> bool {
    match raw.find("://") {
        Some(idx) if idx > 0 => {
            let scheme = &raw[..idx];
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
        }
        _ => false,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
