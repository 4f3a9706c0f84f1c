//! Media Server Abstraction
//!
//! Contract between the core and a remote music server. The core never
//! inspects credentials: an [`AuthContext`] is handed through untouched to
//! whichever [`MediaServerClient`] is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// A song as known to the remote catalog.
///
/// The `id` is stable across sources: local imports, download records, cache
/// files and recent plays are all keyed by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    /// File size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            duration: 0.0,
            cover_url: None,
            size: None,
            created: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size = Some(bytes);
        self
    }
}

/// Opaque credentials for a media server.
///
/// Two shapes are supported: a bearer token, or a username with either a
/// pre-derived Subsonic `token` + `salt` pair or a plain password.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthContext {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_password(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_token(
        mut self,
        username: impl Into<String>,
        token: impl Into<String>,
        salt: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.token = Some(token.into());
        self.salt = Some(salt.into());
        self
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AuthContext")
            .field("base_url", &self.base_url)
            .field("bearer_token", &mask(&self.bearer_token))
            .field("username", &self.username)
            .field("token", &mask(&self.token))
            .field("salt", &mask(&self.salt))
            .field("password", &mask(&self.password))
            .finish()
    }
}

/// Remote media server client
///
/// # Example
///
/// ```ignore
/// use bridge_traits::media::{AuthContext, MediaServerClient};
///
/// async fn first_song(client: &dyn MediaServerClient, auth: &AuthContext) -> Result<String> {
///     let tracks = client.fetch_track_list(auth).await?;
///     let first = tracks.first().ok_or(BridgeError::NotAvailable("empty".into()))?;
///     client.build_stream_url(auth, &first.id)
/// }
/// ```
#[async_trait]
pub trait MediaServerClient: Send + Sync {
    /// Fetch the whole catalog visible to these credentials
    async fn fetch_track_list(&self, auth: &AuthContext) -> Result<Vec<Track>>;

    /// Build a URL that streams the raw audio of `track_id`
    ///
    /// Fails when the base URL or usable credentials are missing.
    fn build_stream_url(&self, auth: &AuthContext, track_id: &str) -> Result<String>;

    /// Fetch a single track's metadata
    async fn fetch_track_by_id(&self, auth: &AuthContext, track_id: &str) -> Result<Track>;
}
