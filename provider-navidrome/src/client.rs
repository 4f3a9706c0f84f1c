//! Navidrome / Subsonic client implementation
//!
//! Implements [`MediaServerClient`] over the host [`HttpClient`].

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::media::{AuthContext, MediaServerClient, Track};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::auth::{bearer_token, join_url, normalize_base_url, resolve_subsonic_auth, SubsonicAuth};
use crate::error::{NavidromeError, Result};
use crate::types::{
    first_present, NativeTrack, SubsonicAlbum, SubsonicBody, SubsonicEnvelope, SubsonicSong,
    TrackPage, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE,
};

/// Page size for the native track listing
const DEFAULT_PAGE_SIZE: usize = 200;

/// Per-request timeout for catalog calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for Navidrome and Subsonic-compatible servers
///
/// Stateless apart from the HTTP client: every call receives its
/// [`AuthContext`], so switching servers needs no reconfiguration.
///
/// # Example
///
/// ```ignore
/// use provider_navidrome::NavidromeClient;
/// use bridge_traits::media::{AuthContext, MediaServerClient};
///
/// let client = NavidromeClient::new(http_client);
/// let auth = AuthContext::new("music.example.com").with_password("ana", "secret");
/// let tracks = client.fetch_track_list(&auth).await?;
/// let url = client.build_stream_url(&auth, &tracks[0].id)?;
/// ```
pub struct NavidromeClient {
    http_client: Arc<dyn HttpClient>,
    retry_policy: RetryPolicy,
    page_size: usize,
}

impl NavidromeClient {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            retry_policy: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    // =========================================================================
    // URL construction
    // =========================================================================

    /// `{base}rest/stream?u=..&t=..&s=..&v=..&c=..&f=json&id={track_id}`
    pub fn stream_url(&self, auth: &AuthContext, track_id: &str) -> Result<String> {
        let base = normalize_base_url(&auth.base_url)?;
        let subsonic = resolve_subsonic_auth(auth).ok_or(NavidromeError::MissingCredentials)?;

        let mut url = join(&base, "rest/stream")?;
        subsonic.apply_to(&mut url);
        url.query_pairs_mut().append_pair("id", track_id);
        Ok(url.into())
    }

    fn cover_url(base: &Url, auth: &SubsonicAuth, cover_id: Option<&str>) -> Option<String> {
        let cover_id = cover_id.map(str::trim).filter(|id| !id.is_empty())?;
        let mut url = join(base, "rest/getCoverArt").ok()?;
        auth.apply_to(&mut url);
        url.query_pairs_mut().append_pair("id", cover_id);
        Some(url.into())
    }

    // =========================================================================
    // Transport
    // =========================================================================

    async fn get_json<T: DeserializeOwned>(&self, url: Url, bearer: Option<&str>) -> Result<T> {
        let mut request = HttpRequest::get(url.as_str())
            .accept_json()
            .timeout(REQUEST_TIMEOUT);
        if let Some(token) = bearer {
            request = request.bearer_token(token);
        }

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?;

        if !response.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "<non-text body>".to_string());
            return Err(NavidromeError::ApiError {
                status_code: response.status,
                message,
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| NavidromeError::ParseError(e.to_string()))
    }

    /// Call `rest/{endpoint}` with optional extra params and unwrap the envelope
    async fn subsonic_call(
        &self,
        base: &Url,
        auth: &SubsonicAuth,
        endpoint: &str,
        id: Option<&str>,
    ) -> Result<SubsonicBody> {
        let mut url = join(base, &format!("rest/{}", endpoint))?;
        if let Some(id) = id {
            url.query_pairs_mut().append_pair("id", id);
        }
        auth.apply_to(&mut url);

        debug!(endpoint, "Subsonic request");
        let envelope: SubsonicEnvelope = self.get_json(url, None).await?;
        let body = envelope.response;
        if !body.is_ok() {
            return Err(NavidromeError::SubsonicFailure(body.error_message()));
        }
        Ok(body)
    }

    // =========================================================================
    // Catalog listing
    // =========================================================================

    async fn list_with_bearer(&self, base_url: &str, token: &str) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut offset = 0usize;

        loop {
            let url = join_url(
                base_url,
                &format!("api/library/tracks?limit={}&offset={}", self.page_size, offset),
            )?;
            let page: TrackPage = self.get_json(url, Some(token)).await?;
            let received = page.items.len();
            tracks.extend(page.items.into_iter().map(native_to_track));

            if received < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        Ok(tracks)
    }

    async fn list_with_subsonic(&self, base: &Url, auth: &SubsonicAuth) -> Result<Vec<Track>> {
        let artists = self
            .subsonic_call(base, auth, "getArtists", None)
            .await?
            .artists
            .map(|indexes| {
                indexes
                    .index
                    .into_iter()
                    .flat_map(|group| group.artist)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut tracks = Vec::new();
        for artist in artists {
            let albums = self
                .subsonic_call(base, auth, "getArtist", Some(&artist.id))
                .await?
                .artist
                .map(|a| a.album)
                .unwrap_or_default();

            for album in albums {
                let songs = self
                    .subsonic_call(base, auth, "getAlbum", Some(&album.id))
                    .await?
                    .album
                    .and_then(|a| a.song)
                    .map(|s| s.into_vec())
                    .unwrap_or_default();

                tracks.extend(songs.into_iter().map(|song| {
                    song_to_track(song, Some(&album), artist.name.as_deref(), base, auth)
                }));
            }
        }

        Ok(tracks)
    }

    /// Full catalog, preferring the bearer-token API.
    #[instrument(skip(self, auth))]
    pub async fn list_tracks(&self, auth: &AuthContext) -> Result<Vec<Track>> {
        let base = normalize_base_url(&auth.base_url)?;
        let mut failures = Vec::new();

        if let Some(token) = bearer_token(auth) {
            match self.list_with_bearer(&auth.base_url, token).await {
                Ok(tracks) => {
                    info!(count = tracks.len(), "Fetched catalog with bearer token");
                    return Ok(tracks);
                }
                Err(e) => {
                    warn!(error = %e, "Bearer catalog request failed");
                    failures.push(format!("bearer authentication failed: {}", e));
                }
            }
        }

        if let Some(subsonic) = resolve_subsonic_auth(auth) {
            match self.list_with_subsonic(&base, &subsonic).await {
                Ok(tracks) => {
                    info!(count = tracks.len(), "Fetched catalog through Subsonic API");
                    return Ok(tracks);
                }
                Err(e) => {
                    warn!(error = %e, "Subsonic catalog walk failed");
                    failures.push(format!("Subsonic request failed: {}", e));
                }
            }
        }

        if failures.is_empty() {
            Err(NavidromeError::MissingCredentials)
        } else {
            Err(NavidromeError::CatalogUnavailable(failures.join("; ")))
        }
    }

    /// One track by id.
    ///
    /// Uses `getSong` when Subsonic credentials exist; a bearer-only setup has
    /// to scan the full listing.
    #[instrument(skip(self, auth))]
    pub async fn get_track(&self, auth: &AuthContext, track_id: &str) -> Result<Track> {
        let base = normalize_base_url(&auth.base_url)?;

        if let Some(subsonic) = resolve_subsonic_auth(auth) {
            let body = self
                .subsonic_call(&base, &subsonic, "getSong", Some(track_id))
                .await?;
            let song = body
                .song
                .or_else(|| body.song_list.and_then(|l| l.song).and_then(|s| s.into_vec().into_iter().next()));
            if let Some(song) = song {
                return Ok(song_to_track(song, None, None, &base, &subsonic));
            }
        }

        self.list_tracks(auth)
            .await?
            .into_iter()
            .find(|t| t.id == track_id)
            .ok_or_else(|| NavidromeError::TrackNotFound {
                track_id: track_id.to_string(),
            })
    }
}

impl fmt::Debug for NavidromeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavidromeClient")
            .field("http_client", &"<HttpClient>")
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[async_trait]
impl MediaServerClient for NavidromeClient {
    async fn fetch_track_list(&self, auth: &AuthContext) -> bridge_traits::error::Result<Vec<Track>> {
        Ok(self.list_tracks(auth).await?)
    }

    fn build_stream_url(&self, auth: &AuthContext, track_id: &str) -> bridge_traits::error::Result<String> {
        Ok(self.stream_url(auth, track_id)?)
    }

    async fn fetch_track_by_id(
        &self,
        auth: &AuthContext,
        track_id: &str,
    ) -> bridge_traits::error::Result<Track> {
        Ok(self.get_track(auth, track_id).await?)
    }
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| NavidromeError::InvalidUrl(format!("{}: {}", path, e)))
}

fn native_to_track(item: NativeTrack) -> Track {
    Track {
        title: first_present(&[item.title.as_deref()], UNKNOWN_TITLE),
        artist: first_present(&[item.artist.as_deref()], UNKNOWN_ARTIST),
        album: first_present(&[item.album.as_deref()], UNKNOWN_ALBUM),
        duration: item.duration.unwrap_or(0.0),
        cover_url: item.cover_url,
        size: item.size,
        created: item.created,
        id: item.id,
    }
}

fn song_to_track(
    song: SubsonicSong,
    album: Option<&SubsonicAlbum>,
    artist_name: Option<&str>,
    base: &Url,
    auth: &SubsonicAuth,
) -> Track {
    let album_artist = album.and_then(|a| a.artist.as_deref());
    let album_name = album.and_then(|a| a.name.as_deref());
    let cover_id = song
        .cover_art
        .as_deref()
        .or_else(|| album.and_then(|a| a.cover_art.as_deref()));

    Track {
        title: first_present(&[song.title.as_deref()], UNKNOWN_TITLE),
        artist: first_present(&[song.artist.as_deref(), album_artist, artist_name], UNKNOWN_ARTIST),
        album: first_present(&[song.album.as_deref(), album_name], UNKNOWN_ALBUM),
        duration: song.duration.unwrap_or(0.0),
        cover_url: NavidromeClient::cover_url(base, auth, cover_id),
        size: song.size,
        created: song.created,
        id: song.id,
    }
}
