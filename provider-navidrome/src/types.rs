//! Navidrome and Subsonic API response types

use serde::Deserialize;

/// Placeholder names for incomplete tags
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Page of Navidrome's native `api/library/tracks` listing
#[derive(Debug, Deserialize)]
pub struct TrackPage {
    #[serde(default)]
    pub items: Vec<NativeTrack>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

/// Track as returned by the native API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTrack {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub cover_url: Option<String>,
    pub size: Option<u64>,
    pub created: Option<String>,
}

/// `{"subsonic-response": {...}}`
#[derive(Debug, Deserialize)]
pub struct SubsonicEnvelope {
    #[serde(rename = "subsonic-response")]
    pub response: SubsonicBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsonicBody {
    pub status: String,
    pub error: Option<SubsonicErrorBody>,
    pub artists: Option<ArtistIndexes>,
    pub artist: Option<ArtistWithAlbums>,
    pub album: Option<AlbumWithSongs>,
    pub song: Option<SubsonicSong>,
    pub song_list: Option<SongList>,
}

impl SubsonicBody {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "Subsonic API returned an error".to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct SubsonicErrorBody {
    #[serde(default)]
    pub code: i32,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtistIndexes {
    #[serde(default)]
    pub index: Vec<ArtistIndex>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtistIndex {
    #[serde(default)]
    pub artist: Vec<SubsonicArtist>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsonicArtist {
    pub id: String,
    pub name: Option<String>,
    pub cover_art: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtistWithAlbums {
    #[serde(default)]
    pub album: Vec<SubsonicAlbum>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsonicAlbum {
    pub id: String,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub cover_art: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlbumWithSongs {
    pub song: Option<OneOrMany<SubsonicSong>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SongList {
    pub song: Option<OneOrMany<SubsonicSong>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsonicSong {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Option<f64>,
    pub cover_art: Option<String>,
    pub size: Option<u64>,
    pub created: Option<String>,
}

/// Some servers collapse single-element arrays into an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// First non-blank candidate, else `fallback`
pub fn first_present(candidates: &[Option<&str>], fallback: &str) -> String {
    candidates
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
