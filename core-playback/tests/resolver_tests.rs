//! Source resolution against a real catalog database and file system.

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, HttpStream, RetryPolicy};
use bridge_traits::media::{AuthContext, MediaServerClient, Track};
use bridge_traits::storage::partial_path;
use bytes::Bytes;
use core_library::db::create_test_pool;
use core_library::models::{DownloadRecord, DownloadStatus, LocalSong};
use core_library::repositories::{
    DownloadRepository, LocalSongRepository, SqliteDownloadRepository, SqliteLocalSongRepository,
};
use core_playback::{
    PlaybackError, ResolverConfig, SourceHandle, SourceKind, SourceResolver, TrackResolver,
};
use core_runtime::settings::DownloadSettings;
use mockall::mock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> BridgeResult<HttpResponse>;
        async fn download_stream(&self, url: String) -> BridgeResult<HttpStream>;
    }
}

mock! {
    MediaServer {}

    #[async_trait]
    impl MediaServerClient for MediaServer {
        async fn fetch_track_list(&self, auth: &AuthContext) -> BridgeResult<Vec<Track>>;
        fn build_stream_url(&self, auth: &AuthContext, track_id: &str) -> BridgeResult<String>;
        async fn fetch_track_by_id(&self, auth: &AuthContext, track_id: &str) -> BridgeResult<Track>;
    }
}

struct Fixture {
    dir: TempDir,
    local_songs: Arc<SqliteLocalSongRepository>,
    downloads: Arc<SqliteDownloadRepository>,
    settings: Arc<SqliteSettingsStore>,
}

impl Fixture {
    async fn new() -> Self {
        let pool = create_test_pool().await.unwrap();
        Self {
            dir: tempfile::tempdir().unwrap(),
            local_songs: Arc::new(SqliteLocalSongRepository::new(pool.clone())),
            downloads: Arc::new(SqliteDownloadRepository::new(pool)),
            settings: Arc::new(SqliteSettingsStore::in_memory().await.unwrap()),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cache_dir(&self) -> PathBuf {
        self.path("cache")
    }

    async fn enable_cache(&self) {
        let settings = DownloadSettings {
            cache_dir: self.cache_dir().to_string_lossy().into_owned(),
            ..Default::default()
        };
        settings.save(self.settings.as_ref()).await.unwrap();
    }

    async fn add_local(&self, id: &str, path: &Path) {
        self.local_songs
            .upsert(&LocalSong {
                id: id.into(),
                title: "Local".into(),
                artist: "Local File".into(),
                album: "Local File".into(),
                size: 3,
                path: path.to_string_lossy().into_owned(),
                created: None,
            })
            .await
            .unwrap();
    }

    async fn add_download(&self, track: &Track, path: &Path) {
        let mut record = DownloadRecord::pending(track);
        record.status = DownloadStatus::Success;
        record.progress = 100;
        record.file_path = Some(path.to_string_lossy().into_owned());
        self.downloads.upsert(&record).await.unwrap();
    }

    fn resolver(&self, http: MockHttp, media: MockMediaServer) -> SourceResolver {
        SourceResolver::new(
            self.local_songs.clone(),
            self.downloads.clone(),
            self.settings.clone(),
            Arc::new(TokioFileSystem::new()),
            Arc::new(http),
            Arc::new(media),
        )
    }
}

fn track(id: &str) -> Track {
    Track::new(id, "Song", "Artist", "Album").with_duration(180.0)
}

fn auth() -> AuthContext {
    AuthContext::new("https://music.example.com").with_bearer_token("jwt")
}

fn streaming_media() -> MockMediaServer {
    let mut media = MockMediaServer::new();
    media
        .expect_build_stream_url()
        .returning(|_, id| Ok(format!("https://music.example.com/rest/stream?id={}", id)));
    media
}

fn unused_http() -> MockHttp {
    let mut http = MockHttp::new();
    http.expect_download_stream().never();
    http
}

#[tokio::test]
async fn test_local_file_beats_download() {
    let fx = Fixture::new().await;
    let local = fx.path("local.mp3");
    let downloaded = fx.path("downloaded.mp3");
    std::fs::write(&local, b"abc").unwrap();
    std::fs::write(&downloaded, b"abc").unwrap();
    fx.add_local("s1", &local).await;
    fx.add_download(&track("s1"), &downloaded).await;

    let mut media = MockMediaServer::new();
    media.expect_build_stream_url().never();
    let source = fx
        .resolver(unused_http(), media)
        .resolve(&track("s1"), &auth())
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Local);
    assert_eq!(source.handle, SourceHandle::File(local));
}

#[tokio::test]
async fn test_missing_local_file_falls_through_to_download() {
    let fx = Fixture::new().await;
    let downloaded = fx.path("downloaded.mp3");
    std::fs::write(&downloaded, b"abc").unwrap();
    fx.add_local("s1", &fx.path("gone.mp3")).await;
    fx.add_download(&track("s1"), &downloaded).await;

    let source = fx
        .resolver(unused_http(), MockMediaServer::new())
        .resolve(&track("s1"), &auth())
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Downloaded);
    assert_eq!(source.handle, SourceHandle::File(downloaded));
}

#[tokio::test]
async fn test_unfinished_download_is_ignored() {
    let fx = Fixture::new().await;
    let file = fx.path("half.mp3");
    std::fs::write(&file, b"ab").unwrap();
    let mut record = DownloadRecord::pending(&track("s1"));
    record.status = DownloadStatus::Downloading;
    record.progress = 40;
    record.file_path = Some(file.to_string_lossy().into_owned());
    fx.downloads.upsert(&record).await.unwrap();

    let source = fx
        .resolver(unused_http(), streaming_media())
        .resolve(&track("s1"), &auth())
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Online);
}

#[tokio::test]
async fn test_existing_cache_file_is_used() {
    let fx = Fixture::new().await;
    fx.enable_cache().await;
    std::fs::create_dir_all(fx.cache_dir()).unwrap();
    let cached = fx.cache_dir().join("s1.mp3");
    std::fs::write(&cached, b"cached").unwrap();

    let mut media = MockMediaServer::new();
    media.expect_build_stream_url().never();
    let source = fx
        .resolver(unused_http(), media)
        .resolve(&track("s1"), &auth())
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Cached);
    assert_eq!(source.handle, SourceHandle::File(cached));
}

#[tokio::test]
async fn test_cache_fill_writes_complete_file() {
    let fx = Fixture::new().await;
    fx.enable_cache().await;

    let mut http = MockHttp::new();
    http.expect_download_stream()
        .withf(|url| url.ends_with("id=s2"))
        .times(1)
        .returning(|_| Ok(HttpStream::from_bytes(Bytes::from_static(b"audio-bytes"))));

    let source = fx
        .resolver(http, streaming_media())
        .resolve(&track("s2"), &auth())
        .await
        .unwrap();

    let target = fx.cache_dir().join("s2.mp3");
    assert_eq!(source.kind, SourceKind::Cached);
    assert_eq!(source.handle, SourceHandle::File(target.clone()));
    assert_eq!(std::fs::read(&target).unwrap(), b"audio-bytes");
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn test_overlapping_fill_leaves_running_fill_alone() {
    let fx = Fixture::new().await;
    fx.enable_cache().await;

    let (mut server, body) = tokio::io::duplex(64);
    let body = std::sync::Mutex::new(Some(body));
    let mut http = MockHttp::new();
    http.expect_download_stream().times(1).returning(move |_| {
        let reader = body.lock().unwrap().take().unwrap();
        Ok(HttpStream::new(Some(8), Box::new(reader)))
    });

    let resolver = Arc::new(fx.resolver(http, streaming_media()));
    let first = tokio::spawn({
        let resolver = resolver.clone();
        async move { resolver.resolve(&track("s6"), &auth()).await }
    });
    for _ in 0..200 {
        if resolver.is_filling("s6") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(resolver.is_filling("s6"));
    server.write_all(b"1234").await.unwrap();

    let second = resolver.resolve(&track("s6"), &auth()).await.unwrap();
    assert_eq!(second.kind, SourceKind::Online);

    server.write_all(b"5678").await.unwrap();
    drop(server);

    let first = first.await.unwrap().unwrap();
    let target = fx.cache_dir().join("s6.mp3");
    assert_eq!(first.kind, SourceKind::Cached);
    assert_eq!(std::fs::read(&target).unwrap(), b"12345678");
    assert!(!resolver.is_filling("s6"));

    let third = resolver.resolve(&track("s6"), &auth()).await.unwrap();
    assert_eq!(third.kind, SourceKind::Cached);
}

#[tokio::test]
async fn test_truncated_fill_streams_online() {
    let fx = Fixture::new().await;
    fx.enable_cache().await;

    let mut http = MockHttp::new();
    http.expect_download_stream().returning(|_| {
        Ok(HttpStream::new(
            Some(1_000),
            Box::new(std::io::Cursor::new(vec![0u8; 10])),
        ))
    });

    let source = fx
        .resolver(http, streaming_media())
        .resolve(&track("s3"), &auth())
        .await
        .unwrap();

    let target = fx.cache_dir().join("s3.mp3");
    assert_eq!(source.kind, SourceKind::Online);
    assert_eq!(
        source.handle,
        SourceHandle::Url("https://music.example.com/rest/stream?id=s3".into())
    );
    assert!(!target.exists());
    assert!(!partial_path(&target).exists());
}

#[tokio::test]
async fn test_failed_fill_streams_online() {
    let fx = Fixture::new().await;
    fx.enable_cache().await;

    let mut http = MockHttp::new();
    http.expect_download_stream()
        .returning(|_| Err(BridgeError::OperationFailed("HTTP 503".into())));

    let source = fx
        .resolver(http, streaming_media())
        .resolve(&track("s4"), &auth())
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Online);
}

#[tokio::test]
async fn test_disabled_fill_skips_download() {
    let fx = Fixture::new().await;
    fx.enable_cache().await;

    let config = ResolverConfig::builder().fill_cache(false).build().unwrap();
    let source = fx
        .resolver(unused_http(), streaming_media())
        .with_config(config)
        .resolve(&track("s5"), &auth())
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Online);
}

#[tokio::test]
async fn test_no_cache_dir_streams_online() {
    let fx = Fixture::new().await;

    let source = fx
        .resolver(unused_http(), streaming_media())
        .resolve(&track("s6"), &auth())
        .await
        .unwrap();

    assert_eq!(source.kind, SourceKind::Online);
    assert!(!source.kind.is_offline());
}

#[tokio::test]
async fn test_missing_credentials_exhaust_resolution() {
    let fx = Fixture::new().await;

    let mut media = MockMediaServer::new();
    media
        .expect_build_stream_url()
        .returning(|_, _| Err(BridgeError::NotAvailable("no credentials".into())));

    let err = fx
        .resolver(unused_http(), media)
        .resolve(&track("s7"), &AuthContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PlaybackError::ResolutionExhausted { ref track_id, .. } if track_id == "s7"));
    assert!(err.is_fatal_to_attempt());
}
