use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::Config;
use crate::convert::Converter;
use crate::process::{self, ProcessOutcome};
use crate::search::{ranking, Candidate, SearchClient};
use crate::storage::{mime_for, BlobHandle, StorageGateway, StorageScope};
use crate::utils::format_duration_ms;
use crate::Result;

/// Immutable input to one acquisition run
#[derive(Debug, Clone)]
pub struct SongRequest {
    pub id: String,
    pub artist: String,
    pub title: String,
    pub target_duration_ms: i64,
}

/// Identity of the requesting client, carried into log lines and storage calls
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub user: Option<String>,
}

impl ClientContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
        }
    }
}

impl fmt::Display for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user.as_deref().unwrap_or("anonymous"))
    }
}

/// Description of the audio blob handed to the storage gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub key: String,
    pub mime_type: String,
}

/// Terminal per-request failure reasons.
///
/// None of these cross the pipeline boundary as faults: `provide` and `locate`
/// log the reason and hand the caller an absent result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireFailure {
    #[error("no search API key configured")]
    NoApiKey,
    #[error("both search variants turned up nothing")]
    NoCandidateFound,
    #[error("downloader produced no usable output file")]
    DownloadProducedNothing,
    #[error("conversion needed but the converter is not installed")]
    ConverterUnavailable,
    #[error("converter ran but the expected output file is absent")]
    ConversionProducedNothing,
}

/// Ordered release list for the files one invocation may leave on disk.
///
/// Paths are registered up front, before the steps that create them; release
/// is idempotent since most paths only exist on some execution paths.
#[derive(Debug, Default)]
struct TransientSet {
    paths: Vec<PathBuf>,
}

impl TransientSet {
    fn register(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn release_all(&mut self) {
        for path in self.paths.drain(..) {
            match fs_err::remove_file(&path) {
                Ok(()) => tracing::debug!("removed transient file {}", path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => tracing::warn!("could not remove {}: {}", path.display(), err),
            }
        }
    }
}

/// The acquisition pipeline: search -> rank -> download -> convert -> store,
/// with guaranteed cleanup of transient files on every exit path.
pub struct AcquisitionPipeline {
    search: SearchClient,
    converter: Converter,
    storage: Arc<dyn StorageGateway>,
    format: String,
    downloader_command: Vec<String>,
    download_timeout: Duration,
    convert_timeout: Duration,
    work_dir: TempDir,
}

impl AcquisitionPipeline {
    pub async fn new(config: &Config, storage: Arc<dyn StorageGateway>) -> Result<Self> {
        let work_dir = match &config.app.work_dir {
            Some(dir) => {
                fs_err::create_dir_all(dir)?;
                TempDir::new_in(dir)
            }
            None => TempDir::new(),
        }
        .context("failed to create working directory")?;

        Ok(Self {
            search: SearchClient::new(config.search.api_key.clone()),
            converter: Converter::new(),
            storage,
            format: config.audio.format.clone(),
            downloader_command: config.audio.downloader_command(),
            download_timeout: config.audio.download_timeout(),
            convert_timeout: config.audio.convert_timeout(),
            work_dir,
        })
    }

    /// Swap the converter wrapper; tests point this at stub scripts.
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    /// Resolve, fetch, normalize, and store audio for `request`.
    ///
    /// Returns the stored blob's handle, or absent with the reason logged.
    pub async fn provide(&self, request: &SongRequest, ctx: &ClientContext) -> Option<BlobHandle> {
        match self.acquire(request, ctx).await {
            Ok(asset) => self.storage.provide(&asset.key, StorageScope::Audio, ctx).await,
            Err(reason) => {
                tracing::warn!(
                    "[{}] cannot provide audio for \"{} - {}\": {}",
                    ctx,
                    request.artist,
                    request.title,
                    reason
                );
                None
            }
        }
    }

    /// Resolve the chosen candidate's public source URL without downloading.
    pub async fn locate(&self, request: &SongRequest, ctx: &ClientContext) -> Option<String> {
        match self.select_candidate(request, ctx).await {
            Ok(candidate) => Some(candidate.source_url()),
            Err(reason) => {
                tracing::warn!(
                    "[{}] cannot locate audio for \"{} - {}\": {}",
                    ctx,
                    request.artist,
                    request.title,
                    reason
                );
                None
            }
        }
    }

    /// Like `provide`, but surfaces the typed failure reason instead of logging it.
    pub async fn acquire(
        &self,
        request: &SongRequest,
        ctx: &ClientContext,
    ) -> std::result::Result<StoredAsset, AcquireFailure> {
        let candidate = self.select_candidate(request, ctx).await?;
        tracing::info!(
            "[{}] settled on {:?} ({})",
            ctx,
            candidate.title,
            candidate.source_url()
        );

        self.fetch_and_store(request, ctx, &candidate).await
    }

    async fn select_candidate(
        &self,
        request: &SongRequest,
        ctx: &ClientContext,
    ) -> std::result::Result<Candidate, AcquireFailure> {
        if !self.search.has_key() {
            return Err(AcquireFailure::NoApiKey);
        }

        tracing::info!(
            "[{}] attempting to provide audio for \"{} - {}\" ({})",
            ctx,
            request.artist,
            request.title,
            format_duration_ms(request.target_duration_ms)
        );

        let merged = self
            .search
            .candidates_for_song(&request.artist, &request.title)
            .await;

        ranking::select_closest(merged, request.target_duration_ms)
            .ok_or(AcquireFailure::NoCandidateFound)
    }

    /// Download + convert + store one selected candidate, then upload surviving
    /// logs and release every transient path, regardless of which step failed.
    async fn fetch_and_store(
        &self,
        request: &SongRequest,
        ctx: &ClientContext,
        candidate: &Candidate,
    ) -> std::result::Result<StoredAsset, AcquireFailure> {
        let uid = Uuid::new_v4();
        let raw = self.work_dir.path().join(format!("{}.tmp", uid));
        let final_path = self.work_dir.path().join(format!("{}.{}", uid, self.format));
        let download_log = self
            .work_dir
            .path()
            .join(format!("{}-{}-download.log", request.id, uid));
        let convert_log = self
            .work_dir
            .path()
            .join(format!("{}-{}-convert.log", request.id, uid));

        // Downloaders leave a `.part` sidecar behind when interrupted
        let mut sidecar = raw.clone().into_os_string();
        sidecar.push(".part");

        let mut transients = TransientSet::default();
        transients.register(raw.clone());
        transients.register(PathBuf::from(sidecar));
        transients.register(final_path.clone());
        transients.register(download_log.clone());
        transients.register(convert_log.clone());

        let outcome = self
            .run_steps(request, ctx, candidate, &raw, &final_path, &download_log, &convert_log)
            .await;

        // Cleanup happens-after the storing attempt, on every exit path
        self.upload_logs(ctx, &[&download_log, &convert_log]).await;
        transients.release_all();

        outcome
    }

    async fn run_steps(
        &self,
        request: &SongRequest,
        ctx: &ClientContext,
        candidate: &Candidate,
        raw: &Path,
        final_path: &Path,
        download_log: &Path,
        convert_log: &Path,
    ) -> std::result::Result<StoredAsset, AcquireFailure> {
        let mut command = self.downloader_command.clone();
        command.push(candidate.source_url());
        command.push(raw.to_string_lossy().into_owned());
        command.push(self.format.clone());

        match process::run(&command, download_log, self.download_timeout).await {
            ProcessOutcome::Completed => {}
            ProcessOutcome::TimedOutAndKilled => tracing::warn!(
                "[{}] forcibly killed the download process for {}",
                ctx,
                candidate.video_id
            ),
            ProcessOutcome::LaunchFailed(err) => {
                tracing::warn!("[{}] could not launch the downloader: {}", ctx, err)
            }
        }

        // A killed or failed download is not fatal yet: a usable output file
        // may still be present, and its absence is what actually matters.
        if !final_path.exists() {
            tracing::info!(
                "[{}] {} does not exist, attempting to convert",
                ctx,
                final_path.display()
            );

            if !raw.exists() {
                return Err(AcquireFailure::DownloadProducedNothing);
            }
            if !self.converter.installed().await {
                return Err(AcquireFailure::ConverterUnavailable);
            }

            match self
                .converter
                .convert(raw, final_path, convert_log, self.convert_timeout)
                .await
            {
                ProcessOutcome::Completed => {}
                ProcessOutcome::TimedOutAndKilled => tracing::warn!(
                    "[{}] forcibly killed the converter for {}",
                    ctx,
                    candidate.video_id
                ),
                ProcessOutcome::LaunchFailed(err) => {
                    tracing::warn!("[{}] could not launch the converter: {}", ctx, err)
                }
            }

            if !final_path.exists() {
                return Err(AcquireFailure::ConversionProducedNothing);
            }
        }

        let key = format!("{}.{}", request.id, self.format);
        let mime = mime_for(&self.format);

        // Deletion proceeds without confirming durability (accepted
        // at-most-once gap); the final `provide` probe reports availability.
        if let Err(err) = self
            .storage
            .store(&key, StorageScope::Audio, final_path, mime, ctx)
            .await
        {
            tracing::warn!("[{}] storing {} failed: {:#}", ctx, key, err);
        }

        Ok(StoredAsset {
            key,
            mime_type: mime.to_string(),
        })
    }

    async fn upload_logs(&self, ctx: &ClientContext, logs: &[&Path]) {
        for log in logs {
            if !log.exists() {
                continue;
            }
            let Some(name) = log.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Err(err) = self
                .storage
                .store(name, StorageScope::Log, log, "text/plain", ctx)
                .await
            {
                tracing::warn!("[{}] storing log {} failed: {:#}", ctx, name, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandSpec;
    use crate::storage::{LocalStorage, MockStorageGateway};

    fn request(id: &str) -> SongRequest {
        SongRequest {
            id: id.to_string(),
            artist: "Queen".to_string(),
            title: "Bohemian Rhapsody".to_string(),
            target_duration_ms: 355_000,
        }
    }

    fn candidate(video_id: &str) -> Candidate {
        Candidate {
            video_id: video_id.to_string(),
            title: "Queen - Bohemian Rhapsody (Official Video)".to_string(),
            duration_ms: 354_000,
        }
    }

    /// Pipeline wired to a stub downloader script invoked as
    /// `sh <script> <url> <raw-path> <format>`.
    async fn stub_pipeline(
        dir: &Path,
        downloader_body: &str,
        storage: Arc<dyn StorageGateway>,
    ) -> AcquisitionPipeline {
        let script = dir.join("downloader.sh");
        fs_err::write(&script, downloader_body).unwrap();

        let mut config = Config::default();
        config.audio.command = Some(CommandSpec::Tokens(vec![
            "sh".to_string(),
            script.to_string_lossy().into_owned(),
        ]));
        config.audio.download_timeout_secs = 5;
        config.audio.convert_timeout_secs = 5;
        config.app.work_dir = Some(dir.join("work"));

        AcquisitionPipeline::new(&config, storage).await.unwrap()
    }

    #[cfg(unix)]
    fn stub_converter(dir: &Path) -> Converter {
        use std::os::unix::fs::PermissionsExt;

        let stub = dir.join("fake-ffmpeg");
        fs_err::write(
            &stub,
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then echo stub 1.0; exit 0; fi\ncp \"$2\" \"$5\"\n",
        )
        .unwrap();
        fs_err::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        Converter::with_program(stub.to_string_lossy().into_owned())
    }

    fn work_dir_entries(pipeline: &AcquisitionPipeline) -> Vec<String> {
        fs_err::read_dir(pipeline.work_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn stored_log_names(root: &Path) -> Vec<String> {
        let logs = root.join("logs");
        if !logs.is_dir() {
            return Vec::new();
        }
        fs_err::read_dir(logs)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_release_of_missing_paths_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("present.tmp");
        fs_err::write(&existing, b"x").unwrap();

        let mut transients = TransientSet::default();
        transients.register(existing.clone());
        transients.register(dir.path().join("never-created.tmp"));

        transients.release_all();
        assert!(!existing.exists());

        // Releasing again (and releasing already-gone paths) must not fail
        transients.register(existing);
        transients.release_all();
    }

    #[tokio::test]
    async fn test_no_api_key_aborts_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("store")));
        let pipeline = stub_pipeline(dir.path(), "exit 0\n", storage).await;
        let ctx = ClientContext::anonymous();

        let reason = pipeline.acquire(&request("song-b"), &ctx).await.unwrap_err();
        assert_eq!(reason, AcquireFailure::NoApiKey);

        assert!(pipeline.provide(&request("song-b"), &ctx).await.is_none());
        assert!(pipeline.locate(&request("song-b"), &ctx).await.is_none());
        assert!(work_dir_entries(&pipeline).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_needing_conversion_stores_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store_root = dir.path().join("store");
        let storage = Arc::new(LocalStorage::new(&store_root));

        // Downloader only manages the raw `.tmp` file; conversion must kick in
        let pipeline = stub_pipeline(dir.path(), "printf 'raw-audio' > \"$2\"\n", storage.clone())
            .await
            .with_converter(stub_converter(dir.path()));
        let ctx = ClientContext::for_user("tester");

        let asset = pipeline
            .fetch_and_store(&request("song-c"), &ctx, &candidate("x1"))
            .await
            .unwrap();
        assert_eq!(asset.key, "song-c.m4a");
        assert_eq!(asset.mime_type, "audio/m4a");

        let handle = storage
            .provide("song-c.m4a", StorageScope::Audio, &ctx)
            .await
            .unwrap();
        assert_eq!(fs_err::read(&handle.location).unwrap(), b"raw-audio");

        let logs = stored_log_names(&store_root);
        assert!(logs.iter().any(|name| name.ends_with("-download.log")));
        assert!(logs.iter().any(|name| name.ends_with("-convert.log")));

        assert!(work_dir_entries(&pipeline).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_downloader_producing_target_format_skips_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let store_root = dir.path().join("store");
        let storage = Arc::new(LocalStorage::new(&store_root));

        let body = "out=\"$2\"\nprintf 'direct-audio' > \"${out%.tmp}.$3\"\n";
        let pipeline = stub_pipeline(dir.path(), body, storage.clone()).await;
        let ctx = ClientContext::anonymous();

        let asset = pipeline
            .fetch_and_store(&request("song-direct"), &ctx, &candidate("x2"))
            .await
            .unwrap();
        assert_eq!(asset.key, "song-direct.m4a");

        assert!(storage
            .provide("song-direct.m4a", StorageScope::Audio, &ctx)
            .await
            .is_some());

        // No conversion happened, so only the download log was uploaded
        let logs = stored_log_names(&store_root);
        assert!(logs.iter().any(|name| name.ends_with("-download.log")));
        assert!(!logs.iter().any(|name| name.ends_with("-convert.log")));

        assert!(work_dir_entries(&pipeline).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_converter_fails_but_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store_root = dir.path().join("store");
        let storage = Arc::new(LocalStorage::new(&store_root));

        let pipeline = stub_pipeline(dir.path(), "printf 'raw-audio' > \"$2\"\n", storage.clone())
            .await
            .with_converter(Converter::with_program("songfetch-no-such-converter-999"));
        let ctx = ClientContext::anonymous();

        let reason = pipeline
            .fetch_and_store(&request("song-d"), &ctx, &candidate("x3"))
            .await
            .unwrap_err();
        assert_eq!(reason, AcquireFailure::ConverterUnavailable);

        assert!(storage
            .provide("song-d.m4a", StorageScope::Audio, &ctx)
            .await
            .is_none());
        assert!(work_dir_entries(&pipeline).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_downloader_producing_nothing_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("store")));

        let pipeline = stub_pipeline(dir.path(), "exit 0\n", storage).await;
        let ctx = ClientContext::anonymous();

        let reason = pipeline
            .fetch_and_store(&request("song-e"), &ctx, &candidate("x4"))
            .await
            .unwrap_err();
        assert_eq!(reason, AcquireFailure::DownloadProducedNothing);
        assert!(work_dir_entries(&pipeline).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_download_with_usable_output_still_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("store")));

        // Writes the target file, then hangs past the timeout
        let body = "out=\"$2\"\nprintf 'partial-but-usable' > \"${out%.tmp}.$3\"\nsleep 30\n";
        let script = dir.path().join("downloader.sh");
        fs_err::write(&script, body).unwrap();

        let mut config = Config::default();
        config.audio.command = Some(CommandSpec::Tokens(vec![
            "sh".to_string(),
            script.to_string_lossy().into_owned(),
        ]));
        config.audio.download_timeout_secs = 1;
        config.app.work_dir = Some(dir.path().join("work"));

        let pipeline = AcquisitionPipeline::new(&config, storage).await.unwrap();
        let ctx = ClientContext::anonymous();

        let asset = pipeline
            .fetch_and_store(&request("song-t"), &ctx, &candidate("x5"))
            .await
            .unwrap();
        assert_eq!(asset.key, "song-t.m4a");
        assert!(work_dir_entries(&pipeline).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_storage_calls_carry_expected_keys_and_scopes() {
        let dir = tempfile::tempdir().unwrap();

        let mut mock = MockStorageGateway::new();
        mock.expect_store()
            .withf(|key, scope, _source, mime, _ctx| {
                (key == "song-9.m4a" && *scope == StorageScope::Audio && mime == "audio/m4a")
                    || (*scope == StorageScope::Log
                        && key.ends_with("-download.log")
                        && mime == "text/plain")
            })
            .times(2)
            .returning(|_, _, _, _, _| Ok(()));

        let body = "out=\"$2\"\nprintf 'direct-audio' > \"${out%.tmp}.$3\"\n";
        let pipeline = stub_pipeline(dir.path(), body, Arc::new(mock)).await;
        let ctx = ClientContext::anonymous();

        let asset = pipeline
            .fetch_and_store(&request("song-9"), &ctx, &candidate("x6"))
            .await
            .unwrap();
        assert_eq!(asset.key, "song-9.m4a");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_store_failure_is_absorbed_and_files_still_released() {
        let dir = tempfile::tempdir().unwrap();

        let mut mock = MockStorageGateway::new();
        mock.expect_store()
            .returning(|_, _, _, _, _| Err(anyhow::anyhow!("backend down")));

        let body = "out=\"$2\"\nprintf 'direct-audio' > \"${out%.tmp}.$3\"\n";
        let pipeline = stub_pipeline(dir.path(), body, Arc::new(mock)).await;
        let ctx = ClientContext::anonymous();

        // The accepted durability gap: the pipeline reports the asset it
        // attempted to store; availability is the provide probe's business.
        let asset = pipeline
            .fetch_and_store(&request("song-f"), &ctx, &candidate("x7"))
            .await
            .unwrap();
        assert_eq!(asset.key, "song-f.m4a");
        assert!(work_dir_entries(&pipeline).is_empty());
    }
}
