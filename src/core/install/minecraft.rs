// ─── Minecraft Downloader ───
// Installs or repairs a full game version: version JSON, client jar, assets
// and libraries, as one cancellable task.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{error, info};

use crate::core::config::EngineConfig;
use crate::core::downloader::{DownloadEngine, DownloadPlan, FileFetcher, PassMessages};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::mirror::map_mirrorable_urls;
use crate::core::task::{Task, TaskContext};
use crate::core::version::{GameManifest, VersionEntry, VersionManifest, VERSION_MANIFEST_URL};

use super::planner::PlanContext;

/// Id of the task returned by [`MinecraftDownloader::download_task`].
pub const DOWNLOADER_TAG: &str = "MinecraftDownloader";

/// Message codes published on the task.
pub mod messages {
    pub const STAT_DOWNLOAD_TASK: &str = "minecraft_download_stat_download_task";
    pub const STAT_VERIFY_TASK: &str = "minecraft_download_stat_verify_task";
    pub const DOWNLOADING_GAME_FILES: &str = "minecraft_download_downloading_game_files";
    pub const VERIFYING_AND_REPAIRING_FILES: &str = "minecraft_download_verifying_and_repairing_files";
    pub const RETRY_DOWNLOADING_FILES: &str = "minecraft_download_progress_retry_downloading_files";
    pub const RETRY_VERIFYING_FILES: &str = "minecraft_download_progress_retry_verifying_files";
}

const FAILED_NOT_FOUND: &str = "A required game file could not be found on any download source.";
const FAILED_RETRIED: &str = "Some game files still failed to download after retrying:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMode {
    /// Fresh install from the version manifest.
    #[default]
    Download,
    /// Re-check an installed version (and its parent) and fetch what is broken.
    VerifyAndRepair,
}

impl DownloadMode {
    fn pick(self, download: &'static str, verify: &'static str) -> &'static str {
        match self {
            DownloadMode::Download => download,
            DownloadMode::VerifyAndRepair => verify,
        }
    }

    fn pass_messages(self) -> PassMessages {
        PassMessages {
            download: self.pick(
                messages::DOWNLOADING_GAME_FILES,
                messages::VERIFYING_AND_REPAIRING_FILES,
            ),
            retry: self.pick(
                messages::RETRY_DOWNLOADING_FILES,
                messages::RETRY_VERIFYING_FILES,
            ),
        }
    }
}

type CompletionCallback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Clone)]
pub struct MinecraftDownloader {
    version: String,
    custom_name: String,
    mode: DownloadMode,
    config: Arc<EngineConfig>,
    fetcher: FileFetcher,
    manifest_urls: Vec<String>,
    on_completion: Option<CompletionCallback>,
    on_error: Option<ErrorCallback>,
}

impl MinecraftDownloader {
    pub fn new(version: impl Into<String>, config: Arc<EngineConfig>) -> LauncherResult<Self> {
        let client = build_http_client(&config.http)?;
        let fetcher = FileFetcher::new(client, &config.download, &config.mirror);
        let version = version.into();
        Ok(Self {
            custom_name: version.clone(),
            version,
            mode: DownloadMode::Download,
            manifest_urls: map_mirrorable_urls(VERSION_MANIFEST_URL, config.mirror.source),
            config,
            fetcher,
            on_completion: None,
            on_error: None,
        })
    }

    /// Install under a different directory name than the version id.
    pub fn custom_name(mut self, name: impl Into<String>) -> Self {
        self.custom_name = name.into();
        self
    }

    pub fn mode(mut self, mode: DownloadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sources of the version manifest, tried in order.
    pub fn manifest_urls(mut self, urls: Vec<String>) -> Self {
        self.manifest_urls = urls;
        self
    }

    pub fn on_completion<F: Fn() + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_completion = Some(Arc::new(f));
        self
    }

    /// Receives a user-facing description of the failure. Not called on
    /// cancellation.
    pub fn on_error<F: Fn(String) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// The whole operation as a task with id [`DOWNLOADER_TAG`].
    ///
    /// `client_name` names the directory under `versions/` the jar and JSON
    /// are installed to; it defaults to the custom name.
    pub fn download_task(&self, client_name: Option<&str>) -> Task {
        let downloader = Arc::new(self.clone());
        let client_name = client_name.unwrap_or(&self.custom_name).to_string();
        let on_error = self.on_error.clone();

        Task::new(Some(DOWNLOADER_TAG.to_string()), move |ctx| {
            let downloader = downloader.clone();
            let client_name = client_name.clone();
            async move { downloader.run(&ctx, &client_name).await }
        })
        // Hosts filter cancellation out before calling this hook.
        .on_error(move |e| {
            error!("Failed to download Minecraft! {}", e);
            if let Some(f) = &on_error {
                f(user_message(e));
            }
        })
    }

    async fn run(&self, ctx: &TaskContext, client_name: &str) -> LauncherResult<()> {
        let task = ctx.task();
        task.update_progress_with_message(
            -1.0,
            Some(self.mode.pick(messages::STAT_DOWNLOAD_TASK, messages::STAT_VERIFY_TASK)),
        );

        let plan_ctx = PlanContext {
            fetcher: &self.fetcher,
            dirs: &self.config.dirs,
            download: &self.config.download,
            retry: &self.config.retry,
            mirror: self.config.mirror.source,
        };
        let mut plan = DownloadPlan::new();
        let mut versions = None;

        match self.mode {
            DownloadMode::Download => {
                let entry = self
                    .find_version(&mut versions, &self.version)
                    .await?
                    .ok_or_else(|| LauncherError::Other(format!("Version not found: {}", self.version)))?;
                let manifest = plan_ctx.load_game_manifest(&entry, client_name).await?;
                plan_ctx.schedule_all(&mut plan, &manifest, client_name, None).await?;
            }
            DownloadMode::VerifyAndRepair => {
                let path = self.config.dirs.version_json_path(&self.custom_name);
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| LauncherError::io(&path, e))?;
                let manifest: GameManifest = serde_json::from_str(&raw)?;
                self.plan_installed(&plan_ctx, &mut plan, &mut versions, manifest, client_name.to_string())
                    .await?;
            }
        }
        ctx.check_cancelled()?;

        let engine = DownloadEngine::new(self.fetcher.clone(), &self.config.download);
        engine
            .run(&plan, task, self.mode.pass_messages(), ctx.token())
            .await?;

        task.update_progress_with_message(1.0, None);
        info!("Minecraft {} is ready as {}", self.version, client_name);
        if let Some(f) = &self.on_completion {
            f();
        }
        Ok(())
    }

    /// Plan an installed version, its `inheritsFrom` parent first.
    fn plan_installed<'a>(
        &'a self,
        ctx: &'a PlanContext<'a>,
        plan: &'a mut DownloadPlan,
        versions: &'a mut Option<VersionManifest>,
        manifest: GameManifest,
        client_name: String,
    ) -> BoxFuture<'a, LauncherResult<()>> {
        Box::pin(async move {
            let parent = match manifest.inherits_from.as_deref() {
                Some(id) => self.find_version(versions, id).await?,
                None => None,
            };
            if let Some(entry) = &parent {
                let parent_manifest = ctx.load_game_manifest(entry, &entry.id).await?;
                self.plan_installed(ctx, plan, versions, parent_manifest, entry.id.clone())
                    .await?;
            }
            ctx.schedule_all(plan, &manifest, &client_name, parent.as_ref().map(|e| e.id.as_str()))
                .await
        })
    }

    /// Look `id` up in the version manifest, fetching it on first use.
    async fn find_version(
        &self,
        versions: &mut Option<VersionManifest>,
        id: &str,
    ) -> LauncherResult<Option<VersionEntry>> {
        if versions.is_none() {
            *versions = Some(VersionManifest::fetch_from(&self.fetcher, &self.manifest_urls).await?);
        }
        Ok(versions
            .as_ref()
            .and_then(|manifest| manifest.find_version(id))
            .cloned())
    }
}

fn user_message(e: &LauncherError) -> String {
    match e {
        LauncherError::DownloadsExhausted { failed } => {
            let urls: Vec<String> = failed.iter().map(|f| f.joined_urls()).collect();
            format!("{}\r\n{}", FAILED_RETRIED, urls.join("\r\n"))
        }
        e if e.is_not_found() => FAILED_NOT_FOUND.to_string(),
        e => e.to_string(),
    }
}
