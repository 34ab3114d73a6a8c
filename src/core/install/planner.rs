// ─── Download Planning ───
// Turns a version JSON into the client jar, asset and library downloads it
// needs.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::core::assets::AssetIndex;
use crate::core::config::{DownloadConfig, GameDirs, RetryConfig};
use crate::core::downloader::client::join_relative;
use crate::core::downloader::{DownloadPlan, DownloadTask, FileFetcher};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MOJANG_LIBRARIES;
use crate::core::mirror::{map_mirrorable_urls, MirrorSourceType};
use crate::core::version::{GameManifest, LibraryEntry, VersionEntry};

use super::json_fetch::{download_and_parse_json, JsonSource};
use super::library_replacement::apply_replacement;

/// Everything planning reads. Borrowed for the duration of one plan.
pub struct PlanContext<'a> {
    pub fetcher: &'a FileFetcher,
    pub dirs: &'a GameDirs,
    pub download: &'a DownloadConfig,
    pub retry: &'a RetryConfig,
    pub mirror: MirrorSourceType,
}

impl PlanContext<'_> {
    /// Fetch (or reuse) the version JSON of `version`, stored as `target_name`.
    pub async fn load_game_manifest(
        &self,
        version: &VersionEntry,
        target_name: &str,
    ) -> LauncherResult<GameManifest> {
        download_and_parse_json(
            self.fetcher,
            &self.dirs.version_json_path(target_name),
            JsonSource {
                url: &version.url,
                sha1: version.sha1.as_deref(),
                mirror: self.mirror,
            },
            self.download.verify_integrity,
            self.retry,
        )
        .await
    }

    /// Fetch (or reuse) the asset index the manifest points at.
    pub async fn load_asset_index(&self, manifest: &GameManifest) -> LauncherResult<Option<AssetIndex>> {
        let (Some(info), Some(id)) = (manifest.asset_index.as_ref(), manifest.asset_index_id()) else {
            return Ok(None);
        };
        let target = self.dirs.asset_indexes_dir().join(format!("{}.json", id));
        let index = download_and_parse_json(
            self.fetcher,
            &target,
            JsonSource {
                url: &info.url,
                sha1: info.sha1.as_deref(),
                mirror: self.mirror,
            },
            self.download.verify_integrity,
            self.retry,
        )
        .await?;
        Ok(Some(index))
    }

    /// Schedule the client jar, assets and libraries of `manifest`.
    ///
    /// `parent` names an already planned version whose jar is copied when
    /// `manifest` carries no client download of its own.
    pub async fn schedule_all(
        &self,
        plan: &mut DownloadPlan,
        manifest: &GameManifest,
        client_name: &str,
        parent: Option<&str>,
    ) -> LauncherResult<()> {
        let asset_index = self.load_asset_index(manifest).await?;

        self.schedule_client_jar(plan, manifest, client_name, parent);
        if let Some(index) = &asset_index {
            self.schedule_assets(plan, index);
        }
        self.schedule_libraries(plan, manifest);

        info!("Planned {} downloads for {}", plan.len(), client_name);
        Ok(())
    }

    pub fn schedule_client_jar(
        &self,
        plan: &mut DownloadPlan,
        manifest: &GameManifest,
        client_name: &str,
        parent: Option<&str>,
    ) {
        let client_jar = self.dirs.version_jar_path(client_name);
        if let Some(client) = manifest.downloads.as_ref().and_then(|d| d.client.as_ref()) {
            plan.schedule(DownloadTask::new(
                map_mirrorable_urls(&client.url, self.mirror),
                client.sha1.clone(),
                client_jar,
                client.size,
            ));
            return;
        }

        // No download of its own: the jar is a copy of the parent's.
        let Some(parent) = parent else {
            warn!("{} has no client download and no parent version", client_name);
            return;
        };
        let parent_jar = self.dirs.version_jar_path(parent);
        let Some(parent_task) = plan.find_mut(&parent_jar) else {
            warn!("Parent jar {:?} is not part of the plan", parent_jar);
            return;
        };
        parent_task.set_on_downloaded(move || copy_if_missing(parent_jar.clone(), client_jar.clone()));
    }

    pub fn schedule_assets(&self, plan: &mut DownloadPlan, index: &AssetIndex) {
        for (name, object) in &index.objects {
            let Some(target) = index.target_path(name, object, self.dirs) else {
                warn!("Skipping asset {} with unsafe path", name);
                continue;
            };
            plan.schedule(DownloadTask::new(
                map_mirrorable_urls(&object.url(), self.mirror),
                Some(object.hash.clone()),
                target,
                object.size,
            ));
        }
    }

    pub fn schedule_libraries(&self, plan: &mut DownloadPlan, manifest: &GameManifest) {
        let libraries_dir = self.dirs.libraries_dir();
        for library in &manifest.libraries {
            if !library.is_allowed_for_current_os() {
                debug!("Skipping {} (OS rules)", library.name);
                continue;
            }
            if self.download.is_provided_library(&library.name) {
                continue;
            }
            let mut library = library.clone();
            apply_replacement(&mut library);

            for source in library_sources(&library) {
                let Some(target) = join_relative(&libraries_dir, &source.path) else {
                    warn!("Skipping {} with unsafe path {}", library.name, source.path);
                    continue;
                };
                plan.schedule(
                    DownloadTask::new(
                        map_mirrorable_urls(&source.url, self.mirror),
                        source.sha1,
                        target,
                        source.size,
                    )
                    .downloadable(source.downloadable),
                );
            }
        }
    }
}

/// One file of a library, resolved to a URL and a path under `libraries/`.
#[derive(Debug, PartialEq)]
struct LibrarySource {
    url: String,
    path: String,
    sha1: Option<String>,
    size: u64,
    downloadable: bool,
}

fn library_sources(library: &LibraryEntry) -> Vec<LibrarySource> {
    let Some(path) = library.artifact_path() else {
        return Vec::new();
    };

    let Some(downloads) = &library.downloads else {
        // Loader style: repository base plus the coordinate path. Without a
        // base the file is expected to exist already.
        let (base, downloadable) = match library.url.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => (base.replacen("http://", "https://", 1), true),
            _ => (MOJANG_LIBRARIES.to_string(), false),
        };
        return vec![LibrarySource {
            url: format!("{}/{}", base.trim_end_matches('/'), path),
            path,
            sha1: library.sha1.clone(),
            size: library.size,
            downloadable,
        }];
    };

    let mut sources = Vec::new();
    if let Some(artifact) = &downloads.artifact {
        let source = match artifact.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => LibrarySource {
                url: url.to_string(),
                path: path.clone(),
                sha1: artifact.sha1.clone(),
                size: artifact.size,
                downloadable: true,
            },
            // Generated by an installer, never hosted.
            _ => LibrarySource {
                url: format!("{}/{}", MOJANG_LIBRARIES, path),
                path: path.clone(),
                sha1: artifact.sha1.clone(),
                size: artifact.size,
                downloadable: false,
            },
        };
        sources.push(source);
    }
    if let Some((url, native_path, sha1, size)) = library.native_download() {
        if native_path != path || sources.is_empty() {
            sources.push(LibrarySource {
                url,
                path: native_path,
                sha1,
                size,
                downloadable: true,
            });
        }
    }
    sources
}

async fn copy_if_missing(from: PathBuf, to: PathBuf) -> LauncherResult<()> {
    if tokio::fs::try_exists(&to).await.unwrap_or(false) {
        return Ok(());
    }
    if !tokio::fs::try_exists(&from).await.unwrap_or(false) {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }
    tokio::fs::copy(&from, &to)
        .await
        .map_err(|e| LauncherError::io(&to, e))?;
    info!("Copied {:?} to {:?}", from, to);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MirrorConfig;
    use crate::core::version::version_file::current_os_name;

    fn library(value: serde_json::Value) -> LibraryEntry {
        serde_json::from_value(value).unwrap()
    }

    fn manifest(value: serde_json::Value) -> GameManifest {
        serde_json::from_value(value).unwrap()
    }

    struct Fixture {
        fetcher: FileFetcher,
        dirs: GameDirs,
        download: DownloadConfig,
        retry: RetryConfig,
    }

    impl Fixture {
        fn new(root: &str) -> Self {
            let download = DownloadConfig::default();
            Self {
                fetcher: FileFetcher::new(reqwest::Client::new(), &download, &MirrorConfig::default()),
                dirs: GameDirs::new(root),
                download,
                retry: RetryConfig::default(),
            }
        }

        fn ctx(&self) -> PlanContext<'_> {
            PlanContext {
                fetcher: &self.fetcher,
                dirs: &self.dirs,
                download: &self.download,
                retry: &self.retry,
                mirror: MirrorSourceType::OfficialFirst,
            }
        }
    }

    #[test]
    fn loader_library_without_url_is_undownloadable() {
        let sources = library_sources(&library(serde_json::json!({
            "name": "net.minecraftforge:forge:1.20.1-47.2.0:client"
        })));
        assert_eq!(
            sources,
            vec![LibrarySource {
                url: "https://libraries.minecraft.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-client.jar".into(),
                path: "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-client.jar".into(),
                sha1: None,
                size: 0,
                downloadable: false,
            }]
        );
    }

    #[test]
    fn loader_library_url_is_upgraded_to_https() {
        let sources = library_sources(&library(serde_json::json!({
            "name": "net.fabricmc:intermediary:1.20.4",
            "url": "http://maven.fabricmc.net/",
            "sha1": "aa",
            "size": 7
        })));
        assert_eq!(sources.len(), 1);
        assert_eq!(
            sources[0].url,
            "https://maven.fabricmc.net/net/fabricmc/intermediary/1.20.4/intermediary-1.20.4.jar"
        );
        assert!(sources[0].downloadable);
        assert_eq!(sources[0].size, 7);
    }

    #[test]
    fn downloads_without_artifact_or_natives_are_skipped() {
        let sources = library_sources(&library(serde_json::json!({
            "name": "com.example:thing:1.0",
            "downloads": {}
        })));
        assert!(sources.is_empty());
    }

    #[test]
    fn native_only_library_schedules_its_classifier() {
        let sources = library_sources(&library(serde_json::json!({
            "name": "net.java.jinput:jinput-platform:2.0.5",
            "natives": { current_os_name(): "natives-x" },
            "downloads": { "classifiers": {
                "natives-x": { "url": "https://libraries.minecraft.net/n.jar", "path": "net/n.jar", "sha1": "ab", "size": 9 }
            }}
        })));
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].path, "net/n.jar");
        assert_eq!(sources[0].sha1.as_deref(), Some("ab"));
    }

    #[test]
    fn library_planning_filters_and_replaces() {
        let fixture = Fixture::new("/game");
        let mut plan = DownloadPlan::new();
        let game = manifest(serde_json::json!({
            "libraries": [
                { "name": "org.lwjgl:lwjgl:3.3.1", "downloads": { "artifact": {
                    "path": "org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1.jar", "url": "https://libraries.minecraft.net/x", "size": 1 } } },
                { "name": "com.example:elsewhere:1.0",
                  "rules": [{ "action": "allow", "os": { "name": "no-such-os" } }] },
                { "name": "net.java.dev.jna:jna:4.4.0", "downloads": { "artifact": {
                    "path": "net/java/dev/jna/jna/4.4.0/jna-4.4.0.jar",
                    "url": "https://libraries.minecraft.net/net/java/dev/jna/jna/4.4.0/jna-4.4.0.jar",
                    "sha1": "old", "size": 100 } } },
                { "name": "com.mojang:brigadier:1.0.18", "downloads": { "artifact": {
                    "path": "com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar",
                    "url": "https://libraries.minecraft.net/com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar",
                    "sha1": "b1", "size": 10 } } }
            ]
        }));

        fixture.ctx().schedule_libraries(&mut plan, &game);

        let targets: Vec<_> = plan.tasks().iter().map(|t| t.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                PathBuf::from("/game/libraries/net/java/dev/jna/jna/5.13.0/jna-5.13.0.jar"),
                PathBuf::from("/game/libraries/com/mojang/brigadier/1.0.18/brigadier-1.0.18.jar"),
            ]
        );
        let jna = &plan.tasks()[0];
        assert_eq!(jna.urls[0], "https://repo1.maven.org/maven2/net/java/dev/jna/jna/5.13.0/jna-5.13.0.jar");
        assert_eq!(jna.sha1.as_deref(), Some("1200e7ebeedbe0d10062093f32925a912020e747"));
        let brigadier = &plan.tasks()[1];
        assert_eq!(brigadier.urls.len(), 2);
        assert!(brigadier.urls[1].starts_with("https://bmclapi2.bangbang93.com/libraries/"));
        assert_eq!(plan.counters().snapshot().total_files, 2);
    }

    #[tokio::test]
    async fn child_without_client_copies_the_parent_jar() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(dir.path().to_str().unwrap());
        let ctx = fixture.ctx();
        let mut plan = DownloadPlan::new();

        let parent = manifest(serde_json::json!({
            "downloads": { "client": { "url": "https://piston-data.mojang.com/c.jar", "sha1": "cc", "size": 3 } }
        }));
        let child = manifest(serde_json::json!({ "inheritsFrom": "1.20.4" }));
        ctx.schedule_client_jar(&mut plan, &parent, "1.20.4", None);
        ctx.schedule_client_jar(&mut plan, &child, "fabric", Some("1.20.4"));
        assert_eq!(plan.len(), 1);

        let parent_jar = fixture.dirs.version_jar_path("1.20.4");
        std::fs::create_dir_all(parent_jar.parent().unwrap()).unwrap();
        std::fs::write(&parent_jar, b"jar").unwrap();

        copy_if_missing(parent_jar.clone(), fixture.dirs.version_jar_path("fabric"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(fixture.dirs.version_jar_path("fabric")).unwrap(), b"jar");
    }

    #[test]
    fn entries_with_unsafe_paths_are_not_scheduled() {
        let fixture = Fixture::new("/game");
        let ctx = fixture.ctx();
        let mut plan = DownloadPlan::new();

        let index: AssetIndex = serde_json::from_value(serde_json::json!({
            "virtual": true,
            "objects": {
                "../../../etc/evil": { "hash": "aa11", "size": 1 },
                "sounds/a.ogg": { "hash": "bb22", "size": 2 }
            }
        }))
        .unwrap();
        ctx.schedule_assets(&mut plan, &index);

        let game = manifest(serde_json::json!({
            "libraries": [
                { "name": "com.example:evil:1.0", "downloads": { "artifact": {
                    "path": "../../../etc/evil.jar", "url": "https://libraries.minecraft.net/e.jar", "size": 1 } } }
            ]
        }));
        ctx.schedule_libraries(&mut plan, &game);

        let targets: Vec<_> = plan.tasks().iter().map(|t| t.target.clone()).collect();
        assert_eq!(targets, vec![PathBuf::from("/game/assets/sounds/a.ogg")]);
    }
}
