//! Startup resolution of external tools.
//!
//! Each dependency walks the same chain and stops at the first hit:
//!
//! 1. recursive search of the managed tools directory
//! 2. lookup on the search path
//! 3. (script runtime only) the runtime preference list on the search path
//! 4. download from the vendor, unpack, and search the tools directory again
//!
//! A dependency that cannot be resolved is logged and left empty in the
//! resulting [`ToolPaths`]; it never stops the remaining dependencies.

use crate::core::fetcher::{DependencyFetcher, make_executable};
use crate::core::locator::{locate, locate_in_paths};
use crate::error::Result;
use crate::types::{DlpFlavor, JsRuntime, ResolvedTool, ToolKind, ToolPaths};
use crate::utils::paths::{ensure_dir, exe_name};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a vendor release is packaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Zip archive, unpacked into the tools directory
    Archive,
    /// The executable itself
    Executable,
}

/// A versionless "latest" release endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSource {
    pub url: String,
    pub kind: SourceKind,
}

impl DownloadSource {
    pub fn archive(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: SourceKind::Archive,
        }
    }

    pub fn executable(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: SourceKind::Executable,
        }
    }
}

/// Vendor endpoints for the fetchable dependencies.
///
/// `None` means no release exists for the current platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSources {
    pub transcoder: Option<DownloadSource>,
    pub downloader: Option<DownloadSource>,
    pub script_runtime: Option<DownloadSource>,
}

impl DownloadSources {
    /// Release endpoints for the platform this binary was built for
    pub fn for_platform(flavor: DlpFlavor) -> Self {
        Self {
            transcoder: ffmpeg_source(),
            downloader: downloader_source(flavor),
            script_runtime: deno_source(),
        }
    }
}

fn ffmpeg_source() -> Option<DownloadSource> {
    match env::consts::OS {
        "windows" => Some(DownloadSource::archive(
            "https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip",
        )),
        "macos" => Some(DownloadSource::archive(
            "https://evermeet.cx/ffmpeg/getrelease/zip",
        )),
        // Linux builds ship as tar.xz only; rely on the distribution package
        _ => None,
    }
}

fn downloader_source(flavor: DlpFlavor) -> Option<DownloadSource> {
    let asset = match (flavor, env::consts::OS, env::consts::ARCH) {
        (DlpFlavor::YtDlp, "windows", _) => "yt-dlp.exe",
        (DlpFlavor::YtDlp, "macos", _) => "yt-dlp_macos",
        (DlpFlavor::YtDlp, "linux", "x86_64") => "yt-dlp_linux",
        (DlpFlavor::YtDlp, "linux", "aarch64") => "yt-dlp_linux_aarch64",
        (DlpFlavor::YoutubeDl, "windows", _) => "youtube-dl.exe",
        (DlpFlavor::YoutubeDl, _, _) => "youtube-dl",
        _ => return None,
    };

    let repo = match flavor {
        DlpFlavor::YtDlp => "yt-dlp/yt-dlp",
        DlpFlavor::YoutubeDl => "ytdl-org/youtube-dl",
    };

    Some(DownloadSource::executable(format!(
        "https://github.com/{}/releases/latest/download/{}",
        repo, asset
    )))
}

fn deno_source() -> Option<DownloadSource> {
    let triple = match (env::consts::OS, env::consts::ARCH) {
        ("windows", "x86_64") => "x86_64-pc-windows-msvc",
        ("macos", "x86_64") => "x86_64-apple-darwin",
        ("macos", "aarch64") => "aarch64-apple-darwin",
        ("linux", "x86_64") => "x86_64-unknown-linux-gnu",
        ("linux", "aarch64") => "aarch64-unknown-linux-gnu",
        _ => return None,
    };

    Some(DownloadSource::archive(format!(
        "https://github.com/denoland/deno/releases/latest/download/deno-{}.zip",
        triple
    )))
}

/// Outcome of one dependency's resolution chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedTool),
    /// Not found and not installable; dependent features degrade
    Skipped { kind: ToolKind, reason: String },
}

/// Locates or provisions every external tool
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    tools_dir: PathBuf,
    search_path: OsString,
    flavor: DlpFlavor,
    sources: DownloadSources,
    fetcher: DependencyFetcher,
}

impl DependencyResolver {
    pub fn new(tools_dir: impl Into<PathBuf>, flavor: DlpFlavor) -> Self {
        let tools_dir = tools_dir.into();
        let tools_dir = std::path::absolute(&tools_dir).unwrap_or(tools_dir);

        Self {
            tools_dir,
            search_path: env::var_os("PATH").unwrap_or_default(),
            flavor,
            sources: DownloadSources::for_platform(flavor),
            fetcher: DependencyFetcher::new(),
        }
    }

    /// Replace the directory list used for search-path lookups
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = search_path.into();
        self
    }

    pub fn with_sources(mut self, sources: DownloadSources) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_fetcher(mut self, fetcher: DependencyFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    /// Resolve every dependency in order and publish the result.
    ///
    /// Never fails: errors are logged per dependency and the affected tool
    /// stays unresolved.
    pub async fn resolve_all(&self) -> ToolPaths {
        info!("Checking tools in {}", self.tools_dir.display());

        if let Err(e) = ensure_dir(&self.tools_dir).await {
            warn!("Cannot create {}: {}", self.tools_dir.display(), e);
        }

        let mut paths = ToolPaths::new(self.flavor);

        for kind in [
            ToolKind::Transcoder,
            ToolKind::Downloader,
            ToolKind::AcceleratedDownloader,
            ToolKind::ScriptRuntime,
        ] {
            match self.resolve(kind).await {
                Ok(Resolution::Resolved(tool)) => {
                    info!("{} resolved at {}", kind.label(), tool.path.display());
                    paths.insert(tool);
                }
                Ok(Resolution::Skipped { reason, .. }) => {
                    warn!("{} unavailable: {}", kind.label(), reason);
                }
                Err(e) => {
                    warn!("{} resolution failed: {}", kind.label(), e);
                }
            }
        }

        paths
    }

    /// Run the resolution chain for a single dependency
    pub async fn resolve(&self, kind: ToolKind) -> Result<Resolution> {
        match kind {
            ToolKind::Transcoder => {
                self.resolve_fetchable(kind, &exe_name("ffmpeg"), self.sources.transcoder.as_ref())
                    .await
            }
            ToolKind::Downloader => {
                let exe = exe_name(self.flavor.binary_stem());
                self.resolve_fetchable(kind, &exe, self.sources.downloader.as_ref())
                    .await
            }
            ToolKind::AcceleratedDownloader => Ok(self.resolve_accelerated()),
            ToolKind::ScriptRuntime => self.resolve_script_runtime().await,
        }
    }

    async fn resolve_fetchable(
        &self,
        kind: ToolKind,
        exe: &str,
        source: Option<&DownloadSource>,
    ) -> Result<Resolution> {
        if let Some(found) = self.find(kind, exe) {
            return Ok(Resolution::Resolved(found));
        }
        self.install(kind, exe, source).await
    }

    /// aria2c is optional and has no stable "latest" endpoint, so it is never fetched
    fn resolve_accelerated(&self) -> Resolution {
        let kind = ToolKind::AcceleratedDownloader;
        self.find(kind, &exe_name("aria2c"))
            .map(Resolution::Resolved)
            .unwrap_or_else(|| Resolution::Skipped {
                kind,
                reason: "aria2c not found".into(),
            })
    }

    async fn resolve_script_runtime(&self) -> Result<Resolution> {
        let kind = ToolKind::ScriptRuntime;
        let preferred = exe_name(JsRuntime::default().binary_stem());

        if let Some(found) = self.find(kind, &preferred) {
            return Ok(Resolution::Resolved(found));
        }

        for runtime in JsRuntime::PREFERENCE {
            let exe = exe_name(runtime.binary_stem());
            if let Some(path) = locate_in_paths(&self.search_path, &exe) {
                debug!("Script runtime {} found at {}", runtime.as_str(), path.display());
                return Ok(Resolution::Resolved(tool(kind, &exe, path)));
            }
        }

        self.install(kind, &preferred, self.sources.script_runtime.as_ref())
            .await
    }

    /// Steps 1 and 2: tools directory first, then the search path
    fn find(&self, kind: ToolKind, exe: &str) -> Option<ResolvedTool> {
        if let Some(path) = locate(&self.tools_dir, exe) {
            debug!("{} found at {}", exe, path.display());
            return Some(tool(kind, exe, path));
        }

        if let Some(path) = locate_in_paths(&self.search_path, exe) {
            debug!("{} found in PATH at {}", exe, path.display());
            return Some(tool(kind, exe, path));
        }

        None
    }

    async fn install(
        &self,
        kind: ToolKind,
        exe: &str,
        source: Option<&DownloadSource>,
    ) -> Result<Resolution> {
        let Some(source) = source else {
            return Ok(Resolution::Skipped {
                kind,
                reason: format!("{} not found and no download available for this platform", exe),
            });
        };

        info!("{} not found. Downloading...", exe);

        match source.kind {
            SourceKind::Archive => {
                self.fetcher
                    .fetch_and_extract(&source.url, &self.tools_dir)
                    .await?;
            }
            SourceKind::Executable => {
                let dest = self.tools_dir.join(exe);
                self.fetcher.fetch(&source.url, &dest).await?;
                make_executable(&dest)?;
            }
        }

        match locate(&self.tools_dir, exe) {
            Some(path) => {
                info!("{} installed at {}", exe, path.display());
                Ok(Resolution::Resolved(tool(kind, exe, path)))
            }
            None => Ok(Resolution::Skipped {
                kind,
                reason: format!("{} missing after install", exe),
            }),
        }
    }
}

fn tool(kind: ToolKind, exe: &str, path: PathBuf) -> ResolvedTool {
    ResolvedTool {
        name: exe.to_string(),
        path,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fetcher::tests::{build_zip, local_fetcher, serve_once, serve_with_length};
    use crate::core::locator::tests::write_executable;
    use std::fs;
    use tempfile::TempDir;

    fn offline_resolver(tools: &Path, search_path: &Path) -> DependencyResolver {
        DependencyResolver::new(tools, DlpFlavor::YtDlp)
            .with_search_path(search_path.as_os_str().to_owned())
            .with_sources(DownloadSources::default())
            .with_fetcher(local_fetcher())
    }

    #[tokio::test]
    async fn test_resolves_from_tools_dir() {
        let tools = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let bin = tools.path().join("ffmpeg-7.1-essentials_build").join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join(exe_name("ffmpeg")), b"").unwrap();

        let resolver = offline_resolver(tools.path(), empty.path());
        let resolution = resolver.resolve(ToolKind::Transcoder).await.unwrap();

        let Resolution::Resolved(found) = resolution else {
            panic!("expected ffmpeg to resolve");
        };
        assert_eq!(found.path, bin.join(exe_name("ffmpeg")));
        assert_eq!(found.kind, ToolKind::Transcoder);
    }

    #[tokio::test]
    async fn test_resolves_from_search_path() {
        let tools = TempDir::new().unwrap();
        let system = TempDir::new().unwrap();
        write_executable(&system.path().join(exe_name("yt-dlp")));

        let paths = offline_resolver(tools.path(), system.path())
            .resolve_all()
            .await;

        assert_eq!(
            paths.path(ToolKind::Downloader),
            Some(system.path().join(exe_name("yt-dlp")).as_path())
        );
        assert!(paths.path(ToolKind::Transcoder).is_none());
    }

    #[tokio::test]
    async fn test_script_runtime_preference_list() {
        let tools = TempDir::new().unwrap();
        let system = TempDir::new().unwrap();
        write_executable(&system.path().join(exe_name("bun")));
        write_executable(&system.path().join(exe_name("node")));

        let resolution = offline_resolver(tools.path(), system.path())
            .resolve(ToolKind::ScriptRuntime)
            .await
            .unwrap();

        let Resolution::Resolved(found) = resolution else {
            panic!("expected a runtime");
        };
        assert_eq!(found.name, exe_name("node"));
        assert_eq!(JsRuntime::infer(&found.path), JsRuntime::Node);
    }

    #[tokio::test]
    async fn test_unresolvable_dependencies_stay_empty() {
        let tools = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let unreachable = DownloadSources {
            transcoder: Some(DownloadSource::archive("http://127.0.0.1:9/ffmpeg.zip")),
            downloader: Some(DownloadSource::executable("http://127.0.0.1:9/yt-dlp")),
            script_runtime: Some(DownloadSource::archive("http://127.0.0.1:9/deno.zip")),
        };

        let resolver = offline_resolver(tools.path(), empty.path()).with_sources(unreachable);
        assert!(resolver.resolve(ToolKind::Transcoder).await.is_err());

        let paths = resolver.resolve_all().await;
        assert_eq!(paths, ToolPaths::new(DlpFlavor::YtDlp));
    }

    #[tokio::test]
    async fn test_failed_dependency_does_not_block_later_ones() {
        let tools = TempDir::new().unwrap();
        let system = TempDir::new().unwrap();
        write_executable(&system.path().join(exe_name("yt-dlp")));
        let sources = DownloadSources {
            transcoder: Some(DownloadSource::archive("http://127.0.0.1:9/ffmpeg.zip")),
            ..DownloadSources::default()
        };

        let resolver = offline_resolver(tools.path(), system.path()).with_sources(sources);
        assert!(resolver.resolve(ToolKind::Transcoder).await.is_err());

        let paths = resolver.resolve_all().await;
        assert!(paths.path(ToolKind::Transcoder).is_none());
        assert_eq!(
            paths.path(ToolKind::Downloader),
            Some(system.path().join(exe_name("yt-dlp")).as_path())
        );
    }

    #[tokio::test]
    async fn test_truncated_install_is_retried_next_run() {
        let tools = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let url = serve_with_length("200 OK", "yt-dlp_linux", b"#!/bin/sh\nexit 0".to_vec(), 100_000).await;
        let sources = DownloadSources {
            downloader: Some(DownloadSource::executable(url)),
            ..DownloadSources::default()
        };

        let first = offline_resolver(tools.path(), empty.path())
            .with_sources(sources)
            .resolve(ToolKind::Downloader)
            .await;
        assert!(first.is_err());
        assert!(!tools.path().join(exe_name("yt-dlp")).exists());

        let second = offline_resolver(tools.path(), empty.path())
            .resolve(ToolKind::Downloader)
            .await
            .unwrap();
        assert!(matches!(
            second,
            Resolution::Skipped { kind: ToolKind::Downloader, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped() {
        let tools = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();

        let resolution = offline_resolver(tools.path(), empty.path())
            .resolve(ToolKind::Transcoder)
            .await
            .unwrap();

        assert!(matches!(
            resolution,
            Resolution::Skipped { kind: ToolKind::Transcoder, .. }
        ));
    }

    #[tokio::test]
    async fn test_installs_executable() {
        let tools = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let url = serve_once("200 OK", "yt-dlp_linux", b"#!/bin/sh\n".to_vec()).await;
        let sources = DownloadSources {
            downloader: Some(DownloadSource::executable(url)),
            ..DownloadSources::default()
        };

        let resolution = offline_resolver(tools.path(), empty.path())
            .with_sources(sources)
            .resolve(ToolKind::Downloader)
            .await
            .unwrap();

        let Resolution::Resolved(found) = resolution else {
            panic!("expected yt-dlp to be installed");
        };
        assert_eq!(found.path, tools.path().join(exe_name("yt-dlp")));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&found.path).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[tokio::test]
    async fn test_installs_archive() {
        let tools = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let deno = exe_name("deno");
        let body = build_zip(&[(deno.as_str(), b"binary")]);
        let url = serve_once("200 OK", "deno.zip", body).await;
        let sources = DownloadSources {
            script_runtime: Some(DownloadSource::archive(url)),
            ..DownloadSources::default()
        };

        let resolution = offline_resolver(tools.path(), empty.path())
            .with_sources(sources)
            .resolve(ToolKind::ScriptRuntime)
            .await
            .unwrap();

        let Resolution::Resolved(found) = resolution else {
            panic!("expected deno to be installed");
        };
        assert_eq!(found.path, tools.path().join(&deno));
        assert!(!tools.path().join("deno.zip").exists());
    }
}
