//! Type definitions for dlp-conductor
//!
//! Source of truth for the data shared between the resolver, the command
//! builder and the process layer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================
// Tool Types
// ============================================

/// The external binaries the conductor knows how to provision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// ffmpeg
    Transcoder,
    /// yt-dlp (or youtube-dl)
    Downloader,
    /// aria2c
    AcceleratedDownloader,
    /// deno, node, bun or quickjs
    ScriptRuntime,
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transcoder => "transcoder",
            Self::Downloader => "downloader",
            Self::AcceleratedDownloader => "accelerated downloader",
            Self::ScriptRuntime => "script runtime",
        }
    }
}

/// A binary located (or installed) during startup resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    /// Executable file name, e.g. "ffmpeg.exe"
    pub name: String,
    /// Absolute path to the executable
    pub path: PathBuf,
    pub kind: ToolKind,
}

/// Resolved tool paths, built once at startup and read by every job.
///
/// Unresolved tools are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolPaths {
    transcoder: Option<ResolvedTool>,
    downloader: Option<ResolvedTool>,
    accelerated: Option<ResolvedTool>,
    script_runtime: Option<ResolvedTool>,
    flavor: DlpFlavor,
}

impl ToolPaths {
    pub fn new(flavor: DlpFlavor) -> Self {
        Self {
            flavor,
            ..Self::default()
        }
    }

    /// Record a resolved tool, replacing any earlier one of the same kind
    pub fn insert(&mut self, tool: ResolvedTool) {
        let slot = match tool.kind {
            ToolKind::Transcoder => &mut self.transcoder,
            ToolKind::Downloader => &mut self.downloader,
            ToolKind::AcceleratedDownloader => &mut self.accelerated,
            ToolKind::ScriptRuntime => &mut self.script_runtime,
        };
        *slot = Some(tool);
    }

    /// Builder-style variant of [`ToolPaths::insert`]
    pub fn with(mut self, kind: ToolKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.insert(ResolvedTool { name, path, kind });
        self
    }

    pub fn get(&self, kind: ToolKind) -> Option<&ResolvedTool> {
        match kind {
            ToolKind::Transcoder => self.transcoder.as_ref(),
            ToolKind::Downloader => self.downloader.as_ref(),
            ToolKind::AcceleratedDownloader => self.accelerated.as_ref(),
            ToolKind::ScriptRuntime => self.script_runtime.as_ref(),
        }
    }

    pub fn path(&self, kind: ToolKind) -> Option<&Path> {
        self.get(kind).map(|t| t.path.as_path())
    }

    pub fn flavor(&self) -> DlpFlavor {
        self.flavor
    }
}

/// Which downloader tool is being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DlpFlavor {
    #[default]
    YtDlp,
    YoutubeDl,
}

impl DlpFlavor {
    /// Executable stem without platform suffix
    pub fn binary_stem(&self) -> &'static str {
        match self {
            Self::YtDlp => "yt-dlp",
            Self::YoutubeDl => "youtube-dl",
        }
    }
}

/// Interchangeable script runtimes, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsRuntime {
    #[default]
    Deno,
    Node,
    Bun,
    QuickJs,
}

impl JsRuntime {
    pub const PREFERENCE: [JsRuntime; 4] = [Self::Deno, Self::Node, Self::Bun, Self::QuickJs];

    /// Name used in the `--js-runtimes type:path` argument
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deno => "deno",
            Self::Node => "node",
            Self::Bun => "bun",
            Self::QuickJs => "quickjs",
        }
    }

    /// Executable stem looked up on the search path
    pub fn binary_stem(&self) -> &'static str {
        match self {
            Self::Deno => "deno",
            Self::Node => "node",
            Self::Bun => "bun",
            Self::QuickJs => "qjs",
        }
    }

    /// Infer the runtime type from an executable path.
    ///
    /// Matches case-insensitively on the file stem and falls back to Deno.
    pub fn infer(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.contains("node") {
            Self::Node
        } else if name.contains("bun") {
            Self::Bun
        } else if name.contains("qjs") || name.contains("quickjs") {
            Self::QuickJs
        } else {
            Self::Deno
        }
    }
}

// ============================================
// Job Option Types
// ============================================

/// Where cookies come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CookieSource {
    Chrome,
    Edge,
    Firefox,
    Opera,
    Chromium,
    /// Chrome Beta, read from its platform profile directory
    ChromeBeta,
    /// Netscape cookie file
    File(PathBuf),
}

/// How chapters are handled
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChapterMode {
    #[default]
    None,
    /// One file per chapter
    Split,
    /// Download only the sections matching this expression
    Segment(String),
}

/// Which timestamp the output file should carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModifiedTime {
    /// Upload time, as reported by the source
    #[default]
    Modified,
    /// Time of download
    Created,
}

// ============================================
// Process Types
// ============================================

/// Failure categories recognised on the downloader's stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSignal {
    /// The source wants a signed-in session (cookies)
    SignInRequired,
    /// No extractor supports the URL
    Unsupported,
}

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Lifecycle of a download job's process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Starting,
    Running,
    Completed,
    Cancelled,
    FailedToStart,
}

// ============================================
// Config Types
// ============================================

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Managed tools directory override
    pub tools_dir: Option<String>,
    /// Downloader tool flavor
    pub flavor: DlpFlavor,
    /// Download directory path
    pub download_dir: String,
    /// Proxy URL passed to the downloader
    pub proxy: Option<String>,
    /// Rate limit, e.g. "2M"
    pub limit_rate: Option<String>,
    /// Cookie source
    pub cookies: Option<CookieSource>,
    /// Hand transfers to aria2c when available
    pub use_aria2: bool,
    /// Embed subtitles instead of writing .srt files
    pub embed_subs: bool,
    /// Embed thumbnails instead of writing .jpg files
    pub embed_thumbnail: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_runtime() {
        assert_eq!(JsRuntime::infer(Path::new("/usr/bin/node")), JsRuntime::Node);
        assert_eq!(JsRuntime::infer(Path::new("/opt/NodeJS.exe")), JsRuntime::Node);
        assert_eq!(JsRuntime::infer(Path::new("/opt/bun")), JsRuntime::Bun);
        assert_eq!(JsRuntime::infer(Path::new("/opt/qjs")), JsRuntime::QuickJs);
        assert_eq!(JsRuntime::infer(Path::new("/opt/quickjs-ng")), JsRuntime::QuickJs);
        assert_eq!(JsRuntime::infer(Path::new("/opt/deno")), JsRuntime::Deno);
        assert_eq!(JsRuntime::infer(Path::new("/opt/python3")), JsRuntime::Deno);
    }

    #[test]
    fn test_tool_paths() {
        let paths = ToolPaths::new(DlpFlavor::YtDlp)
            .with(ToolKind::Transcoder, "/tools/ffmpeg")
            .with(ToolKind::Transcoder, "/tools/bin/ffmpeg");

        let tool = paths.get(ToolKind::Transcoder).unwrap();
        assert_eq!(tool.name, "ffmpeg");
        assert_eq!(tool.path, PathBuf::from("/tools/bin/ffmpeg"));
        assert!(paths.path(ToolKind::Downloader).is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_json::from_str(r#"{"use_aria2": true}"#).unwrap();
        assert!(config.use_aria2);
        assert_eq!(config.flavor, DlpFlavor::YtDlp);
        assert!(config.cookies.is_none());

        let config: Config =
            serde_json::from_str(r#"{"flavor": "youtube-dl", "cookies": "chrome-beta"}"#).unwrap();
        assert_eq!(config.flavor, DlpFlavor::YoutubeDl);
        assert_eq!(config.cookies, Some(CookieSource::ChromeBeta));
    }
}
