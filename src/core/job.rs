//! DownloadJob - chainable configuration of one downloader invocation
//!
//! Every configuration method validates its own inputs and quietly does
//! nothing when they don't hold; the downloader is trusted to reject values
//! that are well-formed here but meaningless to it.

use crate::core::options::{CommandLine, OptionSet, OptionValue, OutputTarget};
use crate::core::process::JobCanceller;
use crate::core::progress::PROGRESS_TEMPLATE;
use crate::types::{
    ChapterMode, CookieSource, DlpFlavor, ErrorSignal, JobState, JsRuntime, ModifiedTime,
    ToolKind, ToolPaths,
};
use crate::utils::media::{
    CONVERTED_SUBTITLE_EXTS, NATIVE_SUBTITLE_EXTS, change_ext, ext, is_audio, remove_media_ext,
    with_suffix,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CHAPTER_SUFFIX: &str = " - %(section_number)03d. %(section_title)s";
const EXT_TEMPLATE: &str = "%(ext)s";

/// One download request and the process that serves it
#[derive(Debug)]
pub struct DownloadJob {
    pub(crate) url: String,
    pub(crate) options: OptionSet,
    pub(crate) files: Vec<String>,
    pub(crate) is_live: bool,
    pub(crate) signals: HashSet<ErrorSignal>,
    pub(crate) state: JobState,
    pub(crate) program: Option<PathBuf>,
    pub(crate) canceller: JobCanceller,
    accelerated: Option<PathBuf>,
}

impl DownloadJob {
    /// Start a job with the defaults every invocation shares
    pub fn new(url: impl Into<String>, tools: &ToolPaths) -> Self {
        let mut job = Self {
            url: url.into(),
            options: OptionSet::new(),
            files: Vec::new(),
            is_live: false,
            signals: HashSet::new(),
            state: JobState::Idle,
            program: tools.path(ToolKind::Downloader).map(Path::to_path_buf),
            canceller: JobCanceller::new(),
            accelerated: tools
                .path(ToolKind::AcceleratedDownloader)
                .map(Path::to_path_buf),
        };

        job.options.set_flag("--no-playlist");
        job.options.set_flag("--force-overwrites");
        job.options.set_flag("--ignore-config");

        if let Some(ffmpeg) = tools.path(ToolKind::Transcoder) {
            job.options.set("--ffmpeg-location", OptionValue::path(ffmpeg));
        }

        if let Some(runtime) = tools.path(ToolKind::ScriptRuntime) {
            let kind = JsRuntime::infer(runtime);
            debug!("Detected script runtime {} at {}", kind.as_str(), runtime.display());
            job.js_runtime(kind, runtime);
        }

        if tools.flavor() == DlpFlavor::YtDlp {
            job.options
                .set("--progress-template", OptionValue::quoted(PROGRESS_TEMPLATE));
            job.options.set_flag("--windows-filenames");
        }

        job
    }

    // ============================================
    // Configuration
    // ============================================

    /// Use a downloader config file instead of ignoring all config
    pub fn load_config(&mut self, path: &str) -> &mut Self {
        debug!("LoadConfig: {}", path);
        if !path.trim().is_empty() && Path::new(path).is_file() {
            self.options.remove("--ignore-config");
            self.options.set("--config-location", OptionValue::path(path));
        }
        self
    }

    /// Write the download to exactly `target`
    pub fn output(&mut self, target: &str) -> &mut Self {
        debug!("Output: {}", target);
        if !target.trim().is_empty() {
            self.options.set("--output", OptionValue::path(target));
            self.files.push(target.to_string());
        }
        self
    }

    pub fn mtime(&mut self, time: ModifiedTime) -> &mut Self {
        debug!("MTime: {:?}", time);
        if time == ModifiedTime::Created {
            self.options.set_flag("--no-mtime");
        }
        self
    }

    /// Keep intermediate files under `path`
    pub fn temp(&mut self, path: &str) -> &mut Self {
        debug!("Temp: {}", path);
        if !path.trim().is_empty() {
            self.options.set("--cache-dir", OptionValue::path(path));
            self.options.set_output_target(
                OutputTarget::Temp,
                OptionValue::prefixed_path(OutputTarget::Temp.prefix(), path),
            );
        }
        self
    }

    pub fn proxy(&mut self, url: &str, enable: bool) -> &mut Self {
        debug!("Proxy: {} (enabled: {})", url, enable);
        if enable && !url.trim().is_empty() {
            self.options.set("--proxy", OptionValue::quoted(url));
        }
        self
    }

    pub fn download_sections(&mut self, sections: &str) -> &mut Self {
        if !sections.trim().is_empty() {
            self.options
                .set("--download-sections", OptionValue::quoted(sections));
        }
        self
    }

    /// Split into one file per chapter next to `path`, or keep only a segment
    pub fn split_chapters(&mut self, mode: &ChapterMode, path: &str) -> &mut Self {
        match mode {
            ChapterMode::None => {}
            ChapterMode::Split => {
                self.options.set_flag("--split-chapters");
                self.options.set_output_target(
                    OutputTarget::Chapter,
                    OptionValue::prefixed_path(
                        OutputTarget::Chapter.prefix(),
                        with_suffix(path, CHAPTER_SUFFIX),
                    ),
                );
            }
            ChapterMode::Segment(title) => {
                self.download_sections(title);
            }
        }
        self
    }

    pub fn embed_chapters(&mut self, enable: bool) -> &mut Self {
        if enable {
            self.options.set_flag("--embed-chapters");
        }
        self
    }

    /// Embed the thumbnail, or write it as a .jpg next to `path`
    pub fn thumbnail(&mut self, enable: bool, path: &str, embed: bool) -> &mut Self {
        if !enable {
            return self;
        }

        if embed {
            self.options.set_flag("--embed-thumbnail");
        } else {
            self.options.set_flag("--write-thumbnail");
            self.options
                .set("--convert-thumbnails", OptionValue::bare("jpg"));
            self.options.set_output_target(
                OutputTarget::Thumbnail,
                OptionValue::prefixed_path(
                    OutputTarget::Thumbnail.prefix(),
                    change_ext(path, Some(EXT_TEMPLATE)),
                ),
            );
            self.files.push(change_ext(path, Some("jpg")));
        }
        self
    }

    /// Embed subtitles for `lang`, or write them as .srt next to `target`
    pub fn subtitle(&mut self, lang: &str, target: &str, embed: bool) -> &mut Self {
        if lang.trim().is_empty() {
            return self;
        }

        self.options.set("--sub-langs", OptionValue::bare(lang));
        if embed {
            self.options.set_flag("--embed-subs");
        } else {
            self.options.set_flag("--write-subs");
            self.options.set("--convert-subs", OptionValue::bare("srt"));
            self.options.set_output_target(
                OutputTarget::Subtitle,
                OptionValue::prefixed_path(
                    OutputTarget::Subtitle.prefix(),
                    change_ext(target, Some(EXT_TEMPLATE)),
                ),
            );
            self.files
                .push(change_ext(target, Some(&format!("{}.srt", lang))));
        }
        self
    }

    /// Print metadata as JSON instead of downloading
    pub fn get_info(&mut self) -> &mut Self {
        self.options.set_flag("--dump-json");
        self
    }

    /// Hand the transfer to aria2c, when it was resolved and still exists
    pub fn use_accelerated_downloader(&mut self, enable: bool) -> &mut Self {
        debug!("UseAria2: {} (path: {:?})", enable, self.accelerated);
        if !enable {
            return self;
        }

        let Some(aria2) = self.accelerated.as_ref().filter(|p| p.is_file()) else {
            return self;
        };

        self.options
            .set("--external-downloader", OptionValue::path(aria2));
        if let Some(proxy) = self.options.get("--proxy").and_then(OptionValue::raw) {
            self.options.set(
                "--external-downloader-args",
                OptionValue::quoted(format!("--all-proxy={}", proxy)),
            );
        }
        self
    }

    /// Cap the transfer rate, e.g. "2M"
    pub fn limit_rate(&mut self, value: &str) -> &mut Self {
        debug!("LimitRate: {}", value);
        if !value.trim().is_empty() {
            self.options.set("--limit-rate", OptionValue::bare(value));
        }
        self
    }

    pub fn cookie(&mut self, source: &CookieSource, enable: bool) -> &mut Self {
        debug!("Cookie: {:?} (enabled: {})", source, enable);
        if !enable {
            return self;
        }

        let browser = match source {
            CookieSource::Chrome => "chrome",
            CookieSource::Edge => "edge",
            CookieSource::Firefox => "firefox",
            CookieSource::Opera => "opera",
            CookieSource::Chromium => "chromium",
            CookieSource::ChromeBeta => {
                match chrome_beta_profile_dir() {
                    Some(dir) => self.options.set(
                        "--cookies-from-browser",
                        OptionValue::prefixed_path("chrome", dir),
                    ),
                    None => warn!("No profile directory for Chrome Beta on this platform"),
                }
                return self;
            }
            CookieSource::File(path) => {
                if path.is_file() {
                    self.options.set("--cookies", OptionValue::path(path));
                } else {
                    warn!("Cookie file path invalid: {}", path.display());
                }
                return self;
            }
        };

        self.options
            .set("--cookies-from-browser", OptionValue::bare(browser));
        self
    }

    /// Download `format_id` into `target`, remuxing when the container differs
    pub fn download_format(&mut self, format_id: &str, target: &str, origin_ext: &str) -> &mut Self {
        debug!("DownloadFormat: id={} path={}", format_id, target);
        let target_ext = ext(target);

        self.options.set("--format", OptionValue::bare(format_id));
        if target_ext != origin_ext.to_lowercase() {
            self.options
                .set("--remux-video", OptionValue::bare(target_ext));
        }
        self.options.set(
            "--output",
            OptionValue::path(change_ext(target, Some(EXT_TEMPLATE))),
        );
        self.files.push(target.to_string());
        self
    }

    pub fn download_video(&mut self, format_id: &str, source_ext: &str, target: &str) -> &mut Self {
        debug!("DownloadVideo: id={} source={} path={}", format_id, source_ext, target);
        let target_ext = ext(target);

        self.options.set("--format", OptionValue::bare(format_id));
        if source_ext.to_lowercase() != target_ext {
            self.options
                .set("--remux-video", OptionValue::bare(target_ext));
        }
        self.options.set("--output", OptionValue::path(target));
        self.files.push(target.to_string());
        self
    }

    /// Extract audio, converting when `target` carries an audio extension
    pub fn download_audio(&mut self, audio_id: &str, target: &str) -> &mut Self {
        debug!("DownloadAudio: id={} path={}", audio_id, target);
        self.options.set_flag("--extract-audio");
        if is_audio(target) {
            self.options
                .set("--audio-format", OptionValue::quoted(ext(target)));
        }
        self.options.set("--format", OptionValue::bare(audio_id));
        let stem = remove_media_ext(target);
        self.options.set("--output", OptionValue::path(&stem));
        // Without a target audio format the extension is only known after extraction
        if is_audio(target) {
            self.files.push(change_ext(&stem, Some(ext(target).as_str())));
        }
        self
    }

    /// Fetch only subtitles; the extension of `target` picks the format (default srt)
    pub fn download_subtitle(&mut self, lang: &str, target: &str) -> &mut Self {
        if lang.trim().is_empty() {
            return self;
        }

        let target = if ext(target).is_empty() {
            change_ext(target, Some("srt"))
        } else {
            target.to_string()
        };
        let format = ext(&target);

        self.options.set_flag("--write-subs");
        self.options.set("--sub-langs", OptionValue::bare(lang));
        if NATIVE_SUBTITLE_EXTS.contains(&format.as_str()) {
            self.options.set("--sub-format", OptionValue::bare(&format));
        } else if CONVERTED_SUBTITLE_EXTS.contains(&format.as_str()) {
            self.options.set("--convert-subs", OptionValue::bare(&format));
        }

        let stem = change_ext(&target, None);
        self.options.set_output_target(
            OutputTarget::Subtitle,
            OptionValue::prefixed_path(OutputTarget::Subtitle.prefix(), &stem),
        );
        self.files.push(format!("{}.{}.{}", stem, lang, format));
        self
    }

    /// Emit `--js-runtimes type:path`
    pub fn js_runtime(&mut self, runtime: JsRuntime, path: &Path) -> &mut Self {
        debug!("Set JS runtime: {} -> {}", runtime.as_str(), path.display());
        self.options.set(
            "--js-runtimes",
            OptionValue::prefixed_path(runtime.as_str(), path),
        );
        self
    }

    /// Live streams keep their partial output on cancellation
    pub fn set_live(&mut self, is_live: bool) -> &mut Self {
        self.is_live = is_live;
        self
    }

    // ============================================
    // Inspection
    // ============================================

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    /// Best-effort prediction of the files the downloader will produce
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_live(&self) -> bool {
        self.is_live
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn signals(&self) -> &HashSet<ErrorSignal> {
        &self.signals
    }

    pub fn has_signal(&self, signal: ErrorSignal) -> bool {
        self.signals.contains(&signal)
    }

    /// Run `callback` if `signal` was seen on stderr
    pub fn when_signaled(&self, signal: ErrorSignal, callback: impl FnOnce()) -> &Self {
        if self.has_signal(signal) {
            callback();
        }
        self
    }

    /// The exact `--output` path, if one was set
    pub fn output_path(&self) -> Option<&str> {
        self.options.get("--output").and_then(OptionValue::as_path)
    }

    /// Handle that can stop this job from another task
    pub fn canceller(&self) -> JobCanceller {
        self.canceller.clone()
    }

    pub fn render(&self) -> CommandLine {
        self.options.render(&self.url)
    }
}

fn chrome_beta_profile_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_local_dir().map(|d| d.join("Google").join("Chrome Beta"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|d| d.join("Google").join("Chrome Beta"))
    } else {
        dirs::config_dir().map(|d| d.join("google-chrome-beta"))
    }
}
