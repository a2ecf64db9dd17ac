//! File extension helpers used when predicting downloader output names

use std::path::{Path, PathBuf};

const VIDEO_EXTS: &[&str] = &["avi", "flv", "mkv", "mov", "mp4", "webm"];
const AUDIO_EXTS: &[&str] = &[
    "aac", "aiff", "alac", "flac", "m4a", "mka", "mp3", "ogg", "opus", "vorbis", "wav",
];
const IMAGE_EXTS: &[&str] = &["gif", "jpg", "png", "webp"];
/// Formats the downloader can fetch natively, no conversion needed
pub const NATIVE_SUBTITLE_EXTS: &[&str] = &["vtt", "ttml", "srv3", "srv2", "srv1", "json3"];
/// Formats reachable only through `--convert-subs`
pub const CONVERTED_SUBTITLE_EXTS: &[&str] = &["ass", "lrc", "srt"];

/// Lowercase extension without the dot, empty when there is none
pub fn ext(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn has_ext_in(path: &str, exts: &[&str]) -> bool {
    let e = ext(path);
    !e.is_empty() && exts.contains(&e.as_str())
}

pub fn is_video(path: &str) -> bool {
    has_ext_in(path, VIDEO_EXTS)
}

pub fn is_audio(path: &str) -> bool {
    has_ext_in(path, AUDIO_EXTS)
}

pub fn is_image(path: &str) -> bool {
    has_ext_in(path, IMAGE_EXTS)
}

pub fn is_subtitle(path: &str) -> bool {
    has_ext_in(path, NATIVE_SUBTITLE_EXTS)
}

/// Replace the extension (`new_ext` without the dot), or drop it when `None`
pub fn change_ext(path: &str, new_ext: Option<&str>) -> String {
    let mut p = PathBuf::from(path);
    match new_ext {
        Some(e) => p.set_extension(e),
        None => p.set_extension(""),
    };
    p.to_string_lossy().to_string()
}

/// Strip the extension only when it is a known media extension
pub fn remove_media_ext(path: &str) -> String {
    if is_video(path) || is_audio(path) || is_image(path) || is_subtitle(path) {
        change_ext(path, None)
    } else {
        path.to_string()
    }
}

/// Insert `suffix` between the file stem and its extension
pub fn with_suffix(path: &str, suffix: &str) -> String {
    let e = ext_raw(path);
    let stem = change_ext(path, None);
    match e {
        Some(e) => format!("{}{}.{}", stem, suffix, e),
        None => format!("{}{}", stem, suffix),
    }
}

fn ext_raw(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_video("/a/clip.MP4"));
        assert!(is_audio("song.opus"));
        assert!(is_image("cover.webp"));
        assert!(is_subtitle("subs.vtt"));
        assert!(!is_subtitle("subs.srt"));
        assert!(!is_video("noext"));
    }

    #[test]
    fn test_change_ext() {
        assert_eq!(change_ext("/a/clip.mp4", Some("jpg")), "/a/clip.jpg");
        assert_eq!(change_ext("/a/clip.mp4", Some("%(ext)s")), "/a/clip.%(ext)s");
        assert_eq!(change_ext("/a/clip.mp4", Some("en.srt")), "/a/clip.en.srt");
        assert_eq!(change_ext("/a/clip.mp4", None), "/a/clip");
    }

    #[test]
    fn test_remove_media_ext() {
        assert_eq!(remove_media_ext("/a/song.mp3"), "/a/song");
        assert_eq!(remove_media_ext("/a/archive.tar"), "/a/archive.tar");
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(with_suffix("/a/show.mkv", " - part"), "/a/show - part.mkv");
        assert_eq!(with_suffix("/a/show", " - part"), "/a/show - part");
    }
}
