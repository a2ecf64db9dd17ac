//! HTTP download and zip extraction for provisioned tools

use crate::error::{DlpError, Result};
use futures_util::StreamExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("dlp-conductor/", env!("CARGO_PKG_VERSION"));

/// Downloads tool releases into the managed tools directory
#[derive(Debug, Clone, Default)]
pub struct DependencyFetcher {
    client: reqwest::Client,
}

impl DependencyFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Stream `url` to `dest` chunk by chunk.
    ///
    /// Any non-success status fails the whole download. The body is written
    /// to a `.part` sibling first and only renamed onto `dest` once it was
    /// received in full, so a broken transfer never leaves a file at `dest`.
    pub async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest.display());

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DlpError::Network(format!(
                "HTTP {}: {}",
                response.status(),
                url
            )));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = TempFile::new(partial_path(dest));
        let mut file = tokio::fs::File::create(partial.path()).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(partial.path(), dest).await?;

        debug!("Download complete: {} bytes", downloaded);
        Ok(())
    }

    /// Download a zip archive and unpack it into `dest_dir`, overwriting existing files.
    ///
    /// The archive itself is always removed afterwards, whether the download
    /// or the extraction failed or not.
    pub async fn fetch_and_extract(&self, url: &str, dest_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let archive = TempFile::new(dest_dir.join(archive_name(url)));
        self.fetch(url, archive.path()).await?;

        info!("Extracting {}", archive.path().display());
        let zip_path = archive.path().to_path_buf();
        let target = dest_dir.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract_zip(&zip_path, &target)).await?;

        match extracted {
            Ok(count) => {
                debug!("Extracted {} files into {}", count, dest_dir.display());
                Ok(())
            }
            Err(e) => {
                warn!("Extraction of {} failed: {}", url, e);
                Err(e)
            }
        }
    }
}

/// Scratch download (archive or `.part` file), deleted when dropped if still present
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// `<dest>.part`, next to `dest`
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// File name for a downloaded archive, taken from the last URL segment
fn archive_name(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|name| name.to_lowercase().ends_with(".zip"))
        .map(|name| name.to_string())
        .unwrap_or_else(|| "download.zip".into())
}

/// Unpack every entry of a zip archive below `dest_dir`.
///
/// Entries whose names would escape `dest_dir` are skipped. Files already
/// written stay in place when a later entry fails.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe path in zip: {}", entry.name());
            continue;
        };
        let dest_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut outfile = File::create(&dest_path)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))?;
        }

        count += 1;
    }

    Ok(count)
}

/// Mark a fetched binary as executable (no-op off Unix)
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve a single HTTP response on localhost and return its URL
    pub(crate) async fn serve_once(status: &'static str, path: &str, body: Vec<u8>) -> String {
        let len = body.len();
        serve_with_length(status, path, body, len).await
    }

    /// Like [`serve_once`], but announce `content_length` whatever the body size.
    /// A larger value makes the client see the connection close mid-body.
    pub(crate) async fn serve_with_length(
        status: &'static str,
        path: &str,
        body: Vec<u8>,
        content_length: usize,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let header = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status, content_length
            );
            let _ = socket.write_all(header.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/{}", addr, path)
    }

    pub(crate) fn local_fetcher() -> DependencyFetcher {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        DependencyFetcher::with_client(client)
    }

    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, data) in entries {
                writer
                    .start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(
            archive_name("https://www.gyan.dev/ffmpeg/builds/ffmpeg-release-essentials.zip"),
            "ffmpeg-release-essentials.zip"
        );
        assert_eq!(archive_name("https://example.com/get?x=1"), "download.zip");
        assert_eq!(archive_name("https://example.com/deno.zip?raw=1"), "deno.zip");
    }

    #[tokio::test]
    async fn test_fetch_writes_body() {
        let dir = TempDir::new().unwrap();
        let url = serve_once("200 OK", "yt-dlp", b"#!/bin/sh\n".to_vec()).await;
        let dest = dir.path().join("bin").join("yt-dlp");

        local_fetcher().fetch(&url, &dest).await.unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"#!/bin/sh\n");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_truncated_body_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let url = serve_with_length("200 OK", "yt-dlp", b"#!/bin/sh\nexit 0".to_vec(), 100_000).await;
        let dest = dir.path().join("yt-dlp");

        let result = local_fetcher().fetch(&url, &dest).await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tools/yt-dlp.exe")),
            PathBuf::from("/tools/yt-dlp.exe.part")
        );
        assert_eq!(partial_path(Path::new("/tools/yt-dlp")), PathBuf::from("/tools/yt-dlp.part"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status() {
        let dir = TempDir::new().unwrap();
        let url = serve_once("404 Not Found", "missing", b"nope".to_vec()).await;

        let err = local_fetcher()
            .fetch(&url, &dir.path().join("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, DlpError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_and_extract() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("README.txt"), b"old").unwrap();

        let body = build_zip(&[
            ("deno-x86_64/deno", b"binary"),
            ("README.txt", b"new"),
        ]);
        let url = serve_once("200 OK", "deno.zip", body).await;

        local_fetcher().fetch_and_extract(&url, dir.path()).await.unwrap();

        assert_eq!(fs::read(dir.path().join("deno-x86_64").join("deno")).unwrap(), b"binary");
        assert_eq!(fs::read(dir.path().join("README.txt")).unwrap(), b"new");
        assert!(!dir.path().join("deno.zip").exists());
    }

    #[tokio::test]
    async fn test_fetch_and_extract_removes_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let url = serve_once("200 OK", "ffmpeg.zip", b"definitely not a zip".to_vec()).await;

        let err = local_fetcher()
            .fetch_and_extract(&url, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, DlpError::Archive(_)));
        assert!(!dir.path().join("ffmpeg.zip").exists());
    }

    #[tokio::test]
    async fn test_fetch_and_extract_unreachable() {
        let dir = TempDir::new().unwrap();

        let result = local_fetcher()
            .fetch_and_extract("http://127.0.0.1:9/ffmpeg.zip", dir.path())
            .await;

        assert!(result.is_err());
        assert!(!dir.path().join("ffmpeg.zip").exists());
    }
}
