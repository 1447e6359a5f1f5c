//! Reading uploaded files into node content.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;

use crate::error::{CanvasError, Result};
use crate::types::FileInfo;

/// A file handed to the canvas for ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub mime: String,
    pub path: PathBuf,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            path: path.into(),
        }
    }

    /// Upload named after the last path component, with the mime guessed
    /// from its extension
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = guess_mime(&name).to_string();
        Self { name, mime, path }
    }
}

/// Source of file contents; reads of one batch run concurrently
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, upload: &FileUpload) -> Result<FileInfo>;
}

/// Reads from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsFileReader;

impl FsFileReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileReader for FsFileReader {
    async fn read(&self, upload: &FileUpload) -> Result<FileInfo> {
        let read_failure = |reason: String| CanvasError::ReadFailure {
            name: upload.name.clone(),
            reason,
        };

        let bytes = tokio::fs::read(&upload.path)
            .await
            .map_err(|e| read_failure(e.to_string()))?;

        let size = bytes.len() as u64;
        let content = if is_textual(&upload.mime) {
            String::from_utf8(bytes).map_err(|e| read_failure(e.to_string()))?
        } else {
            data_url(&upload.mime, &bytes)
        };

        tracing::debug!(name = %upload.name, size, mime = %upload.mime, "file read");

        Ok(FileInfo {
            name: upload.name.clone(),
            size,
            mime: upload.mime.clone(),
            uploaded_at: Utc::now(),
            content,
        })
    }
}

/// Whether content of this type is kept as text rather than a data URL
pub fn is_textual(mime: &str) -> bool {
    let mime = mime.split(';').next().unwrap_or(mime).trim();
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/javascript" | "application/x-yaml"
        )
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

fn guess_mime(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("rs") | Some("py") | Some("toml") => "text/plain",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("js") => "application/javascript",
        Some("yaml") | Some("yml") => "application/x-yaml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_textual_types() {
        assert!(is_textual("text/plain"));
        assert!(is_textual("text/markdown; charset=utf-8"));
        assert!(is_textual("application/json"));
        assert!(is_textual("application/ld+json"));
        assert!(!is_textual("image/png"));
        assert!(!is_textual("application/pdf"));
    }

    #[test]
    fn test_upload_from_path_guesses_mime() {
        let upload = FileUpload::from_path("/tmp/report.JSON");
        assert_eq!(upload.name, "report.JSON");
        assert_eq!(upload.mime, "application/json");
        assert_eq!(FileUpload::from_path("blob").mime, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_reads_text_as_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "hello canvas").unwrap();

        let info = FsFileReader::new()
            .read(&FileUpload::new("notes.txt", "text/plain", file.path()))
            .await
            .unwrap();

        assert_eq!(info.content, "hello canvas");
        assert_eq!(info.size, 12);
        assert_eq!(info.name, "notes.txt");
    }

    #[tokio::test]
    async fn test_reads_binary_as_data_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x89, b'P', b'N', b'G']).unwrap();

        let info = FsFileReader::new()
            .read(&FileUpload::new("img.png", "image/png", file.path()))
            .await
            .unwrap();

        assert_eq!(info.content, "data:image/png;base64,iVBORw==");
        assert_eq!(info.size, 4);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsFileReader::new()
            .read(&FileUpload::new("gone.txt", "text/plain", dir.path().join("gone.txt")))
            .await
            .unwrap_err();

        assert!(matches!(err, CanvasError::ReadFailure { ref name, .. } if name == "gone.txt"));
    }
}
