//! Local files read as request attachments

use anyhow::{Context, Result};
use lens_core::domain::request::Attachment;
use std::path::{Path, PathBuf};

/// Media type for a file, guessed from its extension
pub fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html" | "htm") => "text/html",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Reads every file in `paths` into memory
pub async fn read_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(paths.len());

    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Not a file: {}", path.display()))?;

        attachments.push(Attachment::new(name, media_type_for(path), data));
    }

    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for(Path::new("deck.PDF")), "application/pdf");
        assert_eq!(media_type_for(Path::new("notes.md")), "text/markdown");
        assert_eq!(media_type_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(media_type_for(Path::new("Makefile")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_read_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("financials.csv");
        std::fs::write(&path, "year,revenue\n2024,10\n").unwrap();

        let attachments = read_attachments(&[path]).await.unwrap();

        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "financials.csv");
        assert_eq!(attachments[0].media_type, "text/csv");
        assert_eq!(attachments[0].size(), 21);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let err = read_attachments(&[PathBuf::from("/nonexistent/deck.pdf")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/deck.pdf"));
    }
}
