//! Upload handling: materialises multipart file parts as temporary files and
//! guarantees they are removed once the request is done with them.

use std::path::PathBuf;

use axum::extract::multipart::{Field, Multipart};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{SendForm, StoredAttachment};

/// Form field name carrying file parts.
pub const ATTACHMENTS_FIELD: &str = "attachments";

const MAX_STORED_NAME_LEN: usize = 100;

/// The temporary files written for one request.
///
/// Every reserved path is tracked from the moment it is handed out, so a write
/// that fails half-way still gets deleted. `cleanup` must be awaited on every
/// exit path; `Drop` removes anything left over if the request future is
/// cancelled first.
#[derive(Debug)]
pub struct TempFiles {
    dir: PathBuf,
    files: Vec<StoredAttachment>,
}

/// What `TempFiles::cleanup` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub attempted: usize,
    pub failed: usize,
}

impl TempFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    pub fn attachments(&self) -> &[StoredAttachment] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Allocate a unique path for an upload and start tracking it.
    pub async fn reserve(
        &mut self,
        original_filename: &str,
        content_type: Option<String>,
    ) -> Result<&StoredAttachment> {
        fs::create_dir_all(&self.dir).await?;

        let original_filename = base_name(original_filename);
        let stored_name = format!(
            "{}-{}-{}",
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            sanitize_file_name(&original_filename)
        );

        self.files.push(StoredAttachment {
            original_filename,
            stored_path: self.dir.join(stored_name),
            content_type,
        });
        Ok(&self.files[self.files.len() - 1])
    }

    /// Stream one multipart file part to disk.
    pub async fn store_field(&mut self, mut field: Field<'_>) -> Result<StoredAttachment> {
        let original = field.file_name().unwrap_or("attachment").to_string();
        let content_type = field.content_type().map(str::to_string);
        let stored = self.reserve(&original, content_type).await?.clone();

        let mut file = fs::File::create(&stored.stored_path).await?;
        let mut written = 0usize;
        while let Some(chunk) = field.chunk().await? {
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(
            path = %stored.stored_path.display(),
            filename = %stored.original_filename,
            bytes = written,
            "Stored upload"
        );
        Ok(stored)
    }

    /// Delete every tracked file. Failures are logged, never returned.
    pub async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for file in self.files.drain(..) {
            report.attempted += 1;
            match fs::remove_file(&file.stored_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(
                        path = %file.stored_path.display(),
                        "Temporary file already gone"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        path = %file.stored_path.display(),
                        error = %e,
                        "Failed to delete temporary file"
                    );
                }
            }
        }
        report
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        if self.files.is_empty() {
            return;
        }
        let paths: Vec<PathBuf> = self.files.drain(..).map(|f| f.stored_path).collect();

        // Keep blocking unlinks off the async workers when a runtime is around.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_all(&paths));
            }
            Err(_) => remove_all(&paths),
        }
    }
}

fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to delete temporary file on drop"
                );
            }
        }
    }
}

/// Read the whole multipart body: text parts into a `SendForm`, file parts
/// named `attachments` into `uploads`. Parts may come in any order.
pub async fn read_send_form(
    multipart: &mut Multipart,
    uploads: &mut TempFiles,
) -> Result<SendForm> {
    let mut form = SendForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == ATTACHMENTS_FIELD && field.file_name().is_some() {
            uploads.store_field(field).await?;
            continue;
        }

        let value = field.text().await?;
        if !form.set_field(&name, value) {
            tracing::debug!(field = %name, "Ignoring unknown form field");
        }
    }

    Ok(form)
}

/// Last path component of a client supplied file name.
fn base_name(name: &str) -> String {
    let trimmed = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Restrict a name to characters that are safe in any filesystem.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STORED_NAME_LEN)
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_base_name_strips_directories() {
        assert_eq!(base_name("../../etc/passwd"), "passwd");
        assert_eq!(base_name("C:\\Users\\me\\report.pdf"), "report.pdf");
        assert_eq!(base_name(".."), "attachment");
        assert_eq!(base_name(""), "attachment");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Q3 report (final).pdf"), "Q3_report__final_.pdf");
        assert_eq!(sanitize_file_name("..."), "attachment");
        assert_eq!(sanitize_file_name(&"a".repeat(300)).len(), MAX_STORED_NAME_LEN);
    }

    #[tokio::test]
    async fn test_reserve_creates_dir_and_unique_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("uploads");
        let mut uploads = TempFiles::new(&dir);

        let first = uploads.reserve("notes.txt", None).await.unwrap().clone();
        let second = uploads.reserve("notes.txt", None).await.unwrap().clone();

        assert!(dir.is_dir());
        assert_ne!(first.stored_path, second.stored_path);
        assert!(first.stored_path.starts_with(&dir));
        assert_eq!(first.original_filename, "notes.txt");
        assert!(first
            .stored_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("-notes.txt"));
        assert_eq!(uploads.len(), 2);
    }

    async fn reserve_path(uploads: &mut TempFiles, name: &str) -> PathBuf {
        let stored = uploads.reserve(name, None).await.unwrap();
        stored.stored_path.clone()
    }

    #[tokio::test]
    async fn test_cleanup_attempts_every_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut uploads = TempFiles::new(tmp.path());

        let written = reserve_path(&mut uploads, "a.txt").await;
        tokio::fs::write(&written, b"a").await.unwrap();
        // Reserved but never written, as after a failed upload.
        reserve_path(&mut uploads, "b.txt").await;

        let report = uploads.cleanup().await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 0);
        assert!(!written.exists());
        assert!(uploads.is_empty());
        assert_eq!(uploads.cleanup().await.attempted, 0);
    }

    #[tokio::test]
    async fn test_drop_removes_leftovers_off_the_runtime_workers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = {
            let mut uploads = TempFiles::new(tmp.path());
            let path = reserve_path(&mut uploads, "left.txt").await;
            tokio::fs::write(&path, b"left").await.unwrap();
            path
        };

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while path.exists() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_without_runtime_removes_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let mut uploads = TempFiles::new(tmp.path());
        let path = tokio_test::block_on(async {
            let path = reserve_path(&mut uploads, "left.txt").await;
            tokio::fs::write(&path, b"left").await.unwrap();
            path
        });

        drop(uploads);
        assert!(!path.exists());
    }
}
