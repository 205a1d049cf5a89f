// Helper functions shared by the fetcher, renderer and resizer

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::errors::CaptureError;
use super::models::PlatformTarget;

/// Base name for a day's images, e.g. `day-5-screenshot`
pub fn base_name(day: u32) -> String {
    format!("day-{}-screenshot", day)
}

/// `{base}.png`
pub fn original_file_name(day: u32) -> String {
    format!("{}.png", base_name(day))
}

/// `{base}-{target}.png`
pub fn derived_file_name(base: &str, target: &PlatformTarget) -> String {
    format!("{}-{}.png", base, target.key)
}

/// Every file a successful day produces, keyed by "original" or target key
pub fn output_files(day: u32, targets: &[PlatformTarget]) -> Vec<(&'static str, String)> {
    let base = base_name(day);
    let mut files = vec![("original", original_file_name(day))];
    files.extend(
        targets
            .iter()
            .map(|target| (target.key, derived_file_name(&base, target))),
    );
    files
}

/// Sibling path used while a file is being written
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// File written under a temporary name and moved into place on commit.
///
/// Dropping it uncommitted removes the temporary, so a cancelled write
/// leaves nothing behind.
pub struct PartialFile {
    file: Option<File>,
    temp: PathBuf,
    dest: PathBuf,
    done: bool,
}

impl PartialFile {
    pub async fn create(dest: &Path) -> Result<Self, CaptureError> {
        let temp = partial_path(dest);
        let file = File::create(&temp)
            .await
            .map_err(|e| CaptureError::io(format!("failed to create output file {}", temp.display()), e))?;

        Ok(Self {
            file: Some(file),
            temp,
            dest: dest.to_path_buf(),
            done: false,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), CaptureError> {
        let Some(file) = self.file.as_mut() else {
            return Err(CaptureError::io(
                "failed to write output file",
                std::io::Error::other("file already closed"),
            ));
        };
        file.write_all(chunk)
            .await
            .map_err(|e| CaptureError::io("failed to write output file", e))
    }

    pub async fn commit(mut self) -> Result<PathBuf, CaptureError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| CaptureError::io("failed to flush output file", e))?;
        }

        tokio::fs::rename(&self.temp, &self.dest).await.map_err(|e| {
            CaptureError::io(
                format!("failed to move output file into {}", self.dest.display()),
                e,
            )
        })?;
        self.done = true;
        Ok(self.dest.clone())
    }

    pub async fn discard(mut self) {
        self.file.take();
        let _ = tokio::fs::remove_file(&self.temp).await;
        self.done = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.done {
            self.file.take();
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Write the whole buffer or nothing
pub async fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
    let mut file = PartialFile::create(dest).await?;
    if let Err(e) = file.write(bytes).await {
        file.discard().await;
        return Err(e);
    }
    file.commit().await.map(|_| ())
}

/// Blocking variant for CPU-bound callers already off the async runtime
pub fn write_atomically_blocking(dest: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
    let temp = partial_path(dest);
    let result = std::fs::write(&temp, bytes)
        .map_err(|e| CaptureError::io(format!("failed to write {}", temp.display()), e))
        .and_then(|_| {
            std::fs::rename(&temp, dest)
                .map_err(|e| CaptureError::io(format!("failed to move file into {}", dest.display()), e))
        });

    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    result
}
