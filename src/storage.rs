//! The two on-disk directories: normalized uploads and generated outputs.

use crate::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const UPLOADS_ROUTE: &str = "/uploads";
pub const OUTPUTS_ROUTE: &str = "/outputs";

#[derive(Debug, Clone)]
pub struct Storage {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    pub path: PathBuf,
    /// Path under which the file is served, e.g. `/outputs/<uuid>.png`.
    pub url: String,
}

impl Storage {
    /// Creates both directories if they do not exist yet.
    pub async fn init(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        };
        tokio::fs::create_dir_all(&storage.upload_dir).await?;
        tokio::fs::create_dir_all(&storage.output_dir).await?;
        tracing::info!(
            "Storing uploads in {} and outputs in {}",
            storage.upload_dir.display(),
            storage.output_dir.display()
        );
        Ok(storage)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn save_upload(&self, bytes: &[u8], extension: &str) -> Result<StoredFile> {
        write_unique(&self.upload_dir, UPLOADS_ROUTE, bytes, extension).await
    }

    pub async fn save_output(&self, bytes: &[u8], extension: &str) -> Result<StoredFile> {
        write_unique(&self.output_dir, OUTPUTS_ROUTE, bytes, extension).await
    }
}

async fn write_unique(dir: &Path, route: &str, bytes: &[u8], extension: &str) -> Result<StoredFile> {
    let file_name = format!("{}.{}", Uuid::new_v4(), extension);
    let path = dir.join(&file_name);

    tokio::fs::write(&path, bytes).await?;
    tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());

    Ok(StoredFile {
        url: format!("{}/{}", route, file_name),
        file_name,
        path,
    })
}
