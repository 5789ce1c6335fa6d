//! Writes inline text targets to local files so they can be uploaded like
//! any other local payload.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("failed to write text to '{path}': {source}")]
pub struct MaterializeError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone)]
pub struct TextMaterializer {
    dir: PathBuf,
}

impl TextMaterializer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `text` to `<dir>/<job_id>.txt` and return the path.
    pub async fn materialize(&self, job_id: Uuid, text: &str) -> Result<PathBuf, MaterializeError> {
        let path = self.dir.join(format!("{job_id}.txt"));
        let wrap = |source| MaterializeError {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(wrap)?;
        tokio::fs::write(&path, text).await.map_err(wrap)?;
        Ok(path)
    }
}
