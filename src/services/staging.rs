use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::utils::hash;

/// A filesystem artifact holding an upload for the duration of one validation
/// pass. Lives in the staging directory, which the public download route never
/// serves. Dropping an unpromoted `StagedFile` deletes it, so staged content
/// cannot leak on any exit path, panics and early returns included.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    /// Write the candidate bytes under a collision-resistant generated name
    /// and return the staged artifact together with the content's SHA-256.
    pub async fn write(
        staging_dir: &Path,
        extension: &str,
        bytes: &[u8],
    ) -> std::io::Result<(Self, String)> {
        let name = if extension.is_empty() {
            Uuid::new_v4().simple().to_string()
        } else {
            format!("{}.{}", Uuid::new_v4().simple(), extension)
        };
        let path = staging_dir.join(name);
        let content_hash = hash::sha256_hex(bytes);
        tokio::fs::write(&path, bytes).await?;
        Ok((
            Self {
                path,
                released: false,
            },
            content_hash,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the staged file into the accepted store under a fresh unique name,
    /// preserving the validated extension. A rename within the same upload
    /// root, so concurrent readers only ever observe fully promoted files.
    pub async fn promote(mut self, store_dir: &Path) -> std::io::Result<String> {
        let stored_name = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", Uuid::new_v4().simple(), ext),
            None => Uuid::new_v4().simple().to_string(),
        };
        tokio::fs::rename(&self.path, store_dir.join(&stored_name)).await?;
        self.released = true;
        Ok(stored_name)
    }

    /// Delete the staged copy eagerly instead of waiting for Drop. On failure
    /// the file stays unreleased and the Drop guard retries the removal.
    pub async fn discard(mut self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => self.released = true,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to discard staged file");
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
