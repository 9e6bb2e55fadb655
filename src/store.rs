//! Output artifacts: `<dir>/<id>.json` (attribute mapping) and `<dir>/<id>` (raw content).

use std::path::{Component, Path, PathBuf};

use crate::error::PersistenceError;
use crate::types::Item;

/// Suffix of the metadata artifact
const METADATA_SUFFIX: &str = ".json";

/// Paths written for one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// JSON attribute mapping
    pub metadata: PathBuf,
    /// Raw content bytes
    pub content: PathBuf,
}

/// Writes per-item artifacts under one output directory
///
/// Paths are derived from the item identifier alone, so concurrent workers never
/// touch the same file.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if it does not exist yet
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Where the artifacts for `id` live
    ///
    /// # Errors
    ///
    /// Rejects identifiers that are not a single plain file name, and identifiers
    /// ending in the metadata suffix (their content would land on another item's
    /// metadata path).
    pub fn paths_for(&self, id: &str) -> Result<ArtifactPaths, PersistenceError> {
        if !is_plain_file_name(id) || id.ends_with(METADATA_SUFFIX) {
            return Err(PersistenceError::InvalidIdentifier { id: id.to_string() });
        }
        Ok(ArtifactPaths {
            metadata: self.dir.join(format!("{id}{METADATA_SUFFIX}")),
            content: self.dir.join(id),
        })
    }

    /// Write the metadata artifact, then the content artifact
    pub async fn write(
        &self,
        item: &Item,
        content: &[u8],
    ) -> Result<ArtifactPaths, PersistenceError> {
        let paths = self.paths_for(&item.id)?;

        let metadata = serde_json::to_vec(&item.attributes)?;
        write_file(&paths.metadata, &metadata).await?;
        write_file(&paths.content, content).await?;

        Ok(paths)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn is_plain_file_name(id: &str) -> bool {
    if id.is_empty() || id.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
