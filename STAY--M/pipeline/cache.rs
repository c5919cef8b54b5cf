use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};

use crate::models::ModelArtifact;

const LATEST: &str = "latest.json";

/// File-system cache holding the most recently trained artifact per model name.
///
/// No locking: concurrent runs against the same root race on `store`.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Creates a cache rooted at the models directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of a model's latest artifact.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name).join(LATEST)
    }

    /// Whether a cached artifact exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Reads the cached artifact for `name`.
    pub fn load(&self, name: &str) -> Result<ModelArtifact> {
        let path = self.path(name);
        let bytes =
            fs::read(&path).with_context(|| format!("reading cached artifact {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .with_context(|| format!("decoding cached artifact {}", path.display()))?;
        ensure!(
            artifact.model == name,
            "cached artifact {} belongs to '{}'",
            path.display(),
            artifact.model
        );
        Ok(artifact)
    }

    /// Replaces the cached artifact for `name`.
    pub fn store(&self, name: &str, artifact: &ModelArtifact) -> Result<PathBuf> {
        let path = self.path(name);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;
        let staging = dir.join(format!("{LATEST}.tmp"));
        let data = serde_json::to_vec_pretty(artifact)?;
        fs::write(&staging, data)
            .with_context(|| format!("writing cache staging file {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("replacing cached artifact {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn store_then_load_latest() {
        let dir = tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("models"));
        assert!(!cache.contains("pricing"));

        let first = ModelArtifact::new("pricing", &json!({ "v": 1 })).unwrap();
        let second = ModelArtifact::new("pricing", &json!({ "v": 2 })).unwrap();
        cache.store("pricing", &first).unwrap();
        let path = cache.store("pricing", &second).unwrap();

        assert_eq!(path, dir.path().join("models/pricing/latest.json"));
        assert!(cache.contains("pricing"));
        assert_eq!(cache.load("pricing").unwrap(), second);
        assert!(!dir.path().join("models/pricing/latest.json.tmp").exists());
    }

    #[test]
    fn load_rejects_foreign_or_corrupt_artifacts() {
        let dir = tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let rewards = ModelArtifact::new("rewards", &json!({})).unwrap();
        cache.store("occupancy", &rewards).unwrap();
        assert!(cache.load("occupancy").is_err());

        fs::create_dir_all(dir.path().join("pricing")).unwrap();
        fs::write(cache.path("pricing"), b"{not json").unwrap();
        assert!(cache.contains("pricing"));
        assert!(cache.load("pricing").is_err());
    }
}
